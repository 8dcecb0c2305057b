//! Built-in pipelines

use crate::crawler::{
    FetchError, Fetcher, ParserRegistry, Pipeline, PipelineResult, ProcessingContext,
};
use crate::robots::RobotsRegistry;
use crate::task::RouteId;
use async_trait::async_trait;
use std::sync::Arc;

/// Id of the standard crawl route
pub const CRAWL_ROUTE: &str = "route:crawl";

/// Id of the route non-HTML documents hop to
pub const MEDIA_ROUTE: &str = "route:media";

/// The standard crawl pipeline: robots check, fetch, parse, enqueue links
///
/// Documents no registered parser understands are handed to the media
/// route, if one is configured.
pub struct FetchParsePipeline {
    fetcher: Arc<dyn Fetcher>,
    parsers: Arc<ParserRegistry>,
    robots: Option<Arc<RobotsRegistry>>,
    media_route: Option<RouteId>,
}

impl FetchParsePipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, parsers: Arc<ParserRegistry>) -> Self {
        Self {
            fetcher,
            parsers,
            robots: None,
            media_route: None,
        }
    }

    /// Consult robots.txt before every fetch
    pub fn with_robots(mut self, robots: Arc<RobotsRegistry>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn with_media_route(mut self, route_id: impl Into<String>) -> Self {
        self.media_route = Some(RouteId::new(route_id));
        self
    }
}

#[async_trait]
impl Pipeline for FetchParsePipeline {
    async fn execute(&self, ctx: &mut ProcessingContext<'_>) -> anyhow::Result<PipelineResult> {
        let url = ctx.task().url().clone();

        if let Some(robots) = &self.robots {
            ctx.enter_stage("robots");
            robots.ensure(&url).await;
            if !robots.is_allowed(&url) {
                return Err(FetchError::RobotsDenied {
                    url: url.to_string(),
                }
                .into());
            }
        }

        ctx.enter_stage("fetch");
        let fetched = self.fetcher.fetch(ctx.task()).await?;

        let parseable = fetched
            .media_type
            .as_deref()
            .map(|m| self.parsers.supports(m))
            .unwrap_or(false);
        if !parseable {
            if let Some(media_route) = &self.media_route {
                ctx.set_fetched(fetched);
                return Ok(PipelineResult::Hop(media_route.clone()));
            }
        }

        ctx.enter_stage("parse");
        let document = self.parsers.parse(&fetched)?;
        ctx.set_fetched(fetched);

        ctx.enter_stage("enqueue");
        for link in &document.links {
            ctx.enqueue(link, "html")?;
        }
        tracing::debug!(
            "Parsed {}: {} links, title {:?}",
            url,
            document.links.len(),
            document.title
        );
        ctx.set_document(document);

        Ok(PipelineResult::Complete)
    }
}

/// Records non-HTML documents without following anything
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaPipeline;

#[async_trait]
impl Pipeline for MediaPipeline {
    async fn execute(&self, ctx: &mut ProcessingContext<'_>) -> anyhow::Result<PipelineResult> {
        ctx.enter_stage("media");
        let media_type = ctx
            .fetched()
            .and_then(|f| f.media_type.as_deref())
            .unwrap_or("unknown");
        tracing::debug!("Recorded {} ({})", ctx.task().url(), media_type);
        Ok(PipelineResult::Complete)
    }
}
