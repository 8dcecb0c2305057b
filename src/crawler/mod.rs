//! Crawler module: task processing and run coordination
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and document parsing (the collaborators pipelines use)
//! - Routes, pipelines and the processing engine that runs them
//! - Per-task and run-level contexts, including link enqueueing
//! - The decision log
//! - The coordinator running workers and the retry drainer

mod context;
mod coordinator;
mod decision;
mod engine;
mod fetcher;
mod parser;
mod pipeline;
mod route;

pub use context::{EnqueueDecision, ProcessingContext, RunContext};
pub use coordinator::{standard_routes, Coordinator, RunSummary};
pub use decision::{Decision, DecisionCode, DecisionLog, MemoryDecisionLog, TracingDecisionLog};
pub use engine::{ProcessingEngine, DEFAULT_HOP_LIMIT};
pub use fetcher::{build_http_client, FetchError, FetchResult, Fetcher, HttpFetcher};
pub use parser::{parse_html, DocumentParser, HtmlParser, ParseError, ParsedDocument, ParserRegistry};
pub use pipeline::{FetchParsePipeline, MediaPipeline, CRAWL_ROUTE, MEDIA_ROUTE};
pub use route::{Pipeline, PipelineResult, Route, RouteResolver, RouteTable};
