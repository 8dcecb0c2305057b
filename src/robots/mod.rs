//! Robots.txt handling module
//!
//! Robots.txt files are fetched lazily per origin, parsed with the
//! `robotstxt` crate and cached for 24 hours. The cache feeds two policies:
//! scope (disallowed paths) and politeness (Crawl-delay).

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsRegistry};
pub use parser::{ParsedRobots, MAX_CRAWL_DELAY_SECS};
