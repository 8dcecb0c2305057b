//! URL handling module for Sumi-Tide
//!
//! This module provides URL normalization, link resolution, host extraction
//! and domain scope matching.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, host_key};
pub use matcher::{matches_wildcard, DomainClassification, DomainMatcher};
pub use normalize::{normalize_url, resolve_link};
