/// Dedup state definitions for URLs seen during a crawl
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a URL has progressed through the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    /// URL was accepted into the frontier at least once
    Discovered,

    /// URL was successfully processed; it must not be executed again
    Processed,
}

impl UrlState {
    /// Returns true if no further processing is needed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed)
    }

    /// Converts the state to its storage string
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Processed => "processed",
        }
    }

    /// Parses a state from its storage string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for state in [UrlState::Discovered, UrlState::Processed] {
            assert_eq!(UrlState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(UrlState::from_db_string("fetching"), None);
    }

    #[test]
    fn test_terminal() {
        assert!(!UrlState::Discovered.is_terminal());
        assert!(UrlState::Processed.is_terminal());
    }
}
