//! Query option names and their canonical rendering order

use serde::{Deserialize, Serialize};
use std::fmt;

/// The system query options understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOptionName {
    Select,
    Filter,
    Search,
    Compute,
    Apply,
    OrderBy,
    Top,
    Skip,
    SkipToken,
    Expand,
    Format,
    Levels,
    Count,
}

impl QueryOptionName {
    /// Options in the order they are rendered into a query string
    pub const CANONICAL: [QueryOptionName; 11] = [
        QueryOptionName::Select,
        QueryOptionName::Filter,
        QueryOptionName::Search,
        QueryOptionName::Compute,
        QueryOptionName::Apply,
        QueryOptionName::OrderBy,
        QueryOptionName::Top,
        QueryOptionName::Skip,
        QueryOptionName::SkipToken,
        QueryOptionName::Expand,
        QueryOptionName::Format,
    ];

    /// Bare option name as it appears in nested expand options
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOptionName::Select => "select",
            QueryOptionName::Filter => "filter",
            QueryOptionName::Search => "search",
            QueryOptionName::Compute => "compute",
            QueryOptionName::Apply => "apply",
            QueryOptionName::OrderBy => "orderby",
            QueryOptionName::Top => "top",
            QueryOptionName::Skip => "skip",
            QueryOptionName::SkipToken => "skiptoken",
            QueryOptionName::Expand => "expand",
            QueryOptionName::Format => "format",
            QueryOptionName::Levels => "levels",
            QueryOptionName::Count => "count",
        }
    }

    /// Parameter key, e.g. `$filter`
    pub fn param(&self) -> String {
        format!("${}", self.as_str())
    }

    /// Parse a bare or `$`-prefixed option name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('$').to_ascii_lowercase();
        let found = match name.as_str() {
            "select" => QueryOptionName::Select,
            "filter" => QueryOptionName::Filter,
            "search" => QueryOptionName::Search,
            "compute" => QueryOptionName::Compute,
            "apply" | "transform" => QueryOptionName::Apply,
            "orderby" => QueryOptionName::OrderBy,
            "top" => QueryOptionName::Top,
            "skip" => QueryOptionName::Skip,
            "skiptoken" => QueryOptionName::SkipToken,
            "expand" => QueryOptionName::Expand,
            "format" => QueryOptionName::Format,
            "levels" => QueryOptionName::Levels,
            "count" => QueryOptionName::Count,
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for QueryOptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_prefixed_names() {
        assert_eq!(
            QueryOptionName::parse("$filter"),
            Some(QueryOptionName::Filter)
        );
        assert_eq!(
            QueryOptionName::parse("OrderBy"),
            Some(QueryOptionName::OrderBy)
        );
        assert_eq!(
            QueryOptionName::parse("transform"),
            Some(QueryOptionName::Apply)
        );
        assert_eq!(QueryOptionName::parse("bogus"), None);
    }

    #[test]
    fn test_param_key() {
        assert_eq!(QueryOptionName::SkipToken.param(), "$skiptoken");
    }
}
