//! Hostname patterns for routing intercepted requests.

use url::Url;

/// Type of hostname pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    /// Exact hostname match.
    Exact,
    /// Hostname contains the pattern as a substring.
    Contains,
}

/// Pattern matched against a URL's hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern {
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

impl HostPattern {
    /// Create an exact match pattern.
    pub fn exact(host: &str) -> Self {
        Self {
            pattern_type: PatternType::Exact,
            pattern: host.to_string(),
        }
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::Contains,
            pattern: substring.to_string(),
        }
    }

    /// Check if a hostname matches this pattern.
    pub fn matches_host(&self, host: &str) -> bool {
        match self.pattern_type {
            PatternType::Exact => host == self.pattern,
            PatternType::Contains => host.contains(&self.pattern),
        }
    }

    /// Check if a URL's hostname matches this pattern. URLs without a host
    /// never match.
    pub fn matches(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.matches_host(host))
    }
}
