//! Hierarchical cache keys.
//!
//! A key is an ordered list of path segments followed by one or more terminal
//! names. Search keys are segment patterns where `*` matches any run of
//! characters within one segment; a search matches every key whose leading
//! segments match the pattern.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CacheError;

/// Wildcard token permitted in search keys only.
pub const WILDCARD: char = '*';

/// Independent cache namespaces, each with its own flush scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorePartition {
    /// Networks, nodes and installed contract handles.
    Infra,
    /// Node event trail and listener locks.
    Monitoring,
    /// Per-run accounts, deploys, transfers, steps and locks.
    Run,
}

impl StorePartition {
    pub const ALL: [StorePartition; 3] = [
        StorePartition::Infra,
        StorePartition::Monitoring,
        StorePartition::Run,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorePartition::Infra => "INFRA",
            StorePartition::Monitoring => "MONITORING",
            StorePartition::Run => "RUN",
        }
    }
}

impl fmt::Display for StorePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a single cache item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheItemKey {
    pub paths: Vec<String>,
    pub names: Vec<String>,
}

impl CacheItemKey {
    pub fn new<P, N>(paths: P, names: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// All segments in order: paths then names.
    pub fn segments(&self) -> Vec<String> {
        self.paths.iter().chain(self.names.iter()).cloned().collect()
    }

    /// Terminal name, the last of `names`.
    pub fn name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    /// Reject keys that could not be addressed by a point lookup.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.paths.is_empty() || self.names.is_empty() {
            return Err(CacheError::InvalidKey(format!(
                "{self}: paths and names must be non-empty"
            )));
        }
        for segment in self.paths.iter().chain(self.names.iter()) {
            if segment.is_empty() {
                return Err(CacheError::InvalidKey(format!("{self}: empty segment")));
            }
            if segment.contains(WILDCARD) {
                return Err(CacheError::InvalidKey(format!(
                    "{self}: wildcard not permitted"
                )));
            }
        }
        Ok(())
    }

    /// Search key matching exactly this key's segments.
    pub fn as_search(&self) -> CacheSearchKey {
        CacheSearchKey {
            paths: self.segments(),
        }
    }
}

impl fmt::Display for CacheItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join(":"))
    }
}

/// Pattern over leading key segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheSearchKey {
    pub paths: Vec<String>,
}

impl CacheSearchKey {
    pub fn new<P>(paths: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Narrow the pattern by one more segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut paths = self.paths.clone();
        paths.push(segment.into());
        Self { paths }
    }

    /// Check if `key` falls under this pattern.
    pub fn matches(&self, key: &CacheItemKey) -> bool {
        let segments = key.paths.iter().chain(key.names.iter());
        let mut count = 0;
        for (pattern, segment) in self.paths.iter().zip(segments) {
            if !segment_matches(pattern, segment) {
                return false;
            }
            count += 1;
        }
        count == self.paths.len()
    }
}

impl fmt::Display for CacheSearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.paths.join(":"))
    }
}

/// A stored value with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub key: CacheItemKey,
    pub value: serde_json::Value,
}

impl CacheItem {
    pub fn new(key: CacheItemKey, value: serde_json::Value) -> Self {
        Self { key, value }
    }
}

/// Glob match of one segment, `*` matching any (possibly empty) run.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    if !pattern.contains(WILDCARD) {
        return pattern == segment;
    }

    let parts: Vec<&str> = pattern.split(WILDCARD).collect();
    let mut rest = segment;

    // First part anchors at the start.
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let last_index = parts.len() - 1;
    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last_index {
            return rest.len() >= part.len() && rest.ends_with(part);
        }
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_glob() {
        assert!(segment_matches("*", "anything"));
        assert!(segment_matches("*", ""));
        assert!(segment_matches("N-*", "N-0004"));
        assert!(!segment_matches("N-*", "A-000001"));
        assert!(segment_matches("*-0004", "N-0004"));
        assert!(segment_matches("A-*1", "A-000001"));
        assert!(!segment_matches("A-*2", "A-000001"));
        assert!(segment_matches("a*b*c", "aXXbYYc"));
        assert!(!segment_matches("a*b*c", "aXXcYYb"));
        assert!(segment_matches("exact", "exact"));
        assert!(!segment_matches("exact", "exactly"));
    }

    #[test]
    fn test_search_matches_leading_segments() {
        let key = CacheItemKey::new(["lrt1", "node"], ["N-0001"]);
        assert!(CacheSearchKey::new(["lrt1"]).matches(&key));
        assert!(CacheSearchKey::new(["lrt1", "node"]).matches(&key));
        assert!(CacheSearchKey::new(["lrt1", "node", "N-*"]).matches(&key));
        assert!(CacheSearchKey::new(["*", "node"]).matches(&key));
        assert!(!CacheSearchKey::new(["lrt2"]).matches(&key));
        assert!(!CacheSearchKey::new(["lrt1", "node", "N-0001", "extra"]).matches(&key));
    }

    #[test]
    fn test_validate_rejects_wildcards() {
        assert!(CacheItemKey::new(["lrt1"], ["network"]).validate().is_ok());
        assert!(matches!(
            CacheItemKey::new(["lrt1", "*"], ["x"]).validate(),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(CacheItemKey::new(["lrt1"], Vec::<String>::new())
            .validate()
            .is_err());
        assert!(CacheItemKey::new(["lrt1", ""], ["x"]).validate().is_err());
    }
}
