//! Parsed update bodies, cached across steps
//!
//! The same update is translated on every simulation step. Bodies are keyed
//! by the SHA-256 digest of their source text, so an edited body is parsed
//! again while an unchanged one is served from memory.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::parser::{parse_function, ParseError, UpdateFunction};

/// Cache manager for parsed update bodies
#[derive(Debug, Default)]
pub struct BodyCache {
    entries: HashMap<String, Arc<UpdateFunction>>,
    hits: usize,
    misses: usize,
}

impl BodyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a body (hex SHA-256 of its source)
    pub fn cache_key(source: &str) -> String {
        format!("{:x}", Sha256::digest(source.as_bytes()))
    }

    /// Parsed form of `source`, parsing it on first use. Parse failures are
    /// not cached.
    pub fn parse(&mut self, source: &str) -> Result<Arc<UpdateFunction>, ParseError> {
        let key = Self::cache_key(source);
        if let Some(function) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(function));
        }
        self.misses += 1;
        trace!(%key, "parsing update body");
        let function = Arc::new(parse_function(source)?);
        self.entries.insert(key, Arc::clone(&function));
        Ok(function)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        let key = BodyCache::cache_key("|s, dt| 1");
        assert_eq!(key.len(), 64);
        assert_eq!(key, BodyCache::cache_key("|s, dt| 1"));
        assert_ne!(key, BodyCache::cache_key("|s, dt| 2"));
    }

    #[test]
    fn test_cache_operations() {
        let mut cache = BodyCache::new();
        let first = cache.parse("|s, dt| s.x.value + dt").unwrap();
        let second = cache.parse("|s, dt| s.x.value + dt").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.len(), 1);

        assert!(cache.parse("not a function").is_err());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
