use std::collections::HashMap;

use crate::backend::RiskAnalysis;
use crate::pr::RequestKey;
use crate::risk::AnalysisResult;

/// Cached analysis for one request key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub result: AnalysisResult,
    pub hybrid: Option<AnalysisResult>,
}

impl From<RiskAnalysis> for CacheEntry {
    fn from(analysis: RiskAnalysis) -> Self {
        Self {
            result: analysis.result,
            hybrid: analysis.hybrid,
        }
    }
}

/// At most one entry per key. Entries are replaced, never merged, and only
/// removed all at once by [`ResultCache::clear`].
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<RequestKey, CacheEntry>,
}

impl ResultCache {
    pub fn get(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; returns the previous entry.
    pub fn put(&mut self, key: RequestKey, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(key, entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
