// Process-wide cache of decoded clips, keyed by source location
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::buffer::DecodedBuffer;

/// Shared decoded-buffer cache.
///
/// Cloning yields another handle to the same map. Entries are written once
/// per source and never evicted; when two players race on the same source
/// the last insert wins.
#[derive(Clone, Default)]
pub struct BufferCache {
    entries: Arc<RwLock<HashMap<String, Arc<DecodedBuffer>>>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<Arc<DecodedBuffer>> {
        self.entries.read().get(source).cloned()
    }

    pub fn insert(&self, source: impl Into<String>, buffer: Arc<DecodedBuffer>) {
        self.entries.write().insert(source.into(), buffer);
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.read().contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
