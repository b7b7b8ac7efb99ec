//! Loaded model cache

use crate::{ModelHandle, ReconstructionError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// What identifies a loaded model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub checkpoint: String,
    pub chunk_size: usize,
}

impl ModelKey {
    pub fn new(checkpoint: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            chunk_size,
        }
    }
}

/// How repeated load requests are answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// One entry per checkpoint and chunk size
    #[default]
    Keyed,
    /// The first loaded model answers every later request
    FirstCallWins,
}

/// Models kept by default; one set of weights in memory
pub const DEFAULT_CAPACITY: usize = 1;

/// Cache of loaded models, owned by one loader.
///
/// Keyed caches hold at most `capacity` models and drop the least recently
/// used one when a new model comes in.
#[derive(Debug)]
pub struct ModelCache {
    policy: CachePolicy,
    capacity: usize,
    entries: HashMap<ModelKey, Arc<ModelHandle>>,
    /// Least recently used first
    recency: VecDeque<ModelKey>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl ModelCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_capacity(policy, DEFAULT_CAPACITY)
    }

    /// `capacity` is raised to 1 if given as 0
    pub fn with_capacity(policy: CachePolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached handle for `key`, without loading or touching recency
    pub fn get(&self, key: &ModelKey) -> Option<Arc<ModelHandle>> {
        match self.policy {
            CachePolicy::Keyed => self.entries.get(key).cloned(),
            CachePolicy::FirstCallWins => self.entries.values().next().cloned(),
        }
    }

    fn touch(&mut self, key: &ModelKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn make_room(&mut self) {
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                info!(
                    "Dropped least recently used model {} (chunk {})",
                    oldest.checkpoint, oldest.chunk_size
                );
            }
        }
    }

    /// Return the cached handle or run `load` and remember its result.
    /// A failed load leaves the cache untouched.
    pub fn get_or_load<F>(&mut self, key: ModelKey, load: F) -> Result<Arc<ModelHandle>, ReconstructionError>
    where
        F: FnOnce() -> Result<ModelHandle, ReconstructionError>,
    {
        if let Some(handle) = self.get(&key) {
            debug!(
                "Model cache hit for {} (chunk {}), serving {}",
                key.checkpoint,
                key.chunk_size,
                handle.checkpoint()
            );
            self.touch(&key);
            return Ok(handle);
        }

        info!("Loading model {} (chunk {})", key.checkpoint, key.chunk_size);
        let handle = Arc::new(load()?);
        self.make_room();
        self.recency.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Drop one entry; callers holding the handle keep it alive
    pub fn evict(&mut self, key: &ModelKey) -> Option<Arc<ModelHandle>> {
        let removed = match self.policy {
            CachePolicy::Keyed => self.entries.remove(key),
            CachePolicy::FirstCallWins => {
                let first = self.entries.keys().next().cloned();
                first.and_then(|k| self.entries.remove(&k))
            }
        };
        if removed.is_some() {
            self.recency.retain(|k| self.entries.contains_key(k));
            info!("Evicted model {}", key.checkpoint);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
