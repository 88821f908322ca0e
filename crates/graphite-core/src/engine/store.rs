use crate::core::nn::weights::ModelWeights;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Name-keyed cache of loaded weight sets.
///
/// Entries are held weakly: a weight set is released once the last model
/// using it is dropped, and the next lookup loads it again.
#[derive(Debug, Default)]
pub struct WeightStore {
    entries: Mutex<HashMap<String, Weak<ModelWeights>>>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Weak<ModelWeights>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelWeights>> {
        self.entries().get(name).and_then(Weak::upgrade)
    }

    /// Registers `weights` under their header name, replacing any live entry.
    pub fn insert(&self, weights: ModelWeights) -> Arc<ModelWeights> {
        let shared = Arc::new(weights);
        self.entries()
            .insert(shared.name().to_string(), Arc::downgrade(&shared));
        shared
    }

    /// Returns the live entry for `name`, or runs `load` and caches its result.
    ///
    /// The store stays locked while `load` runs, so concurrent callers asking
    /// for the same name load it once.
    pub fn get_or_load<F, E>(&self, name: &str, load: F) -> Result<Arc<ModelWeights>, E>
    where
        F: FnOnce() -> Result<ModelWeights, E>,
    {
        let mut entries = self.entries();
        if let Some(live) = entries.get(name).and_then(Weak::upgrade) {
            return Ok(live);
        }
        let shared = Arc::new(load()?);
        debug!(model = name, "Loaded model weights.");
        entries.insert(name.to_string(), Arc::downgrade(&shared));
        Ok(shared)
    }

    /// Names whose weights are still held by at least one user.
    pub fn loaded(&self) -> Vec<String> {
        let mut entries = self.entries();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}
