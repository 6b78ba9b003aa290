use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{StateError, StateResult};
use crate::{Checkpoint, MetadataStore};

/// In-memory metadata store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    checkpoints: Arc<Mutex<HashMap<String, Checkpoint>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self, slot_name: &str) -> StateResult<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.lock().map_err(|_| StateError::Poisoned)?;
        Ok(checkpoints.get(slot_name).cloned())
    }

    fn save(&self, slot_name: &str, checkpoint: &Checkpoint) -> StateResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StateError::Unavailable("simulated save failure".into()));
        }

        let mut checkpoints = self.checkpoints.lock().map_err(|_| StateError::Poisoned)?;
        checkpoints.insert(slot_name.to_string(), checkpoint.clone());
        Ok(())
    }

    fn clear(&self, slot_name: &str) -> StateResult<()> {
        let mut checkpoints = self.checkpoints.lock().map_err(|_| StateError::Poisoned)?;
        checkpoints.remove(slot_name);
        Ok(())
    }

    fn all(&self) -> StateResult<Vec<(String, Checkpoint)>> {
        let checkpoints = self.checkpoints.lock().map_err(|_| StateError::Poisoned)?;
        let mut all: Vec<_> = checkpoints
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}
