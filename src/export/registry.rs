//! Finished exports keyed by preset

use crate::export::types::Artifact;
use std::collections::HashMap;
use std::sync::Arc;

/// At most one artifact per preset
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    entries: HashMap<String, Arc<Artifact>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `artifact` under `preset_id`
    ///
    /// The previous artifact for the key is removed first and returned so the
    /// caller can drop the last reference to its bytes.
    pub fn insert(&mut self, preset_id: &str, artifact: Arc<Artifact>) -> Option<Arc<Artifact>> {
        let previous = self.entries.remove(preset_id);
        if let Some(prev) = &previous {
            tracing::debug!(
                "Releasing previous {} artifact ({})",
                preset_id,
                prev.pretty_size()
            );
        }
        self.entries.insert(preset_id.to_string(), artifact);
        previous
    }

    pub fn get(&self, preset_id: &str) -> Option<Arc<Artifact>> {
        self.entries.get(preset_id).cloned()
    }

    /// Drop every stored artifact
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("Releasing {} stored artifacts", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
