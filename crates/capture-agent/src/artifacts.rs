use std::collections::{HashMap, HashSet};

use capture_core::host::{ArtifactReference, ArtifactStore, DownloadHelper};
use tracing::debug;

/// Bookkeeping for artifact references handed out by this agent.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    /// Usable results, keyed by the surface index they were recorded from.
    by_index: HashMap<usize, ArtifactReference>,
    /// Every reference ever issued, in issue order.
    issued: Vec<ArtifactReference>,
    /// Partial results of failed recordings, never exposed to the controller.
    diagnostics: Vec<ArtifactReference>,
    helpers: Vec<(ArtifactReference, DownloadHelper)>,
    released: HashSet<ArtifactReference>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a usable result for `index`, replacing any earlier mapping.
    /// The replaced reference stays live until the next release sweep.
    pub fn insert(&mut self, index: usize, reference: ArtifactReference) {
        self.issued.push(reference.clone());
        self.by_index.insert(index, reference);
    }

    /// Keep a partial result around for diagnostics only.
    pub fn keep_diagnostic(&mut self, reference: ArtifactReference) {
        self.issued.push(reference.clone());
        self.diagnostics.push(reference);
    }

    pub fn resolve(&self, index: usize) -> Option<&ArtifactReference> {
        self.by_index.get(&index)
    }

    pub fn diagnostics(&self) -> &[ArtifactReference] {
        &self.diagnostics
    }

    pub fn track_helper(&mut self, reference: ArtifactReference, helper: DownloadHelper) {
        self.helpers.push((reference, helper));
    }

    pub fn live_count(&self) -> usize {
        self.issued.iter().filter(|r| !self.released.contains(*r)).count()
    }

    /// Revoke one reference and detach its download helpers.
    /// Returns `false` if it was already released since the last sweep.
    pub fn release(&mut self, store: &mut dyn ArtifactStore, reference: &ArtifactReference) -> bool {
        if self.released.contains(reference) {
            return false;
        }
        store.revoke(reference);
        self.helpers.retain(|(r, helper)| {
            if r == reference {
                store.detach(*helper);
                false
            } else {
                true
            }
        });
        self.by_index.retain(|_, r| r != reference);
        self.diagnostics.retain(|r| r != reference);
        self.released.insert(reference.clone());
        debug!(reference = %reference, "artifact released");
        true
    }

    /// Release every issued reference. Returns how many were revoked now.
    pub fn release_all(&mut self, store: &mut dyn ArtifactStore) -> usize {
        let issued = self.issued.clone();
        let released = issued
            .iter()
            .filter(|reference| self.release(&mut *store, reference))
            .count();
        self.issued.clear();
        // Swept references are gone from the store; revoking one again is a no-op there.
        self.released.clear();
        released
    }
}
