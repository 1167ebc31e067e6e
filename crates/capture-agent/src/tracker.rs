use std::collections::HashSet;

use capture_core::host::Document;
use capture_core::surface::{MutationRecord, NodeId, SurfaceRecord};
use tracing::debug;

/// What a batch of structural records did to the surface set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuralChange {
    /// A surface-bearing node was added or removed.
    pub changed: bool,
    /// Every surface that left the document in this batch.
    pub removed_surfaces: HashSet<NodeId>,
}

impl StructuralChange {
    pub fn from_batch(batch: &[MutationRecord]) -> Self {
        let mut change = Self::default();
        for record in batch {
            let MutationRecord::ChildList { added, removed } = record else {
                continue;
            };
            if added.iter().any(|n| n.is_surface_bearing()) {
                change.changed = true;
            }
            for node in removed.iter().filter(|n| n.is_surface_bearing()) {
                change.changed = true;
                change.removed_surfaces.extend(node.surfaces.iter().copied());
            }
        }
        change
    }

    pub fn removed(&self, surface: NodeId) -> bool {
        self.removed_surfaces.contains(&surface)
    }
}

/// Snapshot of the document's capturable surfaces.
///
/// The snapshot is rebuilt from a full document query every time, never
/// patched, so its order always matches the document at refresh time.
#[derive(Debug, Default)]
pub struct SurfaceTracker {
    surfaces: Vec<NodeId>,
}

impl SurfaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-query the document, replace the snapshot, and register every
    /// surface for attribute observation.
    pub fn refresh(&mut self, document: &mut dyn Document) -> &[NodeId] {
        self.surfaces = document.query_surfaces();
        for &surface in &self.surfaces {
            document.observe_attributes(surface);
        }
        debug!(count = self.surfaces.len(), "surface snapshot refreshed");
        &self.surfaces
    }

    /// Describe the snapshot without re-querying.
    pub fn records(&self, document: &dyn Document) -> Vec<SurfaceRecord> {
        self.surfaces
            .iter()
            .enumerate()
            .map(|(position, &surface)| {
                SurfaceRecord::new(position, document.attributes(surface).unwrap_or_default())
            })
            .collect()
    }

    pub fn surfaces(&self) -> &[NodeId] {
        &self.surfaces
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.surfaces.get(index).copied()
    }

    pub fn contains(&self, surface: NodeId) -> bool {
        self.surfaces.contains(&surface)
    }

    /// Position of the first surface carrying `marker`.
    pub fn position_of_marker(&self, document: &dyn Document, marker: &str) -> Option<usize> {
        self.surfaces
            .iter()
            .position(|&surface| document.has_marker(surface, marker))
    }

    /// Whether an attribute batch touches an observed attribute of a
    /// tracked surface.
    pub fn attributes_changed(&self, batch: &[MutationRecord]) -> bool {
        batch.iter().any(|record| match record {
            MutationRecord::Attributes { target, .. } => {
                record.is_observed_attribute() && self.contains(*target)
            }
            MutationRecord::ChildList { .. } => false,
        })
    }
}
