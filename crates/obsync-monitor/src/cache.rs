//! Last-broadcast value per facet.

use std::collections::BTreeMap;

use obsync_core::{FacetKind, StatusSnapshot};
use serde_json::Value;
use tracing::warn;

/// Holds at most one value per facet.
///
/// Values are compared structurally (`serde_json::Value` equality), so two
/// fetches that produce the same JSON never count as a change. A missing
/// facet simply has not been polled yet.
#[derive(Debug, Default, Clone)]
pub struct StateCache {
    values: BTreeMap<FacetKind, Value>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, facet: FacetKind) -> Option<&Value> {
        self.values.get(&facet)
    }

    pub fn set(&mut self, facet: FacetKind, value: Value) {
        self.values.insert(facet, value);
    }

    /// True if the facet is absent or holds a different value.
    pub fn has_changed(&self, facet: FacetKind, candidate: &Value) -> bool {
        self.values.get(&facet) != Some(candidate)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetKind, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Build a full snapshot from the cached values.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        for (facet, value) in self.iter() {
            if let Err(e) = snapshot.set_facet(facet, value) {
                warn!(%facet, error = %e, "Cached facet value has unexpected shape");
            }
        }
        snapshot
    }
}
