// Mon Oct 19 2026 - Alex

use crate::merge::stitcher::MergeEdge;
use crate::merge::union_find::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global id to canonical id. Only ids whose canonical id differs from
/// themselves are stored; every other id maps to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapTable {
    entries: BTreeMap<u64, u64>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> u64 {
        if id == 0 {
            return 0;
        }
        self.entries.get(&id).copied().unwrap_or(id)
    }

    /// Number of ids folded into another id.
    pub fn merged_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().map(|(&k, &v)| (k, v))
    }

    pub fn is_canonical(&self, id: u64) -> bool {
        !self.entries.contains_key(&id)
    }
}

/// Collapses the merge graph into a canonical map. Every component is named
/// by its smallest id; the result does not depend on edge order.
pub fn resolve<I, E>(ids: I, edges: E) -> RemapTable
where
    I: IntoIterator<Item = u64>,
    E: IntoIterator<Item = MergeEdge>,
{
    let mut uf = UnionFind::new();
    for id in ids.into_iter().filter(|&id| id != 0) {
        uf.add(id);
    }
    for edge in edges {
        uf.union(edge.a, edge.b);
    }

    let mut entries = BTreeMap::new();
    for id in uf.ids() {
        let root = uf.find(id);
        if root != id {
            entries.insert(id, root);
        }
    }
    log::debug!("Resolved {} nodes, {} merged", uf.len(), entries.len());
    RemapTable { entries }
}
