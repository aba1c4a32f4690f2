// Mon Oct 19 2026 - Alex

use crate::merge::error::MergeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-chunk id offsets. Chunk `c` owns the global ids
/// `bases[c] + 1 ..= bases[c] + count[c]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocation {
    pub bases: BTreeMap<u32, u64>,
    /// Highest global id handed out; 0 when no chunk found anything.
    pub max_label: u64,
}

impl IdAllocation {
    pub fn base(&self, chunk_id: u32) -> Option<u64> {
        self.bases.get(&chunk_id).copied()
    }

    /// Global id range owned by a chunk, given its local count.
    pub fn range(&self, chunk_id: u32, local_count: u32) -> Option<std::ops::RangeInclusive<u64>> {
        let base = self.base(chunk_id)?;
        Some(base + 1..=base + local_count as u64)
    }
}

/// Exclusive prefix sum of `local_counts` over `chunk_order`.
///
/// Every chunk in the order must have a count; the error lists all that
/// don't. Counts for chunks outside the order are ignored.
pub fn allocate(chunk_order: &[u32], local_counts: &BTreeMap<u32, u32>) -> Result<IdAllocation, MergeError> {
    let missing: Vec<u32> = chunk_order
        .iter()
        .copied()
        .filter(|id| !local_counts.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(MergeError::MissingCounts(missing));
    }

    let mut bases = BTreeMap::new();
    let mut next = 0u64;
    for &chunk_id in chunk_order {
        bases.insert(chunk_id, next);
        next = next
            .checked_add(local_counts[&chunk_id] as u64)
            .ok_or(MergeError::Overflow(chunk_id))?;
    }
    Ok(IdAllocation { bases, max_label: next })
}
