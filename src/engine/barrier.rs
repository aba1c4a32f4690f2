// Mon Oct 19 2026 - Alex

use crate::engine::error::PipelineError;
use crate::engine::stage::StageKind;
use std::collections::{BTreeMap, BTreeSet};

/// Wait-for-all-of-set: collects one result per expected item and only
/// opens once every item has reported.
#[derive(Debug)]
pub struct StageBarrier<T> {
    stage: StageKind,
    expected: BTreeSet<u64>,
    results: BTreeMap<u64, T>,
}

impl<T> StageBarrier<T> {
    pub fn new<I: IntoIterator<Item = u64>>(stage: StageKind, expected: I) -> Self {
        Self {
            stage,
            expected: expected.into_iter().collect(),
            results: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Drops items from the expected set; their results are no longer waited for.
    pub fn exclude<I: IntoIterator<Item = u64>>(&mut self, ids: I) {
        for id in ids {
            self.expected.remove(&id);
            self.results.remove(&id);
        }
    }

    /// Records an item's result. A repeated report replaces the earlier one;
    /// reports for items outside the expected set are ignored.
    pub fn record(&mut self, id: u64, result: T) -> bool {
        if !self.expected.contains(&id) {
            log::warn!("{}: ignoring result for unexpected item {}", self.stage, id);
            return false;
        }
        self.results.insert(id, result);
        true
    }

    pub fn missing(&self) -> Vec<u64> {
        self.expected
            .iter()
            .copied()
            .filter(|id| !self.results.contains_key(id))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.expected.len()
    }

    pub fn close(self) -> Result<BTreeMap<u64, T>, PipelineError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(PipelineError::BarrierIncomplete {
                stage: self.stage,
                missing,
            });
        }
        Ok(self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_to_close_with_missing() {
        let mut barrier = StageBarrier::new(StageKind::Extract, 0..4);
        barrier.record(0, "a");
        barrier.record(2, "c");
        assert_eq!(barrier.missing(), vec![1, 3]);
        match barrier.close() {
            Err(PipelineError::BarrierIncomplete { stage, missing }) => {
                assert_eq!(stage, StageKind::Extract);
                assert_eq!(missing, vec![1, 3]);
            }
            other => panic!("unexpected {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_exclusion_and_duplicates() {
        let mut barrier = StageBarrier::new(StageKind::Collect, [1, 2, 3]);
        barrier.exclude([3]);
        assert!(barrier.record(1, 10));
        assert!(barrier.record(1, 11));
        assert!(!barrier.record(9, 0));
        assert!(!barrier.is_complete());
        barrier.record(2, 20);
        let results = barrier.close().unwrap();
        assert_eq!(results, BTreeMap::from([(1, 11), (2, 20)]));
    }

    #[test]
    fn test_empty_barrier_is_open() {
        let barrier: StageBarrier<()> = StageBarrier::new(StageKind::Stitch, Vec::new());
        assert!(barrier.is_complete());
        assert!(barrier.close().unwrap().is_empty());
    }
}
