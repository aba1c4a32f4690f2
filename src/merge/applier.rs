// Mon Oct 19 2026 - Alex

use crate::merge::resolver::RemapTable;
use crate::volume::{GlobalLabeling, LocalLabeling};

/// Rewrites a chunk's local labels to canonical ids: `l -> remap(base + l)`.
pub fn apply(local: &LocalLabeling, base: u64, remap: &RemapTable) -> GlobalLabeling {
    let labels = local.labels.mapv(|l| if l == 0 { 0 } else { remap.get(base + l as u64) });
    GlobalLabeling {
        chunk_id: local.chunk_id,
        window: local.window,
        labels,
    }
}

/// Maps already-global labels through `remap`. A no-op on labels that
/// came out of [`apply`] with the same table.
pub fn remap_in_place(labeling: &mut GlobalLabeling, remap: &RemapTable) {
    labeling.labels.mapv_inplace(|id| remap.get(id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VolumeBox;
    use crate::merge::{resolve, MergeEdge};
    use ndarray::Array3;

    fn local() -> LocalLabeling {
        let mut labels = Array3::<u32>::zeros((2, 2, 2));
        labels[[0, 0, 0]] = 1;
        labels[[1, 1, 1]] = 2;
        LocalLabeling {
            chunk_id: 4,
            window: VolumeBox::new([0, 0, 0], [2, 2, 2]),
            labels,
            local_count: 2,
        }
    }

    #[test]
    fn test_apply_offsets_and_remaps() {
        let remap = resolve(1..=12, MergeEdge::new(12, 3));
        let out = apply(&local(), 10, &remap);
        assert_eq!(out.labels[[0, 0, 0]], 11);
        assert_eq!(out.labels[[1, 1, 1]], 3);
        assert_eq!(out.labels[[0, 1, 0]], 0);
        assert_eq!(out.chunk_id, 4);
    }

    #[test]
    fn test_remap_idempotent() {
        let remap = resolve(1..=12, [MergeEdge::new(12, 3), MergeEdge::new(11, 5)].into_iter().flatten());
        let mut out = apply(&local(), 10, &remap);
        let before = out.clone();
        remap_in_place(&mut out, &remap);
        assert_eq!(out, before);
    }
}
