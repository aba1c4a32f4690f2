// Mon Oct 19 2026 - Alex

use ndarray::{Array3, ArrayView3};

/// Foreground where `value > threshold`.
pub fn threshold_mask(data: ArrayView3<f32>, threshold: f32) -> Array3<bool> {
    data.mapv(|v| v > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_greater() {
        let data = Array3::from_shape_vec((1, 1, 3), vec![0.4, 0.5, 0.6]).unwrap();
        let mask = threshold_mask(data.view(), 0.5);
        assert_eq!(mask.iter().copied().collect::<Vec<_>>(), vec![false, false, true]);
    }
}
