// Mon Oct 19 2026 - Alex

//! Boundary partner detection.
//!
//! For every voxel on the boundary of a labeled component, the labels in an
//! odd stencil window around it vote for the most likely touching partner.
//! Only the strongest partner per center voxel is kept; on equal counts the
//! lowest label wins.

use crate::grid::ConfigError;
use ndarray::{s, Array3};
use std::collections::BTreeMap;

/// Packs an unordered label pair as `(min << 32) | max`.
pub fn partner_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

pub fn split_partner_key(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, (key & 0xFFFF_FFFF) as u32)
}

/// Foreground voxels with at least one 6-neighbour carrying a different label.
pub fn boundary_mask(labels: &Array3<u32>) -> Array3<bool> {
    let (nx, ny, nz) = labels.dim();
    let dims = [nx, ny, nz];
    let mut mask = Array3::from_elem((nx, ny, nz), false);

    for ((x, y, z), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let p = [x, y, z];
        let on_boundary = (0..3).any(|d| {
            let mut lower = p;
            let mut upper = p;
            let below = p[d] > 0 && {
                lower[d] -= 1;
                labels[lower] != label
            };
            let above = p[d] + 1 < dims[d] && {
                upper[d] += 1;
                labels[upper] != label
            };
            below || above
        });
        mask[[x, y, z]] = on_boundary;
    }
    mask
}

/// Most frequent label in `window` other than background and `center`.
fn strongest_partner(window: ndarray::ArrayView3<u32>, center: u32) -> Option<u32> {
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for &label in window.iter() {
        if label != 0 && label != center {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    // BTreeMap iterates ascending, and only a strictly larger count replaces
    // the current best, so ties resolve to the lowest label.
    let mut best: Option<(u32, u32)> = None;
    for (label, count) in counts {
        match best {
            Some((_, c)) if count <= c => {}
            _ => best = Some((label, count)),
        }
    }
    best.map(|(label, _)| label)
}

/// Partner key per center voxel whose full stencil fits inside `labels`.
///
/// The output has shape `labels.dim() - stencil + 1`; entry `[i, j, k]`
/// belongs to the center `[i + sx/2, j + sy/2, k + sz/2]`. Zero means no
/// partner.
pub fn detect_partners(labels: &Array3<u32>, stencil: [u32; 3]) -> Result<Array3<u64>, ConfigError> {
    if stencil.iter().any(|&s| s % 2 == 0) {
        return Err(ConfigError::EvenStencil(stencil));
    }
    let (nx, ny, nz) = labels.dim();
    let st = [stencil[0] as usize, stencil[1] as usize, stencil[2] as usize];
    if nx < st[0] || ny < st[1] || nz < st[2] {
        return Ok(Array3::zeros((0, 0, 0)));
    }

    let half = [st[0] / 2, st[1] / 2, st[2] / 2];
    let out_dim = (nx - st[0] + 1, ny - st[1] + 1, nz - st[2] + 1);
    let mut out = Array3::<u64>::zeros(out_dim);
    let edges = boundary_mask(labels);

    for ((i, j, k), value) in out.indexed_iter_mut() {
        let center = [i + half[0], j + half[1], k + half[2]];
        if !edges[center] {
            continue;
        }
        let center_id = labels[center];
        let window = labels.slice(s![i..i + st[0], j..j + st[1], k..k + st[2]]);
        if let Some(partner) = strongest_partner(window, center_id) {
            *value = partner_key(center_id, partner);
        }
    }
    Ok(out)
}

/// Number of center voxels voting for each partner pair.
pub fn partner_votes(labels: &Array3<u32>, stencil: [u32; 3]) -> Result<BTreeMap<u64, u32>, ConfigError> {
    let keys = detect_partners(labels, stencil)?;
    let mut votes = BTreeMap::new();
    for &key in keys.iter().filter(|&&k| k != 0) {
        *votes.entry(key).or_insert(0) += 1;
    }
    Ok(votes)
}
