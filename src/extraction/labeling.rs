// Mon Oct 19 2026 - Alex

use ndarray::Array3;

fn find_root(parents: &mut [u32], label: u32) -> u32 {
    let mut current = label;
    while parents[current as usize] != current {
        let grandparent = parents[parents[current as usize] as usize];
        parents[current as usize] = grandparent;
        current = grandparent;
    }
    current
}

/// Keeps the smaller root so the component is named by its first scanned voxel.
fn union(parents: &mut [u32], a: u32, b: u32) {
    let ra = find_root(parents, a);
    let rb = find_root(parents, b);
    if ra < rb {
        parents[rb as usize] = ra;
    } else if rb < ra {
        parents[ra as usize] = rb;
    }
}

/// 6-connected component labeling of a foreground mask.
///
/// Two passes with a union-find table. Labels run from 1 to the returned
/// count and are numbered by each component's first voxel in row-major
/// scan order (x slowest, z fastest), so identical masks always produce
/// identical labelings.
pub fn label_components(mask: &Array3<bool>) -> (Array3<u32>, u32) {
    let (nx, ny, nz) = mask.dim();
    let mut labels = Array3::<u32>::zeros((nx, ny, nz));
    let mut parents: Vec<u32> = vec![0];

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if !mask[[x, y, z]] {
                    continue;
                }

                let mut neighbors = [0u32; 3];
                if x > 0 {
                    neighbors[0] = labels[[x - 1, y, z]];
                }
                if y > 0 {
                    neighbors[1] = labels[[x, y - 1, z]];
                }
                if z > 0 {
                    neighbors[2] = labels[[x, y, z - 1]];
                }

                let smallest = neighbors.iter().copied().filter(|&l| l > 0).min();
                match smallest {
                    None => {
                        let next = parents.len() as u32;
                        parents.push(next);
                        labels[[x, y, z]] = next;
                    }
                    Some(min_label) => {
                        labels[[x, y, z]] = min_label;
                        for &n in neighbors.iter().filter(|&&l| l > 0 && l != min_label) {
                            union(&mut parents, min_label, n);
                        }
                    }
                }
            }
        }
    }

    // Roots are the smallest provisional label of their component, so
    // visiting provisional labels in order numbers components by first voxel.
    let mut relabel = vec![0u32; parents.len()];
    let mut count = 0u32;
    for label in 1..parents.len() as u32 {
        let root = find_root(&mut parents, label);
        if root == label {
            count += 1;
            relabel[label as usize] = count;
        } else {
            relabel[label as usize] = relabel[root as usize];
        }
    }

    labels.mapv_inplace(|l| relabel[l as usize]);
    (labels, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(points: &[[usize; 3]], dim: (usize, usize, usize)) -> Array3<bool> {
        let mut mask = Array3::from_elem(dim, false);
        for p in points {
            mask[*p] = true;
        }
        mask
    }

    #[test]
    fn test_empty_mask() {
        let (labels, count) = label_components(&Array3::from_elem((3, 3, 3), false));
        assert_eq!(count, 0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_diagonal_is_not_connected() {
        let mask = mask_from(&[[0, 0, 0], [1, 1, 0], [2, 2, 2]], (3, 3, 3));
        let (labels, count) = label_components(&mask);
        assert_eq!(count, 3);
        assert_eq!(labels[[0, 0, 0]], 1);
        assert_eq!(labels[[1, 1, 0]], 2);
        assert_eq!(labels[[2, 2, 2]], 3);
    }

    #[test]
    fn test_u_shape_merges() {
        // Two arms joined at the far end along x.
        let mask = mask_from(
            &[[0, 0, 0], [1, 0, 0], [2, 0, 0], [0, 0, 2], [1, 0, 2], [2, 0, 2], [2, 0, 1]],
            (3, 1, 3),
        );
        let (labels, count) = label_components(&mask);
        assert_eq!(count, 1);
        assert!(mask.iter().zip(labels.iter()).all(|(&m, &l)| !m || l == 1));
    }

    #[test]
    fn test_scan_order_numbering() {
        // The component touching the lowest scan index is labeled first even
        // when a later component merges through an earlier provisional label.
        let mask = mask_from(&[[0, 0, 2], [0, 1, 0], [0, 1, 1], [0, 1, 2], [1, 0, 0]], (2, 2, 3));
        let (labels, count) = label_components(&mask);
        assert_eq!(count, 2);
        assert_eq!(labels[[0, 0, 2]], 1);
        assert_eq!(labels[[0, 1, 0]], 1);
        assert_eq!(labels[[1, 0, 0]], 2);
    }

    #[test]
    fn test_deterministic() {
        let mut mask = Array3::from_elem((6, 5, 4), false);
        for (i, v) in mask.iter_mut().enumerate() {
            *v = (i * 7919) % 5 < 2;
        }
        let a = label_components(&mask);
        let b = label_components(&mask);
        assert_eq!(a, b);
    }
}
