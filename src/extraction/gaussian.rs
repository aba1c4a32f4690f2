// Mon Oct 19 2026 - Alex

use ndarray::{Array3, Axis};

/// Kernels are truncated at four standard deviations.
pub const TRUNCATE: f32 = 4.0;

pub fn kernel_radius(sigma: f32) -> usize {
    if sigma <= 0.0 {
        0
    } else {
        (TRUNCATE * sigma).ceil() as usize
    }
}

/// Normalized 1-D Gaussian of length `2 * radius + 1`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = kernel_radius(sigma);
    if radius == 0 {
        return vec![1.0];
    }
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Mirror index with the edge sample repeated (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: isize) -> usize {
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

fn convolve_axis(src: &Array3<f32>, axis: usize, kernel: &[f32]) -> Array3<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array3::<f32>::zeros(src.dim());

    for (src_lane, mut dst_lane) in src
        .lanes(Axis(axis))
        .into_iter()
        .zip(out.lanes_mut(Axis(axis)))
    {
        let n = src_lane.len() as isize;
        for i in 0..n {
            let mut acc = 0.0f32;
            for (k, w) in kernel.iter().enumerate() {
                let j = reflect(i + k as isize - radius, n);
                acc += w * src_lane[j];
            }
            dst_lane[i as usize] = acc;
        }
    }
    out
}

/// Separable Gaussian filter; axes with a zero sigma are left untouched.
pub fn gaussian_smooth(data: &Array3<f32>, sigma: [f32; 3]) -> Array3<f32> {
    let mut current = data.clone();
    for (axis, &s) in sigma.iter().enumerate() {
        if kernel_radius(s) == 0 || current.len_of(Axis(axis)) == 0 {
            continue;
        }
        current = convolve_axis(&current, axis, &gaussian_kernel(s));
    }
    current
}
