// Mon Oct 19 2026 - Alex

use std::path::{Path, PathBuf};

pub fn bucket_of(id: u64, n_buckets: u32) -> u32 {
    (id % n_buckets.max(1) as u64) as u32
}

/// Directory of a bucket: its number zero-padded to the width of the
/// largest bucket, split into two-digit levels (`1234` of `100000` is
/// `01/23/4`).
pub fn bucket_path(root: &Path, bucket: u32, n_buckets: u32) -> PathBuf {
    let width = n_buckets.saturating_sub(1).max(1).to_string().len();
    let digits = format!("{:0width$}", bucket, width = width);
    let mut path = root.to_path_buf();
    for level in digits.as_bytes().chunks(2) {
        path.push(String::from_utf8_lossy(level).as_ref());
    }
    path
}
