// Mon Oct 19 2026 - Alex

pub mod extractor;
pub mod gaussian;
pub mod labeling;
pub mod partners;
pub mod threshold;

pub use extractor::{ChunkExtraction, ExtractionSettings, LocalExtractor};
pub use gaussian::{gaussian_kernel, gaussian_smooth, kernel_radius};
pub use labeling::label_components;
pub use partners::{boundary_mask, detect_partners, partner_key, partner_votes, split_partner_key};
pub use threshold::threshold_mask;
