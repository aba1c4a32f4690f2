// Mon Oct 19 2026 - Alex

pub mod checkpoint;
pub mod coordinator;
pub mod report;
pub mod sweep;

pub use checkpoint::Checkpoint;
pub use coordinator::Coordinator;
pub use report::{ChannelReport, PartnerPair, RunReport};
pub use sweep::{run_sweep, sweep_configs};
