//! Batch lifecycle: assignment of segments to batches and the timeout sweep.

pub mod manager;
pub mod monitor;

pub use manager::BatchManager;
pub use monitor::BatchMonitor;
