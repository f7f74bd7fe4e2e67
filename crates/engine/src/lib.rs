pub mod confidence;
pub mod cycle;
pub mod resolution;

pub use confidence::{win_rate, win_rate_from, ConfidenceConfig, ConfidenceEstimator, Snapshot, WinRate};
pub use cycle::{CycleReport, NewSignal, ScanConfig, Scanner, Skip, SkipReason};
pub use resolution::{forward_lookback, resolution_source, resolve, Resolution};
