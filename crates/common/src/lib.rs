pub mod config;
pub mod error;
pub mod ledger;
pub mod market;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{MarkResult, PendingFilter, ResolvedQuery, SignalLedger, StatusCounts};
pub use market::{CandleSource, Clock, ManualClock, SystemClock};
pub use types::*;
