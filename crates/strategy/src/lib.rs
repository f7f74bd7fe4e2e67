pub mod config;
pub mod detector;
pub mod frame;
pub mod indicators;
pub mod registry;
pub mod rule;

pub use config::RuleFileConfig;
pub use frame::{IndicatorFrame, InsufficientHistory, SeriesKey};
pub use registry::RuleBook;
pub use rule::{Distance, EntryCondition, Filter, MaKind, SignalRule};

use chrono::{DateTime, Utc};
use common::{Candle, CandleSeries, Granularity, SignalCandidate};

/// Outcome of evaluating one strategy against one candle series.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Too few closed candles; skip the symbol for this strategy this cycle.
    InsufficientHistory(InsufficientHistory),
    NoSignal,
    Signal(SignalCandidate),
}

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Name written to the ledger's `strategy` column.
    fn name(&self) -> &str;

    /// Bar size the strategy evaluates.
    fn granularity(&self) -> Granularity;

    /// Evaluate the latest fully closed candle of `series` at `now`.
    /// Candles still forming at `now` never influence the result.
    fn evaluate(&self, series: &CandleSeries, now: DateTime<Utc>) -> Evaluation;
}

impl Strategy for SignalRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn granularity(&self) -> Granularity {
        self.granularity
    }

    fn evaluate(&self, series: &CandleSeries, now: DateTime<Utc>) -> Evaluation {
        let closed: &[Candle] = match series.last_closed_index(now) {
            Some(i) => &series.candles()[..=i],
            None => &[],
        };
        let frame = match IndicatorFrame::with_min_history(
            closed,
            &self.required_series(),
            self.required_history(),
        ) {
            Ok(frame) => frame,
            Err(short) => return Evaluation::InsufficientHistory(short),
        };
        match detector::detect(series.symbol(), closed, &frame, self, now) {
            Some(candidate) => Evaluation::Signal(candidate),
            None => Evaluation::NoSignal,
        }
    }
}
