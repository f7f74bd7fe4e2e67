use chrono::{DateTime, SecondsFormat, Utc};

use common::{Candle, Direction, Granularity, Outcome, Signal, SignalStatus};

/// Extra bars requested beyond the ones elapsed since a signal was created.
pub const FORWARD_MARGIN_BARS: usize = 5;
/// Upper bound on a single forward fetch.
pub const MAX_FORWARD_BARS: usize = 1_000;

/// Verdict for one pending signal against one forward window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Target touched first; `candle_time` is the deciding bar.
    Won { candle_time: DateTime<Utc> },
    /// Stop touched first, including bars that touch both.
    Lost { candle_time: DateTime<Utc> },
    /// Neither level touched yet.
    Pending,
    /// The signal had already left PENDING; nothing to do.
    AlreadyFinal(SignalStatus),
}

impl Resolution {
    pub fn outcome(&self) -> Option<(Outcome, DateTime<Utc>)> {
        match *self {
            Resolution::Won { candle_time } => Some((Outcome::Won, candle_time)),
            Resolution::Lost { candle_time } => Some((Outcome::Lost, candle_time)),
            Resolution::Pending | Resolution::AlreadyFinal(_) => None,
        }
    }
}

/// Walk `forward` chronologically and report which level was touched first.
///
/// Only candles opening strictly after `created_at` count. The stop is
/// checked before the target on every bar, so a bar spanning both resolves
/// LOST.
pub fn resolve(signal: &Signal, forward: &[Candle]) -> Resolution {
    if signal.status.is_terminal() {
        return Resolution::AlreadyFinal(signal.status);
    }

    let mut ordered: Vec<&Candle> = forward
        .iter()
        .filter(|c| c.open_time > signal.created_at)
        .collect();
    ordered.sort_by_key(|c| c.open_time);

    for candle in ordered {
        let (stopped, hit) = match signal.direction {
            Direction::Long => (candle.low <= signal.stop_price, candle.high >= signal.target_price),
            Direction::Short => (candle.high >= signal.stop_price, candle.low <= signal.target_price),
        };
        if stopped {
            return Resolution::Lost { candle_time: candle.open_time };
        }
        if hit {
            return Resolution::Won { candle_time: candle.open_time };
        }
    }
    Resolution::Pending
}

/// Bars to fetch so the window reaches back past `created_at`.
pub fn forward_lookback(signal: &Signal, now: DateTime<Utc>) -> usize {
    let bar = signal.granularity.duration().num_seconds().max(1);
    let elapsed = (now - signal.created_at).num_seconds().max(0);
    let bars = (elapsed / bar) as usize + 1;
    (bars + FORWARD_MARGIN_BARS).min(MAX_FORWARD_BARS)
}

/// Human-readable pointer to the deciding bar, stored with the outcome.
pub fn resolution_source(granularity: Granularity, candle_time: DateTime<Utc>) -> String {
    format!(
        "{granularity} bar @ {}",
        candle_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}
