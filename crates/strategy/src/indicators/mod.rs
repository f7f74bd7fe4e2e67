//! Indicator series.
//!
//! Every function returns a vector aligned 1:1 with its input, holding `None`
//! at warm-up positions. Undefined inputs propagate: a value derived from an
//! undefined input is itself undefined, never zero.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod vwap;

pub use adx::adx;
pub use atr::{atr, true_range};
pub use ema::{ema, ema_of, seeded_recurrence, wilder};
pub use macd::{macd_line, macd_signal};
pub use rsi::{rsi, RsiSmoothing};
pub use sma::{sma, sma_of};
pub use vwap::session_vwap;

/// Lift a raw series, treating non-finite values as undefined.
pub(crate) fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&v| if v.is_finite() { Some(v) } else { None })
        .collect()
}

/// Synthetic 15-minute candles from closes: open = previous close,
/// high/low one point outside the body, volume 1000.
#[cfg(test)]
pub(crate) fn candles_from_closes(closes: &[f64]) -> Vec<common::Candle> {
    use chrono::{Duration, TimeZone, Utc};

    let start = Utc.with_ymd_and_hms(2024, 3, 4, 3, 45, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            common::Candle {
                open_time: start + Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
