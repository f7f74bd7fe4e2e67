use serde::{Deserialize, Serialize};

use super::{sma_of, wilder};

/// How average gain/loss are smoothed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSmoothing {
    /// Rolling mean of the last `period` deltas.
    #[default]
    Simple,
    /// Wilder's recurrence (TradingView-style RSI).
    Wilder,
}

/// RSI (Relative Strength Index) series, bounded 0–100.
///
/// Position `i` is defined once `period` closing deltas exist, i.e. from
/// index `period`. A window without losses maps to 100 instead of dividing
/// by zero.
pub fn rsi(closes: &[f64], period: usize, smoothing: RsiSmoothing) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut gains = vec![None; n];
    let mut losses = vec![None; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        if change.is_finite() {
            gains[i] = Some(change.max(0.0));
            losses[i] = Some((-change).max(0.0));
        }
    }

    let (avg_gain, avg_loss) = match smoothing {
        RsiSmoothing::Simple => (sma_of(&gains, period), sma_of(&losses, period)),
        RsiSmoothing::Wilder => (wilder(&gains, period), wilder(&losses, period)),
    };

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| match (g, l) {
            (Some(_), Some(l)) if *l == 0.0 => Some(100.0),
            (Some(g), Some(l)) => Some(100.0 - 100.0 / (1.0 + g / l)),
            _ => None,
        })
        .collect()
}
