use common::Candle;

use super::wilder;

/// True range per candle. The first candle has no previous close, so its
/// range is `high - low`.
pub fn true_range(candles: &[Candle]) -> Vec<Option<f64>> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            };
            range.is_finite().then_some(range)
        })
        .collect()
}

/// Average True Range: Wilder-smoothed true range, defined from index
/// `period - 1`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    wilder(&true_range(candles), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, candles_from_closes};

    #[test]
    fn true_range_includes_gaps() {
        let mut candles = candles_from_closes(&[100.0, 100.0]);
        candles[1].high = 110.0;
        candles[1].low = 108.0;
        let tr = true_range(&candles);
        assert_approx(tr[0].unwrap(), 2.0);
        // gap up: |high - prev_close| dominates
        assert_approx(tr[1].unwrap(), 10.0);
    }

    #[test]
    fn atr_warm_up_and_value() {
        // Flat closes: every candle spans exactly 2.0
        let candles = candles_from_closes(&[50.0; 20]);
        let out = atr(&candles, 14);
        assert!(out[..13].iter().all(Option::is_none));
        assert_approx(out[13].unwrap(), 2.0);
        assert_approx(out[19].unwrap(), 2.0);
    }
}
