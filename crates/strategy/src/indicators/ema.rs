/// Exponential Moving Average over a raw series.
///
/// `k = 2 / (period + 1)`, seeded with the SMA of the first full window.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    ema_of(&super::defined(values), period)
}

/// EMA of a derived series that may carry undefined positions.
pub fn ema_of(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    seeded_recurrence(values, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder's smoothing (`alpha = 1 / period`), as used by RSI, ATR and ADX.
pub fn wilder(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    seeded_recurrence(values, period, 1.0 / period as f64)
}

/// `s[t] = alpha * x[t] + (1 - alpha) * s[t-1]`, seeded with the mean of the
/// first `period` consecutive defined values. An undefined input resets the
/// recurrence; it re-seeds once another full window is available.
pub fn seeded_recurrence(values: &[Option<f64>], period: usize, alpha: f64) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 {
        return out;
    }

    let mut prev: Option<f64> = None;
    let mut run = 0usize;
    let mut sum = 0.0;
    for i in 0..n {
        match (values[i], prev) {
            (Some(v), Some(p)) => {
                let s = alpha * v + (1.0 - alpha) * p;
                out[i] = Some(s);
                prev = Some(s);
            }
            (Some(v), None) => {
                run += 1;
                sum += v;
                if run == period {
                    let seed = sum / period as f64;
                    out[i] = Some(seed);
                    prev = Some(seed);
                }
            }
            (None, _) => {
                prev = None;
                run = 0;
                sum = 0.0;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn ema_seeds_with_sma() {
        let out = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_approx(out[2].unwrap(), 4.0);
        // k = 0.5: 0.5 * 8 + 0.5 * 4
        assert_approx(out[3].unwrap(), 6.0);
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let out = ema(&[5.0; 30], 10);
        assert!(out[9..].iter().all(|v| (v.unwrap() - 5.0).abs() < 1e-12));
    }

    #[test]
    fn nan_input_is_undefined_not_zero() {
        let out = ema(&[1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0], 2);
        assert_eq!(out[2], None);
        assert_eq!(out[3], None);
        assert_approx(out[4].unwrap(), 4.5);
    }

    #[test]
    fn wilder_uses_one_over_period() {
        let out = wilder(&[Some(1.0), Some(3.0), Some(5.0)], 2);
        assert_approx(out[1].unwrap(), 2.0);
        assert_approx(out[2].unwrap(), 3.5);
    }
}
