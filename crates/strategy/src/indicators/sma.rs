/// Simple moving average over a raw series.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    sma_of(&super::defined(values), period)
}

/// Rolling mean of the last `period` values. Defined only where the whole
/// window is defined.
pub fn sma_of(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 {
        return out;
    }

    let mut run = 0usize;
    let mut sum = 0.0;
    for i in 0..n {
        match values[i] {
            Some(v) => {
                run += 1;
                sum += v;
                if run > period {
                    // run > period implies values[i - period] is defined
                    sum -= values[i - period].unwrap_or(0.0);
                }
                if run >= period {
                    out[i] = Some(sum / period as f64);
                }
            }
            None => {
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
    fn sma_undefined_before_full_window() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_approx(out[2].unwrap(), 2.0);
        assert_approx(out[3].unwrap(), 3.0);
    }

    #[test]
    fn sma_restarts_after_gap() {
        let out = sma_of(&[Some(1.0), Some(2.0), None, Some(4.0), Some(6.0)], 2);
        assert_eq!(out, vec![None, Some(1.5), None, None, Some(5.0)]);
    }
}
