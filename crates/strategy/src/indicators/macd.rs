/// MACD (Moving Average Convergence/Divergence).
///
/// MACD line = EMA(fast) − EMA(slow), defined from index `slow - 1`.
pub fn macd_line(closes: &[f64], fast: usize, slow: usize) -> Vec<Option<f64>> {
    let fast_ema = super::ema(closes, fast);
    let slow_ema = super::ema(closes, slow);
    fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect()
}

/// Signal line = EMA(MACD line, signal), defined from index
/// `slow - 1 + signal - 1`.
pub fn macd_signal(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<Option<f64>> {
    super::ema_of(&macd_line(closes, fast, slow), signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_warm_up() {
        let prices = trending_up(60);
        let line = macd_line(&prices, 12, 26);
        let signal = macd_signal(&prices, 12, 26, 9);
        assert!(line[..25].iter().all(Option::is_none));
        assert!(line[25].is_some());
        assert!(signal[..33].iter().all(Option::is_none));
        assert!(signal[33].is_some());
    }

    #[test]
    fn macd_positive_on_steady_uptrend() {
        let prices = trending_up(60);
        let line = macd_line(&prices, 3, 6);
        assert!(line[59].unwrap() > 0.0);
    }

    #[test]
    fn macd_crosses_signal_after_reversal() {
        // Down then sharply up: the line must end above its signal line
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        prices.extend((0..20).map(|i| 90.0 + i as f64 * 2.0));
        let line = macd_line(&prices, 3, 6);
        let signal = macd_signal(&prices, 3, 6, 3);
        assert!(line[39].unwrap() > signal[39].unwrap());
        assert!(line[19].unwrap() <= 0.0);
    }
}
