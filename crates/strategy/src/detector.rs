use chrono::{DateTime, Utc};
use tracing::debug;

use common::{Candle, Direction, SignalCandidate};

use crate::frame::{IndicatorFrame, SeriesKey};
use crate::rule::{Distance, EntryCondition, Filter, SignalRule};

/// True when `diff` moves from at-or-below zero at `i - 1` to strictly above
/// zero at `i`. Only the immediately preceding value is consulted.
pub fn crossed_up(diff: impl Fn(usize) -> Option<f64>, i: usize) -> bool {
    if i == 0 {
        return false;
    }
    match (diff(i - 1), diff(i)) {
        (Some(prev), Some(cur)) => prev <= 0.0 && cur > 0.0,
        _ => false,
    }
}

/// Mirror of [`crossed_up`].
pub fn crossed_down(diff: impl Fn(usize) -> Option<f64>, i: usize) -> bool {
    crossed_up(|j| diff(j).map(|d| -d), i)
}

/// Evaluate `rule` on the last candle fully closed at `now`.
///
/// `frame` must be aligned with `candles`. Returns `None` when nothing
/// triggers, when both directions trigger at once, or when the brackets
/// cannot be placed. Every current entry condition is exclusive between
/// LONG and SHORT on a single candle, so the both-directions arm only
/// guards future conditions and has no test.
pub fn detect(
    symbol: &str,
    candles: &[Candle],
    frame: &IndicatorFrame,
    rule: &SignalRule,
    now: DateTime<Utc>,
) -> Option<SignalCandidate> {
    if frame.len() != candles.len() {
        return None;
    }
    let i = candles
        .iter()
        .rposition(|c| c.is_closed(rule.granularity, now))?;

    let long = evaluate_direction(Direction::Long, candles, frame, rule, i);
    let short = evaluate_direction(Direction::Short, candles, frame, rule, i);

    let (direction, indicators) = match (long, short) {
        (Some(tags), None) => (Direction::Long, tags),
        (None, Some(tags)) => (Direction::Short, tags),
        (Some(_), Some(_)) => {
            debug!(%symbol, rule = %rule.name, "Both directions triggered; ignoring");
            return None;
        }
        (None, None) => return None,
    };

    let candle = &candles[i];
    let entry = candle.close;
    let stop_distance = distance(&rule.stop, entry, frame, i)?;
    let target_distance = distance(&rule.target, entry, frame, i)?;
    let (stop, target) = match direction {
        Direction::Long => (entry - stop_distance, entry + target_distance),
        Direction::Short => (entry + stop_distance, entry - target_distance),
    };

    let candidate = SignalCandidate {
        symbol: symbol.to_string(),
        strategy: rule.name.clone(),
        granularity: rule.granularity,
        direction,
        entry_price: entry,
        stop_price: stop,
        target_price: target,
        candle_time: candle.open_time,
        indicators,
    };

    if !candidate.is_well_formed() {
        debug!(%symbol, rule = %rule.name, entry, stop, target, "Bracket out of order; dropping");
        return None;
    }
    Some(candidate)
}

/// Tags of every condition that held, or `None` if the entry or any filter
/// failed for this direction.
fn evaluate_direction(
    direction: Direction,
    candles: &[Candle],
    frame: &IndicatorFrame,
    rule: &SignalRule,
    i: usize,
) -> Option<Vec<String>> {
    let mut tags = vec![entry_tag(&rule.entry, direction, frame, i)?];
    for filter in &rule.filters {
        tags.push(filter_tag(filter, direction, candles, frame, i)?);
    }
    Some(tags)
}

fn entry_tag(
    entry: &EntryCondition,
    direction: Direction,
    frame: &IndicatorFrame,
    i: usize,
) -> Option<String> {
    let crossed = |diff: &dyn Fn(usize) -> Option<f64>| match direction {
        Direction::Long => crossed_up(diff, i),
        Direction::Short => crossed_down(diff, i),
    };
    let sign = match direction {
        Direction::Long => '>',
        Direction::Short => '<',
    };

    match *entry {
        EntryCondition::MaCross { kind, fast, slow } => {
            let (f, s) = (kind.key(fast), kind.key(slow));
            let diff = |j: usize| Some(frame.value(&f, j)? - frame.value(&s, j)?);
            crossed(&diff).then(|| format!("{}{sign}{} cross", f.label(), s.label()))
        }
        EntryCondition::MaTrend { kind, fast, slow } => {
            let (f, s) = (kind.key(fast), kind.key(slow));
            let d = frame.value(&f, i)? - frame.value(&s, i)?;
            let holds = match direction {
                Direction::Long => d > 0.0,
                Direction::Short => d < 0.0,
            };
            holds.then(|| format!("{}{sign}{}", f.label(), s.label()))
        }
        EntryCondition::RsiCross { period, smoothing, oversold, overbought } => {
            let key = SeriesKey::Rsi { period, smoothing };
            let level = match direction {
                Direction::Long => oversold,
                Direction::Short => overbought,
            };
            let diff = |j: usize| Some(frame.value(&key, j)? - level);
            let verb = match direction {
                Direction::Long => "above",
                Direction::Short => "below",
            };
            crossed(&diff).then(|| format!("{} crossed {verb} {level}", key.label()))
        }
        EntryCondition::MacdCross { fast, slow, signal } => {
            let line = SeriesKey::MacdLine { fast, slow };
            let sig = SeriesKey::MacdSignal { fast, slow, signal };
            let diff = |j: usize| Some(frame.value(&line, j)? - frame.value(&sig, j)?);
            crossed(&diff).then(|| format!("MACD{sign}signal cross"))
        }
    }
}

fn filter_tag(
    filter: &Filter,
    direction: Direction,
    candles: &[Candle],
    frame: &IndicatorFrame,
    i: usize,
) -> Option<String> {
    let long = direction == Direction::Long;
    match *filter {
        Filter::Rsi { period, smoothing, long_min, long_max, short_min, short_max } => {
            let key = SeriesKey::Rsi { period, smoothing };
            let v = frame.value(&key, i)?;
            let (min, max) = if long { (long_min, long_max) } else { (short_min, short_max) };
            let within = min.map_or(true, |m| v > m) && max.map_or(true, |m| v < m);
            within.then(|| format!("{} {v:.1}", key.label()))
        }
        Filter::Adx { period, min } => {
            let key = SeriesKey::Adx(period);
            let v = frame.value(&key, i)?;
            (v >= min).then(|| format!("{} {v:.1}", key.label()))
        }
        Filter::Vwap => {
            let vwap = frame.value(&SeriesKey::Vwap, i)?;
            let close = candles[i].close;
            if long && close > vwap {
                Some("Above VWAP".to_string())
            } else if !long && close < vwap {
                Some("Below VWAP".to_string())
            } else {
                None
            }
        }
        Filter::Volume { period, multiple } => {
            let avg = frame.value(&SeriesKey::VolumeSma(period), i)?;
            let volume = candles[i].volume;
            (avg > 0.0 && volume > multiple * avg).then(|| format!("Volume {:.1}x", volume / avg))
        }
        Filter::Macd { fast, slow, signal } => {
            let line = frame.value(&SeriesKey::MacdLine { fast, slow }, i)?;
            let sig = frame.value(&SeriesKey::MacdSignal { fast, slow, signal }, i)?;
            if long && line > sig {
                Some("MACD>signal".to_string())
            } else if !long && line < sig {
                Some("MACD<signal".to_string())
            } else {
                None
            }
        }
    }
}

/// Absolute distance from entry; `None` unless strictly positive and finite.
fn distance(rule: &Distance, entry: f64, frame: &IndicatorFrame, i: usize) -> Option<f64> {
    let d = match *rule {
        Distance::Percent { percent } => entry * percent / 100.0,
        Distance::Atr { period, multiple } => frame.value(&SeriesKey::Atr(period), i)? * multiple,
    };
    (d.is_finite() && d > 0.0).then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::candles_from_closes;
    use chrono::Duration;
    use common::Granularity;

    fn series(values: &[f64]) -> impl Fn(usize) -> Option<f64> + '_ {
        move |j| values.get(j).copied()
    }

    #[test]
    fn cross_requires_previous_at_or_below() {
        assert!(crossed_up(series(&[-1.0, 1.0]), 1));
        assert!(crossed_up(series(&[0.0, 0.5]), 1));
        // both candles already above
        assert!(!crossed_up(series(&[0.5, 1.0]), 1));
        assert!(!crossed_up(series(&[-1.0, 0.0]), 1));
        assert!(!crossed_up(series(&[1.0]), 0));
    }

    #[test]
    fn touch_then_move_away_counts_as_a_cross() {
        assert!(crossed_up(series(&[1.0, 0.0, 1.0]), 2));
        assert!(crossed_up(series(&[1.0, -1.0, 1.0]), 2));
        assert!(crossed_up(series(&[-1.0, 0.0, 1.0]), 2));
        assert!(crossed_down(series(&[-1.0, 0.0, -1.0]), 2));
        assert!(crossed_down(series(&[1.0, 0.0, -1.0]), 2));
    }

    #[test]
    fn undefined_values_never_cross() {
        let values = [None, Some(1.0)];
        assert!(!crossed_up(|j| values[j], 1));
    }

    fn percent_rule(entry: EntryCondition) -> SignalRule {
        SignalRule {
            name: "TEST".to_string(),
            granularity: Granularity::M15,
            lookback: None,
            min_history: None,
            cooldown_minutes: None,
            entry,
            filters: vec![],
            stop: Distance::Percent { percent: 2.0 },
            target: Distance::Percent { percent: 6.0 },
        }
    }

    /// Downtrend that reverses sharply on the last few candles.
    fn reversal_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        closes.extend((0..6).map(|i| 91.0 + i as f64 * 3.0));
        closes
    }

    fn after_last(candles: &[Candle]) -> DateTime<Utc> {
        candles.last().unwrap().open_time + Duration::minutes(15)
    }

    /// Index of the first candle where `fast` SMA crosses above `slow` SMA.
    fn first_cross(closes: &[f64], fast: usize, slow: usize) -> usize {
        let f = crate::indicators::sma(closes, fast);
        let s = crate::indicators::sma(closes, slow);
        let diff = |j: usize| Some(f[j]? - s[j]?);
        (1..closes.len()).find(|&j| crossed_up(diff, j)).unwrap()
    }

    #[test]
    fn ma_cross_long_with_percent_brackets() {
        let closes = reversal_closes();
        let cross = first_cross(&closes, 3, 6);
        let candles = candles_from_closes(&closes[..=cross]);
        let rule = percent_rule(EntryCondition::MaCross { kind: crate::rule::MaKind::Sma, fast: 3, slow: 6 });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());

        let signal = detect("TCS.NS", &candles, &frame, &rule, after_last(&candles)).unwrap();
        let entry = closes[cross];
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry_price, entry);
        assert!((signal.stop_price - entry * 0.98).abs() < 1e-9);
        assert!((signal.target_price - entry * 1.06).abs() < 1e-9);
        assert_eq!(signal.indicators, vec!["SMA3>SMA6 cross".to_string()]);
        assert_eq!(signal.candle_time, candles[cross].open_time);
        assert!(signal.is_well_formed());
    }

    #[test]
    fn no_signal_one_candle_after_the_cross() {
        let closes = reversal_closes();
        let cross = first_cross(&closes, 3, 6);
        let candles = candles_from_closes(&closes[..=cross + 1]);
        let rule = percent_rule(EntryCondition::MaCross { kind: crate::rule::MaKind::Sma, fast: 3, slow: 6 });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        assert!(detect("TCS.NS", &candles, &frame, &rule, after_last(&candles)).is_none());
    }

    #[test]
    fn forming_candle_is_ignored() {
        let closes = reversal_closes();
        let cross = first_cross(&closes, 3, 6);
        let candles = candles_from_closes(&closes[..=cross]);
        let rule = percent_rule(EntryCondition::MaCross { kind: crate::rule::MaKind::Sma, fast: 3, slow: 6 });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        // crossing candle still open: evaluation falls back to the bar before it
        let mid_bar = candles[cross].open_time + Duration::minutes(5);
        assert!(detect("TCS.NS", &candles, &frame, &rule, mid_bar).is_none());
    }

    #[test]
    fn ma_trend_short_in_downtrend() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let candles = candles_from_closes(&closes);
        let rule = percent_rule(EntryCondition::MaTrend { kind: crate::rule::MaKind::Ema, fast: 5, slow: 10 });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        let signal = detect("INFY.NS", &candles, &frame, &rule, after_last(&candles)).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.stop_price > signal.entry_price);
        assert!(signal.target_price < signal.entry_price);
        assert_eq!(signal.indicators, vec!["EMA5<EMA10".to_string()]);
    }

    #[test]
    fn failing_filter_suppresses_signal() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let candles = candles_from_closes(&closes);
        let mut rule = percent_rule(EntryCondition::MaTrend { kind: crate::rule::MaKind::Ema, fast: 5, slow: 10 });
        // constant volume never exceeds 1.5x its own average
        rule.filters.push(Filter::Volume { period: 5, multiple: 1.5 });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        assert!(detect("INFY.NS", &candles, &frame, &rule, after_last(&candles)).is_none());
    }

    #[test]
    fn passing_filters_add_tags() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let candles = candles_from_closes(&closes);
        let mut rule = percent_rule(EntryCondition::MaTrend { kind: crate::rule::MaKind::Ema, fast: 5, slow: 10 });
        rule.filters.push(Filter::Vwap);
        rule.filters.push(Filter::Rsi {
            period: 5,
            smoothing: Default::default(),
            long_min: None,
            long_max: None,
            short_min: None,
            short_max: Some(50.0),
        });
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        let signal = detect("INFY.NS", &candles, &frame, &rule, after_last(&candles)).unwrap();
        assert_eq!(signal.indicators[1], "Below VWAP");
        assert_eq!(signal.indicators[2], "RSI5 0.0");
    }

    #[test]
    fn atr_distance_undefined_yields_no_signal() {
        let closes: Vec<f64> = (0..12).map(|i| 200.0 - i as f64).collect();
        let candles = candles_from_closes(&closes);
        let mut rule = percent_rule(EntryCondition::MaTrend { kind: crate::rule::MaKind::Sma, fast: 2, slow: 4 });
        rule.stop = Distance::Atr { period: 50, multiple: 1.0 };
        let frame = IndicatorFrame::compute(&candles, &rule.required_series());
        assert!(detect("INFY.NS", &candles, &frame, &rule, after_last(&candles)).is_none());
    }

    #[test]
    fn misaligned_frame_is_rejected() {
        let candles = candles_from_closes(&[1.0, 2.0, 3.0]);
        let rule = percent_rule(EntryCondition::MaTrend { kind: crate::rule::MaKind::Sma, fast: 1, slow: 2 });
        let frame = IndicatorFrame::compute(&candles[..2], &rule.required_series());
        assert!(detect("X", &candles, &frame, &rule, after_last(&candles)).is_none());
    }
}
