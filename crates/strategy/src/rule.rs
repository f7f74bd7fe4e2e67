use chrono::Duration;
use serde::{Deserialize, Serialize};

use common::{Error, Granularity, Result};

use crate::frame::SeriesKey;
use crate::indicators::RsiSmoothing;

/// A named, stateless detection rule. The same rule is evaluated against
/// every symbol in the universe.
///
/// Example `config/rules.toml` entry:
/// ```toml
/// [[rule]]
/// name = "INTRADAY"
/// granularity = "15m"
/// cooldown_minutes = 45
/// entry = { type = "ma_cross", kind = "ema", fast = 20, slow = 50 }
/// stop = { type = "percent", percent = 1.5 }
/// target = { type = "percent", percent = 3.0 }
///
/// [[rule.filter]]
/// type = "rsi"
/// period = 14
/// long_max = 40.0
/// short_min = 60.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRule {
    /// Strategy name written to the ledger; unique within a rule book.
    pub name: String,
    pub granularity: Granularity,
    /// Candles to request per fetch. Defaults to twice the minimum history.
    #[serde(default)]
    pub lookback: Option<usize>,
    /// Overrides the minimum history derived from the indicator windows.
    #[serde(default)]
    pub min_history: Option<usize>,
    /// Suppress a new signal for the same symbol within this many minutes of
    /// the previous one.
    #[serde(default)]
    pub cooldown_minutes: Option<i64>,
    pub entry: EntryCondition,
    #[serde(default, rename = "filter")]
    pub filters: Vec<Filter>,
    pub stop: Distance,
    pub target: Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    #[default]
    Ema,
    Sma,
}

impl MaKind {
    pub fn key(self, period: usize) -> SeriesKey {
        match self {
            MaKind::Ema => SeriesKey::Ema(period),
            MaKind::Sma => SeriesKey::Sma(period),
        }
    }
}

/// What has to happen on the signal candle for a direction to trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryCondition {
    /// Fast average crosses the slow one: up → LONG, down → SHORT.
    MaCross {
        #[serde(default)]
        kind: MaKind,
        fast: usize,
        slow: usize,
    },
    /// Fast average above (LONG) or below (SHORT) the slow one.
    MaTrend {
        #[serde(default)]
        kind: MaKind,
        fast: usize,
        slow: usize,
    },
    /// RSI rising through `oversold` → LONG, falling through `overbought` → SHORT.
    RsiCross {
        #[serde(default = "default_rsi_period")]
        period: usize,
        #[serde(default)]
        smoothing: RsiSmoothing,
        oversold: f64,
        overbought: f64,
    },
    /// MACD line crosses its signal line.
    MacdCross {
        #[serde(default = "default_macd_fast")]
        fast: usize,
        #[serde(default = "default_macd_slow")]
        slow: usize,
        #[serde(default = "default_macd_signal")]
        signal: usize,
    },
}

/// Confirmation that must also hold on the signal candle. Every filter of a
/// rule must pass for a direction to be emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Strict RSI bounds per direction; an absent bound is unconstrained.
    Rsi {
        #[serde(default = "default_rsi_period")]
        period: usize,
        #[serde(default)]
        smoothing: RsiSmoothing,
        #[serde(default)]
        long_min: Option<f64>,
        #[serde(default)]
        long_max: Option<f64>,
        #[serde(default)]
        short_min: Option<f64>,
        #[serde(default)]
        short_max: Option<f64>,
    },
    /// Trend strength: ADX ≥ `min`, either direction.
    Adx {
        #[serde(default = "default_adx_period")]
        period: usize,
        min: f64,
    },
    /// Close above session VWAP for LONG, below for SHORT.
    Vwap,
    /// Volume above `multiple` × its SMA.
    Volume {
        #[serde(default = "default_volume_period")]
        period: usize,
        multiple: f64,
    },
    /// MACD line above (LONG) or below (SHORT) its signal line.
    Macd {
        #[serde(default = "default_macd_fast")]
        fast: usize,
        #[serde(default = "default_macd_slow")]
        slow: usize,
        #[serde(default = "default_macd_signal")]
        signal: usize,
    },
}

/// Distance from entry to stop or target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distance {
    /// Percent of the entry price (`1.5` = 1.5%).
    Percent { percent: f64 },
    /// Multiple of ATR at the signal candle.
    Atr {
        #[serde(default = "default_atr_period")]
        period: usize,
        multiple: f64,
    },
}

fn default_rsi_period() -> usize {
    14
}

fn default_adx_period() -> usize {
    14
}

fn default_atr_period() -> usize {
    14
}

fn default_volume_period() -> usize {
    20
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

impl EntryCondition {
    fn series(&self) -> Vec<SeriesKey> {
        match *self {
            EntryCondition::MaCross { kind, fast, slow } | EntryCondition::MaTrend { kind, fast, slow } => {
                vec![kind.key(fast), kind.key(slow)]
            }
            EntryCondition::RsiCross { period, smoothing, .. } => {
                vec![SeriesKey::Rsi { period, smoothing }]
            }
            EntryCondition::MacdCross { fast, slow, signal } => vec![
                SeriesKey::MacdLine { fast, slow },
                SeriesKey::MacdSignal { fast, slow, signal },
            ],
        }
    }
}

impl Filter {
    fn series(&self) -> Vec<SeriesKey> {
        match *self {
            Filter::Rsi { period, smoothing, .. } => vec![SeriesKey::Rsi { period, smoothing }],
            Filter::Adx { period, .. } => vec![SeriesKey::Adx(period)],
            Filter::Vwap => vec![SeriesKey::Vwap],
            Filter::Volume { period, .. } => vec![SeriesKey::VolumeSma(period)],
            Filter::Macd { fast, slow, signal } => vec![
                SeriesKey::MacdLine { fast, slow },
                SeriesKey::MacdSignal { fast, slow, signal },
            ],
        }
    }
}

impl Distance {
    fn series(&self) -> Option<SeriesKey> {
        match *self {
            Distance::Percent { .. } => None,
            Distance::Atr { period, .. } => Some(SeriesKey::Atr(period)),
        }
    }
}

impl SignalRule {
    /// Every indicator column the rule reads, without duplicates.
    pub fn required_series(&self) -> Vec<SeriesKey> {
        let mut keys = self.entry.series();
        keys.extend(self.filters.iter().flat_map(Filter::series));
        keys.extend(self.stop.series());
        keys.extend(self.target.series());

        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        unique
    }

    /// Closed candles needed before the rule can be evaluated: the largest
    /// warm-up plus two candles for the crossover look-back, and at least
    /// twice the largest window.
    pub fn required_history(&self) -> usize {
        if let Some(n) = self.min_history {
            return n;
        }
        let keys = self.required_series();
        let warmup = keys.iter().map(SeriesKey::warmup).max().unwrap_or(0);
        let window = keys.iter().map(SeriesKey::window).max().unwrap_or(1);
        (warmup + 2).max(2 * window)
    }

    /// Candles to request from the data source.
    pub fn fetch_lookback(&self) -> usize {
        let need = self.required_history();
        self.lookback.unwrap_or(need * 2).max(need)
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_minutes
            .filter(|m| *m > 0)
            .map(Duration::minutes)
    }

    /// Reject parameter sets that can never produce a meaningful signal.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(format!("rule '{}': {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(Error::Config("rule name must not be empty".to_string()));
        }
        if let Some(m) = self.cooldown_minutes {
            if m < 0 {
                return fail(format!("cooldown_minutes must be >= 0, got {m}"));
            }
        }

        match &self.entry {
            EntryCondition::MaCross { fast, slow, .. } | EntryCondition::MaTrend { fast, slow, .. } => {
                if *fast == 0 || fast >= slow {
                    return fail(format!("moving averages need 0 < fast < slow, got {fast}/{slow}"));
                }
            }
            EntryCondition::RsiCross { period, oversold, overbought, .. } => {
                if *period == 0 {
                    return fail("RSI period must be > 0".to_string());
                }
                if !(0.0 < *oversold && oversold < overbought && *overbought < 100.0) {
                    return fail(format!(
                        "RSI levels need 0 < oversold < overbought < 100, got {oversold}/{overbought}"
                    ));
                }
            }
            EntryCondition::MacdCross { fast, slow, signal } => {
                if *fast == 0 || fast >= slow || *signal == 0 {
                    return fail(format!("invalid MACD periods {fast}/{slow}/{signal}"));
                }
            }
        }

        for filter in &self.filters {
            match filter {
                Filter::Rsi { period, .. } if *period == 0 => {
                    return fail("RSI filter period must be > 0".to_string())
                }
                Filter::Adx { period, min } if *period == 0 || !min.is_finite() => {
                    return fail(format!("invalid ADX filter period={period} min={min}"))
                }
                Filter::Volume { period, multiple } if *period == 0 || !(*multiple > 0.0) => {
                    return fail(format!("invalid volume filter period={period} multiple={multiple}"))
                }
                Filter::Macd { fast, slow, signal } if *fast == 0 || fast >= slow || *signal == 0 => {
                    return fail(format!("invalid MACD filter periods {fast}/{slow}/{signal}"))
                }
                _ => {}
            }
        }

        for (label, distance) in [("stop", &self.stop), ("target", &self.target)] {
            let ok = match *distance {
                Distance::Percent { percent } => percent.is_finite() && percent > 0.0,
                Distance::Atr { period, multiple } => period > 0 && multiple.is_finite() && multiple > 0.0,
            };
            if !ok {
                return fail(format!("{label} distance must be positive: {distance:?}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intraday() -> SignalRule {
        toml::from_str(
            r#"
            name = "INTRADAY"
            granularity = "15m"
            cooldown_minutes = 45
            entry = { type = "ma_cross", fast = 20, slow = 50 }
            stop = { type = "atr", multiple = 1.2 }
            target = { type = "atr", multiple = 2.5 }

            [[filter]]
            type = "vwap"

            [[filter]]
            type = "adx"
            min = 25.0

            [[filter]]
            type = "volume"
            multiple = 1.2
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_tagged_variants_with_defaults() {
        let rule = intraday();
        assert_eq!(rule.granularity, Granularity::M15);
        assert_eq!(rule.entry, EntryCondition::MaCross { kind: MaKind::Ema, fast: 20, slow: 50 });
        assert_eq!(rule.stop, Distance::Atr { period: 14, multiple: 1.2 });
        assert_eq!(rule.filters.len(), 3);
        assert_eq!(rule.filters[2], Filter::Volume { period: 20, multiple: 1.2 });
        assert_eq!(rule.cooldown(), Some(Duration::minutes(45)));
        rule.validate().unwrap();
    }

    #[test]
    fn required_series_are_deduplicated() {
        let keys = intraday().required_series();
        assert_eq!(
            keys,
            vec![
                SeriesKey::Ema(20),
                SeriesKey::Ema(50),
                SeriesKey::Vwap,
                SeriesKey::Adx(14),
                SeriesKey::VolumeSma(20),
                SeriesKey::Atr(14),
            ]
        );
    }

    #[test]
    fn history_covers_warmup_margin_and_double_window() {
        let rule = intraday();
        // EMA50 dominates: warm-up 49 + 2 = 51 < 2 × 50
        assert_eq!(rule.required_history(), 100);
        assert_eq!(rule.fetch_lookback(), 200);

        let mut overridden = rule.clone();
        overridden.min_history = Some(60);
        overridden.lookback = Some(10);
        assert_eq!(overridden.required_history(), 60);
        assert_eq!(overridden.fetch_lookback(), 60);
    }

    #[test]
    fn validation_rejects_inverted_averages() {
        let mut rule = intraday();
        rule.entry = EntryCondition::MaCross { kind: MaKind::Sma, fast: 50, slow: 20 };
        assert!(matches!(rule.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validation_rejects_non_positive_distance() {
        let mut rule = intraday();
        rule.target = Distance::Percent { percent: 0.0 };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn validation_rejects_inverted_rsi_levels() {
        let mut rule = intraday();
        rule.entry = EntryCondition::RsiCross {
            period: 14,
            smoothing: RsiSmoothing::Simple,
            oversold: 70.0,
            overbought: 30.0,
        };
        assert!(rule.validate().is_err());
    }
}
