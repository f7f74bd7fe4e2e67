use std::collections::HashMap;

use common::Candle;
use thiserror::Error;

use crate::indicators::{self, RsiSmoothing};

/// Identifies one derived column of an [`IndicatorFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKey {
    Sma(usize),
    Ema(usize),
    Rsi { period: usize, smoothing: RsiSmoothing },
    Atr(usize),
    Adx(usize),
    MacdLine { fast: usize, slow: usize },
    MacdSignal { fast: usize, slow: usize, signal: usize },
    Vwap,
    VolumeSma(usize),
}

impl SeriesKey {
    /// Index of the first defined value.
    pub fn warmup(&self) -> usize {
        match *self {
            SeriesKey::Sma(p) | SeriesKey::Ema(p) | SeriesKey::Atr(p) | SeriesKey::VolumeSma(p) => {
                p.saturating_sub(1)
            }
            SeriesKey::Rsi { period, .. } => period,
            SeriesKey::Adx(p) => (2 * p).saturating_sub(1),
            SeriesKey::MacdLine { fast, slow } => fast.max(slow).saturating_sub(1),
            SeriesKey::MacdSignal { fast, slow, signal } => {
                fast.max(slow).saturating_sub(1) + signal.saturating_sub(1)
            }
            SeriesKey::Vwap => 0,
        }
    }

    /// Largest lookback window the series depends on.
    pub fn window(&self) -> usize {
        match *self {
            SeriesKey::Sma(p) | SeriesKey::Ema(p) | SeriesKey::Atr(p) | SeriesKey::VolumeSma(p) => p,
            SeriesKey::Rsi { period, .. } => period + 1,
            SeriesKey::Adx(p) => 2 * p,
            SeriesKey::MacdLine { fast, slow } => fast.max(slow),
            SeriesKey::MacdSignal { fast, slow, signal } => fast.max(slow) + signal,
            SeriesKey::Vwap => 1,
        }
    }

    /// Short human label, used in matched-condition tags.
    pub fn label(&self) -> String {
        match *self {
            SeriesKey::Sma(p) => format!("SMA{p}"),
            SeriesKey::Ema(p) => format!("EMA{p}"),
            SeriesKey::Rsi { period, .. } => format!("RSI{period}"),
            SeriesKey::Atr(p) => format!("ATR{p}"),
            SeriesKey::Adx(p) => format!("ADX{p}"),
            SeriesKey::MacdLine { .. } => "MACD".to_string(),
            SeriesKey::MacdSignal { .. } => "MACD signal".to_string(),
            SeriesKey::Vwap => "VWAP".to_string(),
            SeriesKey::VolumeSma(p) => format!("VolSMA{p}"),
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<Option<f64>> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        match *self {
            SeriesKey::Sma(p) => indicators::sma(&closes, p),
            SeriesKey::Ema(p) => indicators::ema(&closes, p),
            SeriesKey::Rsi { period, smoothing } => indicators::rsi(&closes, period, smoothing),
            SeriesKey::Atr(p) => indicators::atr(candles, p),
            SeriesKey::Adx(p) => indicators::adx(candles, p),
            SeriesKey::MacdLine { fast, slow } => indicators::macd_line(&closes, fast, slow),
            SeriesKey::MacdSignal { fast, slow, signal } => {
                indicators::macd_signal(&closes, fast, slow, signal)
            }
            SeriesKey::Vwap => indicators::session_vwap(candles),
            SeriesKey::VolumeSma(p) => {
                let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
                indicators::sma(&volumes, p)
            }
        }
    }
}

/// The candle series is too short for the rule's indicators. Expected for
/// newly listed or illiquid symbols; the caller skips the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient history: have {have} candles, need {need}")]
pub struct InsufficientHistory {
    pub have: usize,
    pub need: usize,
}

/// Derived series aligned 1:1 with a candle sequence.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    len: usize,
    columns: HashMap<SeriesKey, Vec<Option<f64>>>,
}

impl IndicatorFrame {
    /// Compute every requested column. Duplicated keys are computed once.
    pub fn compute(candles: &[Candle], keys: &[SeriesKey]) -> Self {
        let mut columns = HashMap::with_capacity(keys.len());
        for key in keys {
            columns.entry(*key).or_insert_with(|| key.compute(candles));
        }
        Self {
            len: candles.len(),
            columns,
        }
    }

    /// Like [`compute`](Self::compute), but refuses sequences shorter than
    /// `min_len`.
    pub fn with_min_history(
        candles: &[Candle],
        keys: &[SeriesKey],
        min_len: usize,
    ) -> Result<Self, InsufficientHistory> {
        if candles.len() < min_len {
            return Err(InsufficientHistory {
                have: candles.len(),
                need: min_len,
            });
        }
        Ok(Self::compute(candles, keys))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn series(&self, key: &SeriesKey) -> Option<&[Option<f64>]> {
        self.columns.get(key).map(Vec::as_slice)
    }

    /// Value of `key` at `index`; `None` when the column is missing, the index
    /// is out of range, or the position is still warming up.
    pub fn value(&self, key: &SeriesKey, index: usize) -> Option<f64> {
        self.columns.get(key)?.get(index).copied().flatten()
    }
}
