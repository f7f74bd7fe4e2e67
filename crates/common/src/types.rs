use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One fixed-duration OHLCV price bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// True once the bar's interval has fully elapsed at `now`.
    pub fn is_closed(&self, granularity: Granularity, now: DateTime<Utc>) -> bool {
        self.open_time + granularity.duration() <= now
    }

    /// (high + low + close) / 3, used by VWAP.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Bar duration of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "1d")]
    D1,
}

impl Granularity {
    pub fn duration(self) -> Duration {
        match self {
            Granularity::M1 => Duration::minutes(1),
            Granularity::M5 => Duration::minutes(5),
            Granularity::M15 => Duration::minutes(15),
            Granularity::M30 => Duration::minutes(30),
            Granularity::H1 => Duration::hours(1),
            Granularity::D1 => Duration::days(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::M1 => "1m",
            Granularity::M5 => "5m",
            Granularity::M15 => "15m",
            Granularity::M30 => "30m",
            Granularity::H1 => "1h",
            Granularity::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Granularity::M1),
            "5m" => Ok(Granularity::M5),
            "15m" => Ok(Granularity::M15),
            "30m" => Ok(Granularity::M30),
            "1h" | "60m" => Ok(Granularity::H1),
            "1d" => Ok(Granularity::D1),
            other => Err(Error::Other(format!("unknown granularity '{other}'"))),
        }
    }
}

/// Time-ordered candles for one symbol at one granularity.
///
/// Construction sorts by `open_time` and drops duplicate open times (the
/// later entry wins), so every consumer can rely on strict ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    symbol: String,
    granularity: Granularity,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, granularity: Granularity, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.open_time);
        let mut ordered: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match ordered.last_mut() {
                Some(last) if last.open_time == candle.open_time => *last = candle,
                _ => ordered.push(candle),
            }
        }
        Self {
            symbol: symbol.into(),
            granularity,
            candles: ordered,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Index of the most recent candle that is fully closed at `now`.
    pub fn last_closed_index(&self, now: DateTime<Utc>) -> Option<usize> {
        self.candles
            .iter()
            .rposition(|c| c.is_closed(self.granularity, now))
    }
}

/// Directional bias of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(Error::Other(format!("unknown direction '{other}'"))),
        }
    }
}

/// Lifecycle state of a ledger row. PENDING is the only initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Pending,
    Won,
    Lost,
}

impl SignalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalStatus::Pending => "PENDING",
            SignalStatus::Won => "WON",
            SignalStatus::Lost => "LOST",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SignalStatus::Pending)
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SignalStatus::Pending),
            "WON" => Ok(SignalStatus::Won),
            "LOST" => Ok(SignalStatus::Lost),
            other => Err(Error::Other(format!("unknown signal status '{other}'"))),
        }
    }
}

/// Terminal outcome written by the resolution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
}

impl Outcome {
    pub fn status(self) -> SignalStatus {
        match self {
            Outcome::Won => SignalStatus::Won,
            Outcome::Lost => SignalStatus::Lost,
        }
    }
}

/// Checks `LONG ⇒ stop < entry < target` and `SHORT ⇒ target < entry < stop`.
pub fn brackets_are_ordered(direction: Direction, entry: f64, stop: f64, target: f64) -> bool {
    if !(entry.is_finite() && stop.is_finite() && target.is_finite()) {
        return false;
    }
    match direction {
        Direction::Long => stop < entry && entry < target,
        Direction::Short => target < entry && entry < stop,
    }
}

/// A detector result that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub symbol: String,
    pub strategy: String,
    pub granularity: Granularity,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Open time of the closed candle the signal was detected on.
    pub candle_time: DateTime<Utc>,
    /// Tags of the conditions that matched, e.g. `EMA20>EMA50 cross`.
    pub indicators: Vec<String>,
}

impl SignalCandidate {
    pub fn is_well_formed(&self) -> bool {
        brackets_are_ordered(self.direction, self.entry_price, self.stop_price, self.target_price)
    }
}

/// A signal as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub symbol: String,
    pub strategy: String,
    pub granularity: Granularity,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub status: SignalStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Which bar decided the outcome, e.g. `15m bar @ 2024-03-04T04:00:00Z`.
    pub resolution_source: Option<String>,
    pub candle_time: DateTime<Utc>,
    pub indicators: Vec<String>,
}

impl Signal {
    pub fn is_pending(&self) -> bool {
        self.status == SignalStatus::Pending
    }

    pub fn is_well_formed(&self) -> bool {
        brackets_are_ordered(self.direction, self.entry_price, self.stop_price, self.target_price)
    }
}
