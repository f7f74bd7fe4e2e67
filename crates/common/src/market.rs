use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{Candle, Granularity, Result};

/// Abstraction over the market-data provider.
///
/// `YahooClient` implements this for live scans.
/// `MemoryFeed` implements this for replay and tests.
///
/// Implementations return an empty vector when the symbol simply has no
/// data right now. An `Err` is reserved for transport problems (rate limit,
/// timeout, malformed response); the scan cycle treats both the same way and
/// moves on to the next symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `lookback` most recent candles, oldest first. The last
    /// candle may still be forming.
    async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        lookback: usize,
    ) -> Result<Vec<Candle>>;
}

/// Wall-clock capability. Used to timestamp ledger rows and to size forward
/// resolution windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Replays and tests drive it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
