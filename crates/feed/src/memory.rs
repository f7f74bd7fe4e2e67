use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use common::{Candle, CandleSource, Clock, Error, Granularity, Result};

type Key = (String, Granularity);

/// In-memory candle source for replays and tests.
///
/// With a clock attached, candles opening after `clock.now()` stay hidden,
/// so a whole history can be loaded up front and revealed bar by bar.
#[derive(Clone, Default)]
pub struct MemoryFeed {
    candles: Arc<RwLock<HashMap<Key, Vec<Candle>>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    clock: Option<Arc<dyn Clock>>,
    fetches: Arc<AtomicUsize>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    /// Replace the stored series for (symbol, granularity).
    pub async fn insert(&self, symbol: &str, granularity: Granularity, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.open_time);
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), granularity), candles);
    }

    /// Append one bar, replacing any bar with the same open time.
    pub async fn push(&self, symbol: &str, granularity: Granularity, candle: Candle) {
        let mut map = self.candles.write().await;
        let series = map.entry((symbol.to_string(), granularity)).or_default();
        series.retain(|c| c.open_time != candle.open_time);
        series.push(candle);
        series.sort_by_key(|c| c.open_time);
    }

    /// Make every fetch for `symbol` fail until [`recover`](Self::recover).
    pub async fn fail(&self, symbol: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(symbol.to_string(), message.to_string());
    }

    pub async fn recover(&self, symbol: &str) {
        self.failures.write().await.remove(symbol);
    }

    /// Number of `fetch_candles` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CandleSource for MemoryFeed {
    async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        lookback: usize,
    ) -> Result<Vec<Candle>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = self.failures.read().await.get(symbol) {
            return Err(Error::Data(format!("{symbol}: {message}")));
        }

        let now = self.clock.as_ref().map(|c| c.now());
        let map = self.candles.read().await;
        let visible: Vec<Candle> = map
            .get(&(symbol.to_string(), granularity))
            .map(|series| {
                series
                    .iter()
                    .filter(|c| now.map_or(true, |t| c.open_time <= t))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let start = visible.len().saturating_sub(lookback);
        debug!(%symbol, %granularity, returned = visible.len() - start, "Memory feed served candles");
        Ok(visible[start..].to_vec())
    }
}
