use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use common::{Candle, CandleSource, Error, Granularity, Result};

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) signalbot/0.1";

/// Yahoo Finance chart API client (`/v8/finance/chart/{symbol}`).
pub struct YahooClient {
    http: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

/// Yahoo's interval parameter.
fn interval(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::M1 => "1m",
        Granularity::M5 => "5m",
        Granularity::M15 => "15m",
        Granularity::M30 => "30m",
        Granularity::H1 => "60m",
        Granularity::D1 => "1d",
    }
}

/// Oldest data Yahoo serves per interval.
fn history_cap(granularity: Granularity) -> ChronoDuration {
    match granularity {
        Granularity::M1 => ChronoDuration::days(7),
        Granularity::M5 | Granularity::M15 | Granularity::M30 => ChronoDuration::days(59),
        Granularity::H1 => ChronoDuration::days(729),
        Granularity::D1 => ChronoDuration::days(365 * 10),
    }
}

/// Calendar span that should contain `lookback` bars. Exchanges trade
/// roughly a quarter of the day on five days out of seven, so intraday
/// spans are stretched accordingly; nights, weekends and holidays are the
/// gaps being covered.
fn request_span(granularity: Granularity, lookback: usize) -> ChronoDuration {
    let factor = match granularity {
        Granularity::D1 => 2,
        _ => 6,
    };
    let span = granularity.duration() * (lookback.clamp(1, 100_000) as i32) * factor + ChronoDuration::days(3);
    span.min(history_cap(granularity))
}

#[async_trait]
impl CandleSource for YahooClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        lookback: usize,
    ) -> Result<Vec<Candle>> {
        let now = Utc::now();
        let start = now - request_span(granularity, lookback);
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            symbol.replace('^', "%5E")
        );

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("interval", interval(granularity).to_string()),
                ("period1", start.timestamp().to_string()),
                ("period2", now.timestamp().to_string()),
                ("includePrePost", "false".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("{symbol}: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("{symbol}: HTTP 429")));
        }
        if status == StatusCode::NOT_FOUND {
            debug!(%symbol, "No chart data (404)");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Error::Http(format!("{symbol}: HTTP {status}: {body}")));
        }

        let candles = parse_chart(&body, lookback)?;
        debug!(%symbol, %granularity, count = candles.len(), "Fetched candles");
        Ok(candles)
    }
}

/// Decode a chart response, dropping rows with any missing OHLC value and
/// keeping the last `lookback` candles.
pub fn parse_chart(body: &str, lookback: usize) -> Result<Vec<Candle>> {
    let resp: ChartResponse = serde_json::from_str(body)
        .map_err(|e| Error::Data(format!("malformed chart response: {e}")))?;

    if let Some(err) = resp.chart.error {
        if err.code == "Not Found" {
            return Ok(Vec::new());
        }
        return Err(Error::Data(format!("{}: {}", err.code, err.description)));
    }

    let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();
    let mut candles: Vec<Candle> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let open_time = DateTime::<Utc>::from_timestamp(ts, 0)?;
            Some(Candle {
                open_time,
                open: at(&quote.open, i)?,
                high: at(&quote.high, i)?,
                low: at(&quote.low, i)?,
                close: at(&quote.close, i)?,
                volume: at(&quote.volume, i).unwrap_or(0.0).max(0.0),
            })
        })
        .collect();

    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    let start = candles.len().saturating_sub(lookback);
    Ok(candles.split_off(start))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}
