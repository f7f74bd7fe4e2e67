use std::fmt;

use chrono::{DateTime, Duration, Utc};

use common::{Direction, ResolvedQuery, Result, Signal, SignalLedger, SignalStatus, StatusCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceConfig {
    /// Resolved samples required before a percentage is reported.
    pub min_samples: usize,
    /// How far back resolved rows are considered.
    pub lookback: Duration,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            lookback: Duration::days(365),
        }
    }
}

/// Historical win rate, or why there is none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WinRate {
    /// 0–100, rounded to two decimals.
    Percent(f64),
    InsufficientData { samples: usize, required: usize },
}

impl WinRate {
    pub fn percent(&self) -> Option<f64> {
        match *self {
            WinRate::Percent(p) => Some(p),
            WinRate::InsufficientData { .. } => None,
        }
    }

    fn from_counts(won: u64, resolved: u64, min_samples: usize) -> Self {
        if resolved == 0 || resolved < min_samples as u64 {
            return WinRate::InsufficientData {
                samples: resolved as usize,
                required: min_samples,
            };
        }
        let pct = won as f64 / resolved as f64 * 100.0;
        WinRate::Percent((pct * 100.0).round() / 100.0)
    }
}

impl fmt::Display for WinRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WinRate::Percent(p) => write!(f, "{p:.2}%"),
            WinRate::InsufficientData { .. } => f.write_str("Insufficient data"),
        }
    }
}

/// Win rate over already-filtered rows. PENDING rows are ignored.
pub fn win_rate_from(rows: &[Signal], min_samples: usize) -> WinRate {
    let won = rows.iter().filter(|s| s.status == SignalStatus::Won).count() as u64;
    let lost = rows.iter().filter(|s| s.status == SignalStatus::Lost).count() as u64;
    WinRate::from_counts(won, won + lost, min_samples)
}

/// Win rate for (symbol, direction, strategy) over rows created at or after
/// `since`.
pub async fn win_rate(
    ledger: &dyn SignalLedger,
    symbol: &str,
    direction: Direction,
    strategy: &str,
    since: DateTime<Utc>,
    min_samples: usize,
) -> Result<WinRate> {
    let rows = ledger
        .list_resolved(&ResolvedQuery {
            symbol: Some(symbol.to_string()),
            direction: Some(direction),
            strategy: Some(strategy.to_string()),
            since: Some(since),
        })
        .await?;
    Ok(win_rate_from(&rows, min_samples))
}

/// Ledger-wide accuracy summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub total: u64,
    pub won: u64,
    pub lost: u64,
    pub pending: u64,
    pub overall_win_rate: WinRate,
}

impl Snapshot {
    pub fn from_counts(counts: StatusCounts, min_samples: usize) -> Self {
        Self {
            total: counts.total(),
            won: counts.won,
            lost: counts.lost,
            pending: counts.pending,
            overall_win_rate: WinRate::from_counts(counts.won, counts.resolved(), min_samples),
        }
    }
}

/// Read-only view over the ledger for historical confidence figures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ConfidenceConfig {
        self.config
    }

    /// Win rate over the configured lookback ending at `now`.
    pub async fn estimate(
        &self,
        ledger: &dyn SignalLedger,
        symbol: &str,
        direction: Direction,
        strategy: &str,
        now: DateTime<Utc>,
    ) -> Result<WinRate> {
        win_rate(
            ledger,
            symbol,
            direction,
            strategy,
            now - self.config.lookback,
            self.config.min_samples,
        )
        .await
    }

    pub async fn snapshot(&self, ledger: &dyn SignalLedger) -> Result<Snapshot> {
        let counts = ledger.status_counts().await?;
        Ok(Snapshot::from_counts(counts, self.config.min_samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::Granularity;

    fn row(status: SignalStatus) -> Signal {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 5, 0, 0).unwrap();
        Signal {
            id: "x".to_string(),
            created_at: t,
            symbol: "ITC.NS".to_string(),
            strategy: "SWING".to_string(),
            granularity: Granularity::H1,
            direction: Direction::Long,
            entry_price: 100.0,
            stop_price: 97.0,
            target_price: 106.0,
            status,
            resolved_at: None,
            resolution_source: None,
            candle_time: t,
            indicators: vec![],
        }
    }

    #[test]
    fn four_samples_are_insufficient() {
        use SignalStatus::*;
        let rows: Vec<Signal> = [Won, Won, Lost, Lost].into_iter().map(row).collect();
        let rate = win_rate_from(&rows, 5);
        assert_eq!(rate, WinRate::InsufficientData { samples: 4, required: 5 });
        assert_eq!(rate.to_string(), "Insufficient data");
    }

    #[test]
    fn five_samples_three_won_is_sixty_percent() {
        use SignalStatus::*;
        let rows: Vec<Signal> = [Won, Lost, Won, Lost, Won].into_iter().map(row).collect();
        let rate = win_rate_from(&rows, 5);
        assert_eq!(rate, WinRate::Percent(60.0));
        assert_eq!(rate.to_string(), "60.00%");
    }

    #[test]
    fn pending_rows_do_not_count() {
        use SignalStatus::*;
        let rows: Vec<Signal> = [Won, Won, Lost, Pending, Pending].into_iter().map(row).collect();
        assert!(win_rate_from(&rows, 5).percent().is_none());
    }

    #[test]
    fn rounds_to_two_decimals() {
        use SignalStatus::*;
        let rows: Vec<Signal> = [Won, Won, Lost].into_iter().map(row).collect();
        assert_eq!(win_rate_from(&rows, 1), WinRate::Percent(66.67));
    }

    #[test]
    fn zero_min_samples_with_no_rows_is_still_insufficient() {
        assert!(matches!(win_rate_from(&[], 0), WinRate::InsufficientData { samples: 0, .. }));
    }

    #[test]
    fn snapshot_applies_the_same_sample_rule() {
        let small = Snapshot::from_counts(StatusCounts { pending: 7, won: 2, lost: 1 }, 5);
        assert_eq!(small.total, 10);
        assert!(small.overall_win_rate.percent().is_none());

        let big = Snapshot::from_counts(StatusCounts { pending: 0, won: 3, lost: 1 }, 4);
        assert_eq!(big.overall_win_rate, WinRate::Percent(75.0));
    }
}
