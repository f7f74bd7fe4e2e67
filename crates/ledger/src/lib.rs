//! SQLite-backed signal ledger.
//!
//! Every write is a single statement. Resolution is a compare-and-swap on
//! `status = 'PENDING'`, so two processes racing on the same row cannot both
//! finalize it.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{
    Error, MarkResult, Outcome, PendingFilter, ResolvedQuery, Result, Signal, SignalCandidate,
    SignalLedger, SignalStatus, StatusCounts,
};

const COLUMNS: &str = "id, created_at, symbol, strategy, granularity, direction, entry_price, \
     stop_price, target_price, status, resolved_at, resolution_source, candle_time, indicators";

#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if missing) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Signal ledger ready");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SignalLedger for SqliteLedger {
    async fn append(&self, candidate: &SignalCandidate, created_at: DateTime<Utc>) -> Result<Signal> {
        if !candidate.is_well_formed() {
            return Err(Error::InvalidSignal(format!(
                "{} {} {}: entry {} stop {} target {} out of order",
                candidate.symbol,
                candidate.strategy,
                candidate.direction,
                candidate.entry_price,
                candidate.stop_price,
                candidate.target_price,
            )));
        }

        let signal = Signal {
            id: Uuid::new_v4().to_string(),
            created_at: created_at.trunc_subsecs(3),
            symbol: candidate.symbol.clone(),
            strategy: candidate.strategy.clone(),
            granularity: candidate.granularity,
            direction: candidate.direction,
            entry_price: candidate.entry_price,
            stop_price: candidate.stop_price,
            target_price: candidate.target_price,
            status: SignalStatus::Pending,
            resolved_at: None,
            resolution_source: None,
            candle_time: candidate.candle_time.trunc_subsecs(3),
            indicators: candidate.indicators.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO signals (id, created_at, symbol, strategy, granularity, direction,
                                 entry_price, stop_price, target_price, status, candle_time, indicators)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&signal.id)
        .bind(fmt_time(signal.created_at))
        .bind(&signal.symbol)
        .bind(&signal.strategy)
        .bind(signal.granularity.as_str())
        .bind(signal.direction.as_str())
        .bind(signal.entry_price)
        .bind(signal.stop_price)
        .bind(signal.target_price)
        .bind(signal.status.as_str())
        .bind(fmt_time(signal.candle_time))
        .bind(serde_json::to_string(&signal.indicators)?)
        .execute(&self.pool)
        .await?;

        debug!(id = %signal.id, symbol = %signal.symbol, strategy = %signal.strategy, "Signal appended");
        Ok(signal)
    }

    async fn get(&self, id: &str) -> Result<Option<Signal>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM signals WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_signal).transpose()
    }

    async fn list_pending(&self, filter: &PendingFilter) -> Result<Vec<Signal>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM signals WHERE status = 'PENDING'"
        ));
        if let Some(symbol) = &filter.symbol {
            qb.push(" AND symbol = ").push_bind(symbol.clone());
        }
        if let Some(strategy) = &filter.strategy {
            qb.push(" AND strategy = ").push_bind(strategy.clone());
        }
        qb.push(" ORDER BY created_at, id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_signal).collect()
    }

    async fn mark_resolved(
        &self,
        id: &str,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
        source: &str,
    ) -> Result<MarkResult> {
        let applied = sqlx::query(
            r#"
            UPDATE signals
            SET status = ?1, resolved_at = ?2, resolution_source = ?3
            WHERE id = ?4 AND status = 'PENDING'
            "#,
        )
        .bind(outcome.status().as_str())
        .bind(fmt_time(resolved_at.trunc_subsecs(3)))
        .bind(source)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if applied == 1 {
            return Ok(MarkResult::Applied);
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM signals WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match current {
            Some(raw) => {
                let status = SignalStatus::from_str(&raw)?;
                warn!(%id, %status, requested = %outcome.status(), "Signal already final; resolution ignored");
                Ok(MarkResult::AlreadyFinal(status))
            }
            None => {
                warn!(%id, "Resolution requested for unknown signal");
                Ok(MarkResult::NotFound)
            }
        }
    }

    async fn list_resolved(&self, query: &ResolvedQuery) -> Result<Vec<Signal>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM signals WHERE status IN ('WON', 'LOST')"
        ));
        if let Some(symbol) = &query.symbol {
            qb.push(" AND symbol = ").push_bind(symbol.clone());
        }
        if let Some(direction) = query.direction {
            qb.push(" AND direction = ").push_bind(direction.as_str());
        }
        if let Some(strategy) = &query.strategy {
            qb.push(" AND strategy = ").push_bind(strategy.clone());
        }
        if let Some(since) = query.since {
            qb.push(" AND created_at >= ").push_bind(fmt_time(since));
        }
        qb.push(" ORDER BY created_at, id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_signal).collect()
    }

    async fn latest_for(&self, symbol: &str, strategy: &str) -> Result<Option<Signal>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM signals WHERE symbol = ?1 AND strategy = ?2 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(symbol)
        .bind(strategy)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_signal).transpose()
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM signals GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n = row.try_get::<i64, _>("n")?.max(0) as u64;
            match SignalStatus::from_str(&status)? {
                SignalStatus::Pending => counts.pending = n,
                SignalStatus::Won => counts.won = n,
                SignalStatus::Lost => counts.lost = n,
            }
        }
        Ok(counts)
    }
}

fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Data(format!("invalid timestamp '{raw}' in ledger: {e}")))
}

fn row_to_signal(row: &SqliteRow) -> Result<Signal> {
    let resolved_at: Option<String> = row.try_get("resolved_at")?;
    let indicators: String = row.try_get("indicators")?;
    Ok(Signal {
        id: row.try_get("id")?,
        created_at: parse_time(row.try_get("created_at")?)?,
        symbol: row.try_get("symbol")?,
        strategy: row.try_get("strategy")?,
        granularity: row.try_get::<&str, _>("granularity")?.parse()?,
        direction: row.try_get::<&str, _>("direction")?.parse()?,
        entry_price: row.try_get("entry_price")?,
        stop_price: row.try_get("stop_price")?,
        target_price: row.try_get("target_price")?,
        status: row.try_get::<&str, _>("status")?.parse()?,
        resolved_at: resolved_at.as_deref().map(parse_time).transpose()?,
        resolution_source: row.try_get("resolution_source")?,
        candle_time: parse_time(row.try_get("candle_time")?)?,
        indicators: serde_json::from_str(&indicators)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use common::{Direction, Granularity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 4, 0, 0).unwrap()
    }

    fn candidate(symbol: &str, strategy: &str, direction: Direction) -> SignalCandidate {
        let (stop, target) = match direction {
            Direction::Long => (98.0, 106.0),
            Direction::Short => (102.0, 94.0),
        };
        SignalCandidate {
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            granularity: Granularity::M15,
            direction,
            entry_price: 100.0,
            stop_price: stop,
            target_price: target,
            candle_time: t0() - ChronoDuration::minutes(15),
            indicators: vec!["EMA20>EMA50 cross".to_string(), "Above VWAP".to_string()],
        }
    }

    #[tokio::test]
    async fn append_assigns_unique_ids_and_round_trips() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        let a = ledger.append(&candidate("TCS.NS", "INTRADAY", Direction::Long), t0()).await.unwrap();
        let b = ledger.append(&candidate("TCS.NS", "INTRADAY", Direction::Long), t0()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, SignalStatus::Pending);

        let stored = ledger.get(&a.id).await.unwrap().unwrap();
        assert_eq!(stored, a);
        assert!(ledger.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_rejects_misordered_brackets() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        let mut bad = candidate("TCS.NS", "INTRADAY", Direction::Long);
        bad.stop_price = 101.0;
        let err = ledger.append(&bad, t0()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSignal(_)));
        assert_eq!(ledger.status_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn mark_resolved_is_compare_and_swap() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        let s = ledger.append(&candidate("INFY.NS", "SWING", Direction::Short), t0()).await.unwrap();
        let at = t0() + ChronoDuration::hours(2);

        let first = ledger.mark_resolved(&s.id, Outcome::Won, at, "15m bar @ x").await.unwrap();
        assert_eq!(first, MarkResult::Applied);

        let later = at + ChronoDuration::hours(1);
        let second = ledger.mark_resolved(&s.id, Outcome::Lost, later, "15m bar @ y").await.unwrap();
        assert_eq!(second, MarkResult::AlreadyFinal(SignalStatus::Won));

        let stored = ledger.get(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Won);
        assert_eq!(stored.resolved_at, Some(at));
        assert_eq!(stored.resolution_source.as_deref(), Some("15m bar @ x"));

        let missing = ledger.mark_resolved("nope", Outcome::Won, at, "x").await.unwrap();
        assert_eq!(missing, MarkResult::NotFound);
    }

    #[tokio::test]
    async fn pending_and_resolved_listings_filter() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        let a = ledger.append(&candidate("TCS.NS", "INTRADAY", Direction::Long), t0()).await.unwrap();
        let b = ledger
            .append(&candidate("TCS.NS", "SWING", Direction::Short), t0() + ChronoDuration::minutes(1))
            .await
            .unwrap();
        let c = ledger
            .append(&candidate("INFY.NS", "INTRADAY", Direction::Long), t0() + ChronoDuration::minutes(2))
            .await
            .unwrap();
        ledger.mark_resolved(&a.id, Outcome::Lost, t0() + ChronoDuration::hours(1), "x").await.unwrap();

        let pending = ledger.list_pending(&PendingFilter::default()).await.unwrap();
        assert_eq!(pending.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec![b.id.as_str(), c.id.as_str()]);

        let tcs = PendingFilter { symbol: Some("TCS.NS".to_string()), strategy: None };
        assert_eq!(ledger.list_pending(&tcs).await.unwrap().len(), 1);

        let resolved = ledger.list_resolved(&ResolvedQuery::default()).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, a.id);

        let wrong_direction = ResolvedQuery {
            symbol: Some("TCS.NS".to_string()),
            direction: Some(Direction::Short),
            ..Default::default()
        };
        assert!(ledger.list_resolved(&wrong_direction).await.unwrap().is_empty());

        let too_recent = ResolvedQuery {
            since: Some(t0() + ChronoDuration::seconds(1)),
            ..Default::default()
        };
        assert!(ledger.list_resolved(&too_recent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_for_and_counts() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        assert!(ledger.latest_for("TCS.NS", "INTRADAY").await.unwrap().is_none());

        ledger.append(&candidate("TCS.NS", "INTRADAY", Direction::Long), t0()).await.unwrap();
        let newer = ledger
            .append(&candidate("TCS.NS", "INTRADAY", Direction::Short), t0() + ChronoDuration::minutes(30))
            .await
            .unwrap();
        ledger.mark_resolved(&newer.id, Outcome::Won, t0() + ChronoDuration::hours(1), "x").await.unwrap();

        let latest = ledger.latest_for("TCS.NS", "INTRADAY").await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);

        let counts = ledger.status_counts().await.unwrap();
        assert_eq!(counts, StatusCounts { pending: 1, won: 1, lost: 0 });
    }

    #[tokio::test]
    async fn rows_survive_reopening_the_database() {
        let path = std::env::temp_dir().join(format!("ledger-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let ledger = SqliteLedger::connect(&url).await.unwrap();
        let s = ledger.append(&candidate("SBIN.NS", "SWING", Direction::Long), t0()).await.unwrap();
        ledger.close().await;

        let reopened = SqliteLedger::connect(&url).await.unwrap();
        let stored = reopened.get(&s.id).await.unwrap().unwrap();
        assert_eq!(stored, s);
        reopened.close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
