use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Direction, Outcome, Result, Signal, SignalCandidate, SignalStatus};

/// Durable record of every emitted signal and its resolution state.
///
/// `SqliteLedger` in `crates/ledger` is the production implementation. The
/// ledger is the only owner of signal rows; the resolution engine and the
/// confidence estimator go through this trait.
#[async_trait]
pub trait SignalLedger: Send + Sync {
    /// Persist a new PENDING signal and return it with its assigned id.
    /// Rejects candidates whose stop/entry/target are not ordered for their
    /// direction.
    async fn append(&self, candidate: &SignalCandidate, created_at: DateTime<Utc>) -> Result<Signal>;

    async fn get(&self, id: &str) -> Result<Option<Signal>>;

    /// PENDING rows, oldest first.
    async fn list_pending(&self, filter: &PendingFilter) -> Result<Vec<Signal>>;

    /// Move a PENDING row to its terminal state. Never touches a row that is
    /// not PENDING.
    async fn mark_resolved(
        &self,
        id: &str,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
        source: &str,
    ) -> Result<MarkResult>;

    /// WON/LOST rows matching the query, oldest first.
    async fn list_resolved(&self, query: &ResolvedQuery) -> Result<Vec<Signal>>;

    /// Most recently created row for a (symbol, strategy), any status.
    async fn latest_for(&self, symbol: &str, strategy: &str) -> Result<Option<Signal>>;

    async fn status_counts(&self) -> Result<StatusCounts>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    pub symbol: Option<String>,
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub symbol: Option<String>,
    pub direction: Option<Direction>,
    pub strategy: Option<String>,
    /// Only rows created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Acknowledgement of a `mark_resolved` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkResult {
    Applied,
    /// The row had already left PENDING; nothing was written.
    AlreadyFinal(SignalStatus),
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub won: u64,
    pub lost: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.won + self.lost
    }

    pub fn resolved(&self) -> u64 {
        self.won + self.lost
    }
}
