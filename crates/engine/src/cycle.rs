use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use common::{
    CandleSeries, CandleSource, Clock, Granularity, MarkResult, PendingFilter, Result, Signal,
    SignalCandidate, SignalLedger,
};
use strategy::{Evaluation, InsufficientHistory, RuleBook, SignalRule, Strategy};

use crate::confidence::{ConfidenceConfig, ConfidenceEstimator, Snapshot, WinRate};
use crate::resolution::{forward_lookback, resolution_source, resolve, Resolution};

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Symbols fetched and evaluated in parallel.
    pub concurrency: usize,
    pub confidence: ConfidenceConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            confidence: ConfidenceConfig::default(),
        }
    }
}

/// A signal appended during this cycle, with its historical context.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub signal: Signal,
    pub win_rate: WinRate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    NoData,
    InsufficientHistory(InsufficientHistory),
    /// A signal for the same (symbol, rule) was created too recently.
    Cooldown { until: DateTime<Utc> },
    /// The latest closed candle already produced a signal in an earlier cycle.
    AlreadySignalled,
    Ledger(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub symbol: String,
    pub strategy: Option<String>,
    pub reason: SkipReason,
}

/// Everything one cycle did, for logging and notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub new_signals: Vec<NewSignal>,
    /// Signals finalized this cycle, as stored after the update.
    pub resolved: Vec<Signal>,
    pub skipped: Vec<Skip>,
    pub snapshot: Snapshot,
}

/// Runs scan cycles: resolve open signals, scan the universe, summarize.
///
/// Holds no mutable state between cycles; the ledger is the only memory.
pub struct Scanner {
    source: Arc<dyn CandleSource>,
    ledger: Arc<dyn SignalLedger>,
    clock: Arc<dyn Clock>,
    rules: Arc<RuleBook>,
    estimator: ConfidenceEstimator,
    concurrency: usize,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn CandleSource>,
        ledger: Arc<dyn SignalLedger>,
        clock: Arc<dyn Clock>,
        rules: Arc<RuleBook>,
        config: ScanConfig,
    ) -> Self {
        Self {
            source,
            ledger,
            clock,
            rules,
            estimator: ConfidenceEstimator::new(config.confidence),
            concurrency: config.concurrency.max(1),
        }
    }

    /// One full evaluation cycle. Per-symbol failures are recorded in the
    /// report; only a failure to read the final snapshot is returned as an
    /// error.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = self.clock.now();
        info!(
            symbols = self.rules.universe().len(),
            rules = self.rules.rules().len(),
            "Scan cycle started"
        );

        let mut resolved = self.resolve_pending(started_at).await;
        resolved.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let now = self.clock.now();
        let results: Vec<(Vec<NewSignal>, Vec<Skip>)> = stream::iter(self.rules.universe().iter().cloned())
            .map(|symbol| async move { self.scan_symbol(&symbol, now).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut new_signals = Vec::new();
        let mut skipped = Vec::new();
        for (signals, skips) in results {
            new_signals.extend(signals);
            skipped.extend(skips);
        }
        new_signals.sort_by(|a, b| {
            (&a.signal.symbol, &a.signal.strategy).cmp(&(&b.signal.symbol, &b.signal.strategy))
        });
        skipped.sort_by(|a, b| (&a.symbol, &a.strategy).cmp(&(&b.symbol, &b.strategy)));

        let snapshot = self.estimator.snapshot(self.ledger.as_ref()).await?;
        info!(
            new = new_signals.len(),
            resolved = resolved.len(),
            skipped = skipped.len(),
            pending = snapshot.pending,
            win_rate = %snapshot.overall_win_rate,
            "Scan cycle finished"
        );

        Ok(CycleReport {
            started_at,
            new_signals,
            resolved,
            skipped,
            snapshot,
        })
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    async fn resolve_pending(&self, now: DateTime<Utc>) -> Vec<Signal> {
        let pending = match self.ledger.list_pending(&PendingFilter::default()).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to list pending signals");
                return Vec::new();
            }
        };
        if pending.is_empty() {
            return Vec::new();
        }
        debug!(count = pending.len(), "Resolving pending signals");

        // One fetch per (symbol, granularity)
        let mut groups: HashMap<(String, Granularity), Vec<Signal>> = HashMap::new();
        for signal in pending {
            groups
                .entry((signal.symbol.clone(), signal.granularity))
                .or_default()
                .push(signal);
        }

        let batches: Vec<Vec<Signal>> = stream::iter(groups)
            .map(|((symbol, granularity), signals)| async move {
                self.resolve_group(&symbol, granularity, signals, now).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        batches.into_iter().flatten().collect()
    }

    async fn resolve_group(
        &self,
        symbol: &str,
        granularity: Granularity,
        signals: Vec<Signal>,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let lookback = signals
            .iter()
            .map(|s| forward_lookback(s, now))
            .max()
            .unwrap_or(0);

        let candles = match self.source.fetch_candles(symbol, granularity, lookback).await {
            Ok(c) => c,
            Err(e) => {
                warn!(%symbol, %granularity, error = %e, "Forward fetch failed; signals stay pending");
                return Vec::new();
            }
        };

        let mut resolved = Vec::new();
        for signal in signals {
            let (outcome, candle_time) = match resolve(&signal, &candles) {
                Resolution::Pending => {
                    debug!(id = %signal.id, %symbol, "Still pending");
                    continue;
                }
                Resolution::AlreadyFinal(status) => {
                    warn!(id = %signal.id, %status, "Listed as pending but already final");
                    continue;
                }
                r => match r.outcome() {
                    Some(hit) => hit,
                    None => continue,
                },
            };

            let source = resolution_source(granularity, candle_time);
            // the ledger keeps millisecond precision
            let resolved_at = self.clock.now().trunc_subsecs(3);
            match self
                .ledger
                .mark_resolved(&signal.id, outcome, resolved_at, &source)
                .await
            {
                Ok(MarkResult::Applied) => {
                    info!(
                        id = %signal.id,
                        %symbol,
                        strategy = %signal.strategy,
                        status = %outcome.status(),
                        %source,
                        "Signal resolved"
                    );
                    resolved.push(Signal {
                        status: outcome.status(),
                        resolved_at: Some(resolved_at),
                        resolution_source: Some(source),
                        ..signal
                    });
                }
                // the ledger already logged the rejected transition
                Ok(MarkResult::AlreadyFinal(_)) | Ok(MarkResult::NotFound) => {}
                Err(e) => error!(id = %signal.id, error = %e, "Failed to record resolution"),
            }
        }
        resolved
    }

    // ── Detection ─────────────────────────────────────────────────────────────

    async fn scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> (Vec<NewSignal>, Vec<Skip>) {
        let mut signals = Vec::new();
        let mut skips = Vec::new();
        let skip = |rule: &SignalRule, reason: SkipReason| Skip {
            symbol: symbol.to_string(),
            strategy: Some(rule.name.clone()),
            reason,
        };

        for (granularity, lookback) in self.rules.fetch_plan() {
            let rules: Vec<&SignalRule> = self
                .rules
                .rules()
                .iter()
                .filter(|r| r.granularity == granularity)
                .collect();

            let candles = match self.source.fetch_candles(symbol, granularity, lookback).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(%symbol, %granularity, error = %e, "Fetch failed; skipping symbol");
                    skips.extend(rules.iter().map(|r| skip(*r, SkipReason::FetchFailed(e.to_string()))));
                    continue;
                }
            };
            if candles.is_empty() {
                warn!(%symbol, %granularity, "No candles returned; skipping symbol");
                skips.extend(rules.iter().map(|r| skip(*r, SkipReason::NoData)));
                continue;
            }

            let series = CandleSeries::new(symbol, granularity, candles);
            for rule in rules {
                match rule.evaluate(&series, now) {
                    Evaluation::InsufficientHistory(short) => {
                        warn!(
                            %symbol,
                            rule = %rule.name,
                            have = short.have,
                            need = short.need,
                            "Insufficient history; skipping"
                        );
                        skips.push(skip(rule, SkipReason::InsufficientHistory(short)));
                    }
                    Evaluation::NoSignal => {
                        debug!(%symbol, rule = %rule.name, "No signal");
                    }
                    Evaluation::Signal(candidate) => match self.record(rule, candidate, now).await {
                        Ok(signal) => signals.push(signal),
                        Err(reason) => skips.push(skip(rule, reason)),
                    },
                }
            }
        }
        (signals, skips)
    }

    /// Apply de-duplication and cooldown, then append.
    async fn record(
        &self,
        rule: &SignalRule,
        candidate: SignalCandidate,
        now: DateTime<Utc>,
    ) -> Result<NewSignal, SkipReason> {
        let symbol = candidate.symbol.as_str();
        match self.ledger.latest_for(symbol, &rule.name).await {
            Ok(Some(prev)) => {
                if prev.candle_time == candidate.candle_time {
                    debug!(%symbol, rule = %rule.name, "Candle already signalled");
                    return Err(SkipReason::AlreadySignalled);
                }
                if let Some(cooldown) = rule.cooldown() {
                    let until = prev.created_at + cooldown;
                    if now < until {
                        info!(%symbol, rule = %rule.name, %until, "Signal suppressed by cooldown");
                        return Err(SkipReason::Cooldown { until });
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(%symbol, rule = %rule.name, error = %e, "Failed to read latest signal");
                return Err(SkipReason::Ledger(e.to_string()));
            }
        }

        let signal = match self.ledger.append(&candidate, now).await {
            Ok(s) => s,
            Err(e) => {
                error!(%symbol, rule = %rule.name, error = %e, "Failed to append signal");
                return Err(SkipReason::Ledger(e.to_string()));
            }
        };

        let win_rate = match self
            .estimator
            .estimate(self.ledger.as_ref(), symbol, signal.direction, &rule.name, now)
            .await
        {
            Ok(rate) => rate,
            Err(e) => {
                warn!(%symbol, rule = %rule.name, error = %e, "Win rate unavailable");
                WinRate::InsufficientData {
                    samples: 0,
                    required: self.estimator.config().min_samples,
                }
            }
        };

        info!(
            id = %signal.id,
            %symbol,
            strategy = %signal.strategy,
            direction = %signal.direction,
            entry = signal.entry_price,
            stop = signal.stop_price,
            target = signal.target_price,
            %win_rate,
            "New signal"
        );
        Ok(NewSignal { signal, win_rate })
    }
}
