mod session;

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use common::{CandleSource, Clock, Config, SignalLedger, SystemClock};
use engine::{ConfidenceConfig, ScanConfig, Scanner};
use feed::YahooClient;
use ledger::SqliteLedger;
use strategy::RuleBook;
use telegram_notify::{manual_run_error, MessageStyle, Notifier};

use session::TradingSession;

const DIGEST_TITLE: &str = "NIFTY / BANKNIFTY Signals";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let session = TradingSession::new(
        cfg.session_open,
        cfg.session_close,
        cfg.session_utc_offset_minutes,
    )?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    info!(
        rules = %cfg.rules_config_path,
        force_run = cfg.force_run,
        interval_secs = cfg.scan_interval.map(|d| d.as_secs()),
        "signalbot starting"
    );

    if cfg.scan_interval.is_none() && !cfg.force_run && !session.is_open(clock.now()) {
        info!("Market closed and not a forced run; exiting");
        return Ok(());
    }

    // ── Ledger ────────────────────────────────────────────────────────────────
    let ledger = Arc::new(
        SqliteLedger::connect(&cfg.database_url)
            .await
            .with_context(|| format!("Failed to open signal ledger at {}", cfg.database_url))?,
    );
    info!("Signal ledger ready");

    // ── Rules + collaborators ─────────────────────────────────────────────────
    let rules = Arc::new(RuleBook::load(&cfg.rules_config_path)?);
    let source: Arc<dyn CandleSource> = Arc::new(YahooClient::new(cfg.fetch_timeout)?);
    let scanner = Scanner::new(
        source,
        ledger.clone() as Arc<dyn SignalLedger>,
        clock.clone(),
        rules,
        ScanConfig {
            concurrency: cfg.scan_concurrency,
            confidence: ConfidenceConfig {
                min_samples: cfg.min_confidence_samples,
                lookback: chrono::Duration::days(cfg.confidence_lookback_days),
            },
        },
    );

    let notifier = match &cfg.telegram {
        Some(t) => Some(Notifier::new(
            t.bot_token.clone(),
            &t.chat_ids,
            MessageStyle::new(DIGEST_TITLE, session.offset()),
        )),
        None => {
            info!("Telegram not configured; results are logged only");
            None
        }
    };

    // ── Cycles ────────────────────────────────────────────────────────────────
    match cfg.scan_interval {
        None => {
            if let Err(e) = run_cycle(&scanner, notifier.as_ref(), cfg.force_run).await {
                error!(error = %format!("{e:#}"), "Scan cycle failed");
                if cfg.force_run {
                    if let Some(notifier) = &notifier {
                        notifier.send_text(&manual_run_error(format!("{e:#}"))).await;
                    }
                }
                ledger.close().await;
                return Err(e);
            }
        }
        Some(every) => {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !cfg.force_run && !session.is_open(clock.now()) {
                            info!("Market closed; waiting for next tick");
                            continue;
                        }
                        if let Err(e) = run_cycle(&scanner, notifier.as_ref(), false).await {
                            error!(error = %e, "Scan cycle failed");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }
    }

    ledger.close().await;
    info!("signalbot stopped");
    Ok(())
}

async fn run_cycle(scanner: &Scanner, notifier: Option<&Notifier>, manual: bool) -> anyhow::Result<()> {
    let report = scanner.run_cycle().await.context("Scan cycle failed")?;
    for skip in &report.skipped {
        debug!(symbol = %skip.symbol, strategy = ?skip.strategy, reason = ?skip.reason, "Skipped");
    }
    if let Some(notifier) = notifier {
        notifier.notify_cycle(&report, manual).await;
    }
    Ok(())
}
