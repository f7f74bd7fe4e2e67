use chrono::{DateTime, FixedOffset, Utc};

use engine::{CycleReport, NewSignal, Snapshot};

/// Telegram rejects messages longer than this many characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Presentation settings shared by every message.
#[derive(Debug, Clone)]
pub struct MessageStyle {
    /// Digest header, e.g. `NIFTY / BANKNIFTY Signals`.
    pub title: String,
    /// Timestamps are shown in this offset.
    pub offset: FixedOffset,
}

impl MessageStyle {
    pub fn new(title: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            title: title.into(),
            offset,
        }
    }

    fn local(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.offset).format("%Y-%m-%d %H:%M").to_string()
    }

    fn zone(&self) -> String {
        match self.offset.local_minus_utc() {
            19_800 => "IST".to_string(),
            0 => "UTC".to_string(),
            _ => format!("UTC{}", self.offset),
        }
    }
}

/// Signed distance from `entry` in percent, two decimals.
fn pct_from(entry: f64, level: f64) -> String {
    let pct = (level - entry) / entry * 100.0;
    if pct >= 0.0 {
        format!("+{pct:.2}%")
    } else {
        format!("{pct:.2}%")
    }
}

/// One signal as a Markdown block.
pub fn signal_block(new: &NewSignal, style: &MessageStyle) -> String {
    let s = &new.signal;
    let indicators = if s.indicators.is_empty() {
        "N/A".to_string()
    } else {
        s.indicators.join(", ")
    };
    [
        format!("*{} SIGNAL* — `{}`", s.direction, s.symbol),
        format!("Strategy: `{}` ({})", s.strategy, s.granularity),
        format!("Time: {} {}", style.local(s.created_at), style.zone()),
        format!("Entry: {:.2}", s.entry_price),
        format!("Target: {:.2} ({})", s.target_price, pct_from(s.entry_price, s.target_price)),
        format!("Stop Loss: {:.2} ({})", s.stop_price, pct_from(s.entry_price, s.stop_price)),
        format!("Win Probability (history): {}", new.win_rate),
        String::new(),
        format!("Indicators: {indicators}"),
    ]
    .join("\n")
}

pub fn accuracy_footer(snapshot: &Snapshot) -> String {
    format!(
        "📈 Historical Accuracy: {} | Total:{} | Wins:{} | Losses:{} | Pending:{}",
        snapshot.overall_win_rate, snapshot.total, snapshot.won, snapshot.lost, snapshot.pending
    )
}

/// The cycle digest, or `None` when the cycle produced no new signals.
pub fn digest(report: &CycleReport, style: &MessageStyle) -> Option<String> {
    if report.new_signals.is_empty() {
        return None;
    }
    let header = format!("📊 *{}* ({})", style.title, style.local(report.started_at));
    let blocks: Vec<String> = report
        .new_signals
        .iter()
        .map(|n| signal_block(n, style))
        .collect();
    Some(format!(
        "{header}\n\n{}\n\n{}",
        blocks.join(BLOCK_SEPARATOR),
        accuracy_footer(&report.snapshot)
    ))
}

/// Confirmation for a forced run that found nothing.
pub fn manual_run_ack(now: DateTime<Utc>, style: &MessageStyle) -> String {
    format!("✅ Manual run complete — no new signals ({}).", style.local(now))
}

/// Alert for a forced run whose cycle failed. The error text goes in a code
/// span so Markdown in it is shown literally.
pub fn manual_run_error(err: impl std::fmt::Display) -> String {
    format!(
        "❌ Bot error during manual run: `{}`",
        err.to_string().replace('`', "'")
    )
}

/// Everything to send for one cycle, already split for delivery.
pub fn cycle_messages(report: &CycleReport, manual: bool, style: &MessageStyle) -> Vec<String> {
    match digest(report, style) {
        Some(text) => split_message(&text, TELEGRAM_MAX_CHARS),
        None if manual => vec![manual_run_ack(report.started_at, style)],
        None => Vec::new(),
    }
}

/// Split `text` into chunks of at most `limit` characters, breaking on
/// line boundaries where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len += needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
        } else {
            // a single oversized line is cut by characters
            let chars: Vec<char> = line.chars().collect();
            let mut pieces = chars.chunks(limit).map(|c| c.iter().collect::<String>()).peekable();
            while let Some(piece) = pieces.next() {
                if pieces.peek().is_some() {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
