use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

/// Weekday trading hours at a fixed UTC offset. Holidays are not modelled.
#[derive(Debug, Clone, Copy)]
pub struct TradingSession {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
}

impl TradingSession {
    pub fn new(open: NaiveTime, close: NaiveTime, utc_offset_minutes: i32) -> anyhow::Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {utc_offset_minutes} minutes"))?;
        anyhow::ensure!(open < close, "session opens at {open} but closes at {close}");
        Ok(Self { open, close, offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Both ends inclusive.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = local.time();
        self.open <= t && t <= self.close
    }
}
