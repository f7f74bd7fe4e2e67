use std::time::Duration;

use chrono::NaiveTime;

/// All configuration loaded from environment variables at startup.
/// Malformed values cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,

    // Rule book (universe + rules) TOML path
    pub rules_config_path: String,

    // Telegram; `None` disables notifications
    pub telegram: Option<TelegramConfig>,

    // Confidence estimator
    pub min_confidence_samples: usize,
    pub confidence_lookback_days: i64,

    // Scan cycle
    pub scan_concurrency: usize,
    pub fetch_timeout: Duration,
    /// `None` = run one cycle and exit (cron style).
    pub scan_interval: Option<Duration>,

    // Trading session gate
    pub force_run: bool,
    pub session_open: NaiveTime,
    pub session_close: NaiveTime,
    pub session_utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_ids: Vec<i64>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let telegram = match (optional_env("TELEGRAM_BOT_TOKEN"), optional_env("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(ids)) => Some(TelegramConfig {
                bot_token,
                chat_ids: parse_chat_ids(&ids),
            }),
            _ => None,
        };

        // GitHub's manual trigger counts as a forced run
        let force_run = optional_env("FORCE_RUN")
            .map(|v| parse_bool("FORCE_RUN", &v))
            .unwrap_or(false)
            || optional_env("GITHUB_EVENT_NAME").as_deref() == Some("workflow_dispatch");

        Config {
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://signals.db".to_string()),
            rules_config_path: optional_env("RULES_CONFIG_PATH")
                .unwrap_or_else(|| "config/rules.toml".to_string()),
            telegram,
            min_confidence_samples: parsed_env("MIN_CONFIDENCE_SAMPLES", 5),
            confidence_lookback_days: parsed_env("CONFIDENCE_LOOKBACK_DAYS", 365),
            scan_concurrency: parsed_env::<usize>("SCAN_CONCURRENCY", 4).max(1),
            fetch_timeout: Duration::from_secs(parsed_env("FETCH_TIMEOUT_SECS", 15)),
            scan_interval: optional_env("SCAN_INTERVAL_SECS")
                .map(|v| Duration::from_secs(parse_value("SCAN_INTERVAL_SECS", &v))),
            force_run,
            session_open: time_env("SESSION_OPEN", "09:15"),
            session_close: time_env("SESSION_CLOSE", "15:30"),
            session_utc_offset_minutes: parsed_env("SESSION_UTC_OFFSET_MINUTES", 330),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional_env(key)
        .map(|v| parse_value(key, &v))
        .unwrap_or(default)
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> T {
    raw.trim()
        .parse()
        .unwrap_or_else(|_| panic!("Environment variable '{key}' has an invalid value: '{raw}'"))
}

fn time_env(key: &str, default: &str) -> NaiveTime {
    let raw = optional_env(key).unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .unwrap_or_else(|_| panic!("'{key}' must be HH:MM, got: '{raw}'"))
}

fn parse_bool(key: &str, raw: &str) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        other => panic!("'{key}' must be true or false, got: '{other}'"),
    }
}

fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .unwrap_or_else(|_| panic!("TELEGRAM_CHAT_ID contains non-numeric ID: '{s}'"))
        })
        .collect()
}
