pub mod format;
pub mod notifier;

pub use format::{
    cycle_messages, digest, manual_run_error, split_message, MessageStyle, TELEGRAM_MAX_CHARS,
};
pub use notifier::{send_alert, Notifier};
