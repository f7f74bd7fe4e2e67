use teloxide::{prelude::*, types::ParseMode};
use tracing::{info, warn};

use engine::CycleReport;

use crate::format::{cycle_messages, split_message, MessageStyle, TELEGRAM_MAX_CHARS};

/// Pushes scan results to the configured Telegram chats.
#[derive(Clone)]
pub struct Notifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
    style: MessageStyle,
}

impl Notifier {
    pub fn new(token: impl Into<String>, chat_ids: &[i64], style: MessageStyle) -> Self {
        Self {
            bot: Bot::new(token),
            chat_ids: chat_ids.iter().copied().map(ChatId).collect(),
            style,
        }
    }

    /// Send the digest for `report`. Returns the number of messages sent to
    /// each chat. Delivery failures are logged, never returned.
    pub async fn notify_cycle(&self, report: &CycleReport, manual: bool) -> usize {
        let messages = cycle_messages(report, manual, &self.style);
        if messages.is_empty() {
            info!("No new signals; nothing to send");
            return 0;
        }
        for message in &messages {
            send_alert(&self.bot, &self.chat_ids, message).await;
        }
        info!(
            signals = report.new_signals.len(),
            messages = messages.len(),
            chats = self.chat_ids.len(),
            "Telegram digest sent"
        );
        messages.len()
    }

    /// Free-form Markdown text, split as needed.
    pub async fn send_text(&self, text: &str) {
        for chunk in split_message(text, TELEGRAM_MAX_CHARS) {
            send_alert(&self.bot, &self.chat_ids, &chunk).await;
        }
    }
}

/// Send one Markdown message to every chat id.
pub async fn send_alert(bot: &Bot, chat_ids: &[ChatId], message: &str) {
    for &chat_id in chat_ids {
        if let Err(e) = bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::Markdown)
            .await
        {
            warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram message");
        }
    }
}
