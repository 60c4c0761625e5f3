//! Telegram Bot API channel.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Auth: bot token embedded in the URL path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BotStatus, NotificationChannel};

const BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: SecretString,
    chat_id: String,
    identity: RwLock<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            bot_token,
            chat_id,
            identity: RwLock::new(String::new()),
        })
    }

    /// Prefix `text` with the bot identity, if one is set.
    fn compose(&self, text: &str) -> String {
        let identity = self.identity.read();
        if identity.is_empty() {
            text.to_string()
        } else {
            format!("[{identity}] {text}")
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.bot_token.expose_secret()
        );
        let resp = self
            .http
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error {status}: {body}");
        }
        Ok(())
    }

    async fn deliver(&self, text: String) {
        match self.post(&text).await {
            Ok(()) => debug!(chars = text.len(), "Telegram message sent"),
            Err(e) => warn!(error = %e, "Telegram delivery failed"),
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    fn set_identity(&self, name: &str) {
        *self.identity.write() = name.trim().to_string();
    }

    async fn send_status(&self, status: BotStatus) {
        self.deliver(self.compose(&format!("Bot is {status}"))).await;
    }

    async fn send_signal(&self, message: &str) {
        self.deliver(self.compose(message)).await;
    }
}
