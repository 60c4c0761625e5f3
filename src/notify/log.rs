//! Channel that writes alerts to the tracing log. Used when no chat
//! credentials are configured.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use super::{BotStatus, NotificationChannel};

#[derive(Debug, Default)]
pub struct LogNotifier {
    identity: RwLock<String>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> String {
        self.identity.read().clone()
    }
}

#[async_trait]
impl NotificationChannel for LogNotifier {
    fn set_identity(&self, name: &str) {
        *self.identity.write() = name.to_string();
    }

    async fn send_status(&self, status: BotStatus) {
        info!(bot = %self.identity(), %status, "Bot status");
    }

    async fn send_signal(&self, message: &str) {
        info!(bot = %self.identity(), message, "Arbitrage signal");
    }
}
