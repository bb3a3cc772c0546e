//! Getting a human's attention: local cues on this machine and messages to
//! remote channels.

pub mod channels;
pub mod local;
pub mod pool;

use crate::config::Config;
use channels::{Channel, Telegram, Twilio};
use pool::NotificationPool;
use std::sync::Arc;

/// How loudly to get the operator's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Info,
    Attention,
    Success,
    Failure,
}

/// The human in the loop.
pub trait Operator {
    /// Synchronous, best-effort local cue.
    fn alert(&self, message: &str, urgency: Urgency);
    /// Fire-and-forget delivery to every remote channel.
    fn broadcast(&self, message: &str);
    /// Repeated loud cue for when the operator is needed right now.
    fn annoy(&self) {}
}

/// Local alerts plus a worker pool for the remote channels.
pub struct Notifier {
    pool: Option<NotificationPool>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn Channel>>, workers: usize) -> Self {
        let pool = if channels.is_empty() {
            log::info!("No remote notification channels configured");
            None
        } else {
            Some(NotificationPool::new(channels, workers))
        };
        Self { pool }
    }

    /// Builds every channel the config has credentials for.
    pub fn from_config(config: &Config) -> Self {
        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
        if let Some(tg) = &config.telegram {
            channels.push(Arc::new(Telegram::new(&tg.token, &tg.chat_id)));
        }
        if let Some(tw) = &config.twilio {
            channels.push(Arc::new(Twilio::new(
                &tw.sid,
                &tw.token,
                &tw.from_num,
                &tw.to_num,
            )));
        }
        Self::new(channels, 2)
    }

    /// Waits for queued messages to go out.
    pub fn shutdown(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

impl Operator for Notifier {
    fn alert(&self, message: &str, urgency: Urgency) {
        local::alert(message, urgency);
    }

    fn broadcast(&self, message: &str) {
        match &self.pool {
            Some(pool) => pool.submit(message),
            None => log::debug!("Skipping broadcast, no channels: {}", message),
        }
    }

    fn annoy(&self) {
        local::annoy();
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}
