//! Push notifications for refresh results
//!
//! Subscribers receive every token emitted after they subscribed, in emission
//! order. Nothing is replayed; a subscriber that falls more than the channel
//! capacity behind skips the tokens it missed.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventToken {
    /// A refresh pass changed at least one entity
    PointsUpdated,
    /// The daily full refresh produced changes
    DailySnapshot,
}

impl EventToken {
    pub fn as_str(self) -> &'static str {
        match self {
            EventToken::PointsUpdated => "points-updated",
            EventToken::DailySnapshot => "daily-snapshot",
        }
    }
}

impl fmt::Display for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<EventToken>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventToken> {
        self.tx.subscribe()
    }

    /// Emit to current subscribers; returns how many received it
    pub fn emit(&self, token: EventToken) -> usize {
        match self.tx.send(token) {
            Ok(receivers) => {
                tracing::debug!(token = %token, receivers, "Emitted event");
                receivers
            },
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
