//! Transport layer.
//!
//! Transports move raw JSON-RPC text between a peer and the protocol
//! handler. They know framing and connection state, never MCP semantics.

pub mod http;
pub mod stdio;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Receives each inbound message and produces the outbound reply, if any.
///
/// `None` means nothing goes back on the wire, as for notifications.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, raw: &str) -> Option<String>;
}

/// A running message channel.
///
/// `set_handler` must be called before `start`. `closed` completes when the
/// transport loop exits, whether through `stop`, peer disconnect, or error.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    fn set_handler(&self, handler: Arc<dyn MessageHandler>);

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn stats(&self) -> TransportStats;

    async fn closed(&self);
}

/// Wire framing for stream transports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One JSON document per line.
    #[default]
    NewlineDelimited,
    /// Big-endian u32 length header before each frame.
    LengthPrefixed,
}

impl FromStr for Framing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "newline" | "newline-delimited" | "lines" => Ok(Self::NewlineDelimited),
            "length-prefixed" | "length" => Ok(Self::LengthPrefixed),
            other => Err(Error::Config(format!("unknown framing: {}", other))),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewlineDelimited => write!(f, "newline-delimited"),
            Self::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

/// Point-in-time transport statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TransportStats {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub errors: u64,
    pub connected: bool,
    pub connected_since: Option<DateTime<Utc>>,
}

/// Shared counters behind [`TransportStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub received: AtomicU64,
    pub sent: AtomicU64,
    pub errors: AtomicU64,
    connected: AtomicBool,
    // Millisecond UTC timestamp, 0 while disconnected.
    connected_since_ms: AtomicI64,
}

impl StatCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Relaxed);
        self.connected_since_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.connected_since_ms.store(0, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStats {
        let since_ms = self.connected_since_ms.load(Ordering::Relaxed);
        TransportStats {
            messages_received: self.received.load(Ordering::Relaxed),
            messages_sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            connected_since: if since_ms > 0 {
                DateTime::from_timestamp_millis(since_ms)
            } else {
                None
            },
        }
    }
}
