//! Messaging transport health gate
//!
//! The broker transport itself (STOMP over WebSocket, watchdog, backoff)
//! lives outside this crate; the pipeline only consults its health flag
//! before accepting work, failing fast while the transport is down.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

/// Payload of one broker update message. Delivery triggers
/// `queue_submission(acc_no)` on the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessage {
    #[serde(rename = "accNo")]
    pub acc_no: String,
    #[serde(rename = "pagetabUrl", default)]
    pub pagetab_url: Option<String>,
    #[serde(rename = "extTabUrl", default)]
    pub ext_tab_url: Option<String>,
}

/// Health view of the messaging transport.
pub trait MessagingHealth: Send + Sync {
    /// Whether the transport is connected and updates are flowing.
    fn is_open(&self) -> bool;
}

/// Flag-backed health source, set by the transport's watchdog.
#[derive(Debug)]
pub struct StaticMessagingHealth {
    open: AtomicBool,
}

impl StaticMessagingHealth {
    #[must_use]
    pub const fn open() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub const fn closed() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Relaxed);
    }
}

impl MessagingHealth for StaticMessagingHealth {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}
