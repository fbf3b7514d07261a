//! User-visible status
//!
//! Every failure in the client ends up here as a short status line plus a
//! connection indicator. Renderers subscribe and draw whatever they like.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::mpsc;

/// Connection indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// Configuration present, nothing connected yet
    Ready,
    /// Streaming connection open
    Connected,
    /// No connection (initial state, or closed)
    #[default]
    Disconnected,
    /// Last operation failed
    Error,
}

impl Indicator {
    /// CSS-style class name, kept for renderers that mirror the web client
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Ready => "status-ready",
            Self::Connected => "status-connected",
            Self::Disconnected => "status-disconnected",
            Self::Error => "status-error",
        }
    }
}

/// Snapshot of everything the status area shows
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct StatusSnapshot {
    /// Connection indicator
    pub indicator: Indicator,
    /// Label next to the indicator
    pub connection_label: String,
    /// Main status line
    pub message: String,
    /// Whether the status line reports an error
    pub is_error: bool,
}

/// Shared status state with change notifications
pub struct StatusBoard {
    current: ArcSwap<StatusSnapshot>,
    listeners: Mutex<Vec<mpsc::Sender<StatusSnapshot>>>,
}

impl StatusBoard {
    /// Create a board showing "Disconnected"
    pub fn new() -> Self {
        Self {
            current: ArcSwap::new(Arc::new(StatusSnapshot {
                connection_label: "Disconnected".to_string(),
                ..Default::default()
            })),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create a shared board
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.current.load_full()
    }

    /// Set the status line
    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(status = %message, "Status updated");
        self.update(|s| {
            s.message = message;
            s.is_error = false;
        });
    }

    /// Set the status line as an error
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(status = %message, "Error status");
        self.update(|s| {
            s.message = message;
            s.is_error = true;
        });
    }

    /// Set the connection indicator and its label
    pub fn set_connection(&self, indicator: Indicator, label: impl Into<String>) {
        let label = label.into();
        self.update(|s| {
            s.indicator = indicator;
            s.connection_label = label;
        });
    }

    /// Subscribe to snapshots
    pub fn subscribe(&self) -> mpsc::Receiver<StatusSnapshot> {
        let (tx, rx) = mpsc::channel(64);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    fn update<F: FnOnce(&mut StatusSnapshot)>(&self, apply: F) {
        let mut next = (*self.current.load_full()).clone();
        apply(&mut next);
        self.current.store(Arc::new(next.clone()));

        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| !tx.is_closed());
            for listener in listeners.iter() {
                let _ = listener.try_send(next.clone());
            }
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
