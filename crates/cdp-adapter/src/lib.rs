//! Tabpilot DevTools connection manager.
//!
//! Owns the link to a single remote browser: connect, disconnect, reconnect, periodic liveness
//! checks and the current-page pointer. Higher layers (executor, observer) talk to the page
//! exclusively through [`BrowserConnection`] and get a first-class `NotConnected` error whenever
//! the link is down.

use tokio::sync::broadcast;

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("browser not connected")]
        NotConnected,
        #[error("operation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target element not found")]
        TargetNotFound,
        #[error("script raised an exception")]
        ScriptException,
        #[error("navigation failed")]
        NavigationFailed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn not_connected() -> Self {
            Self::new(AdapterErrorKind::NotConnected)
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is_not_connected(&self) -> bool {
            self.kind == AdapterErrorKind::NotConnected
        }

        /// Hint when present, otherwise the kind's description.
        pub fn message(&self) -> String {
            self.hint.clone().unwrap_or_else(|| self.kind.to_string())
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

    /// Tuning knobs for the connection manager.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ConnectionConfig {
        pub endpoint: String,
        pub liveness_interval_ms: u64,
        pub liveness_failure_threshold: u32,
        pub command_timeout_ms: u64,
        pub discovery_timeout_ms: u64,
        pub auto_accept_dialogs: bool,
        pub event_buffer: usize,
    }

    impl Default for ConnectionConfig {
        fn default() -> Self {
            Self {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                liveness_interval_ms: 5_000,
                liveness_failure_threshold: 3,
                command_timeout_ms: 10_000,
                discovery_timeout_ms: 5_000,
                auto_accept_dialogs: true,
                event_buffer: 256,
            }
        }
    }

    impl ConnectionConfig {
        pub fn liveness_interval(&self) -> Duration {
            Duration::from_millis(self.liveness_interval_ms)
        }

        pub fn command_timeout(&self) -> Duration {
            Duration::from_millis(self.command_timeout_ms.max(1))
        }

        pub fn discovery_timeout(&self) -> Duration {
            Duration::from_millis(self.discovery_timeout_ms.max(1))
        }
    }
}

pub mod events {
    use serde::{Deserialize, Serialize};

    /// Typed events published by the connection manager.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ConnectionEvent {
        Connected {
            endpoint: String,
            target_id: String,
        },
        Disconnected {
            endpoint: String,
            reason: Option<String>,
        },
        ConnectionLost {
            endpoint: String,
            error: String,
        },
        Reconnecting {
            endpoint: String,
            last_error: Option<String>,
        },
        PageLoad {
            target_id: String,
            url: Option<String>,
        },
        NewTab {
            target_id: String,
            url: String,
        },
        Dialog {
            target_id: String,
            dialog_type: String,
            message: String,
            accepted: bool,
        },
        Console {
            target_id: String,
            level: String,
            text: String,
        },
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EventKind {
        Connected,
        Disconnected,
        ConnectionLost,
        Reconnecting,
        PageLoad,
        NewTab,
        Dialog,
        Console,
    }

    impl ConnectionEvent {
        pub fn kind(&self) -> EventKind {
            match self {
                ConnectionEvent::Connected { .. } => EventKind::Connected,
                ConnectionEvent::Disconnected { .. } => EventKind::Disconnected,
                ConnectionEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
                ConnectionEvent::Reconnecting { .. } => EventKind::Reconnecting,
                ConnectionEvent::PageLoad { .. } => EventKind::PageLoad,
                ConnectionEvent::NewTab { .. } => EventKind::NewTab,
                ConnectionEvent::Dialog { .. } => EventKind::Dialog,
                ConnectionEvent::Console { .. } => EventKind::Console,
            }
        }
    }
}

pub mod commands;
pub mod connection;
pub mod metrics;
pub mod registry;
pub mod transport;
pub mod util;

pub use commands::{key_definition, KeyDefinition, LoadCondition};
pub use config::{ConnectionConfig, DEFAULT_ENDPOINT};
pub use connection::{
    BrowserConnection, ConnectionState, ConnectionStatus, EventSubscription, ScriptHost,
};
pub use error::{AdapterError, AdapterErrorKind};
pub use events::{ConnectionEvent, EventKind};
pub use metrics::AdapterMetricsSnapshot;
pub use registry::{PageEntry, PageRegistry};
pub use transport::{
    CdpTransport, ChromiumConnector, ChromiumTransport, CommandTarget, NoopTransport,
    TransportConnector, TransportEvent,
};

pub type EventBus = broadcast::Sender<ConnectionEvent>;

/// Construct a broadcast bus for connection events.
pub fn event_bus(buffer: usize) -> (EventBus, broadcast::Receiver<ConnectionEvent>) {
    broadcast::channel(buffer.max(1))
}
