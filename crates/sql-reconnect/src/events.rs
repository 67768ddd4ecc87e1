use sql_reconnect_core::events::ReconnectEvent;
use sql_reconnect_core::DriverError;
use std::time::Instant;

use crate::statement::StatementKind;

/// Events emitted by connection managers and their statements.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A transient error was detected; reconnection attempt `attempt` follows.
    ConnectionLost {
        connection_name: String,
        timestamp: Instant,
        attempt: u32,
        error: DriverError,
    },
    /// A replacement driver connection was established.
    Reconnected {
        connection_name: String,
        timestamp: Instant,
        attempt: u32,
    },
    /// The call failed after `attempts` reconnections.
    ReconnectExhausted {
        connection_name: String,
        timestamp: Instant,
        attempts: u32,
        error: DriverError,
    },
    /// A non-transient error was propagated without retrying.
    IgnoredError {
        connection_name: String,
        timestamp: Instant,
        error: DriverError,
    },
    /// A statement was rebuilt after a connection loss.
    StatementRecreated {
        connection_name: String,
        timestamp: Instant,
        kind: StatementKind,
        replayed_rows: u64,
    },
}

impl ReconnectEvent for ConnectionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::ConnectionLost { .. } => "connection_lost",
            ConnectionEvent::Reconnected { .. } => "reconnected",
            ConnectionEvent::ReconnectExhausted { .. } => "reconnect_exhausted",
            ConnectionEvent::IgnoredError { .. } => "ignored_error",
            ConnectionEvent::StatementRecreated { .. } => "statement_recreated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ConnectionEvent::ConnectionLost { timestamp, .. }
            | ConnectionEvent::Reconnected { timestamp, .. }
            | ConnectionEvent::ReconnectExhausted { timestamp, .. }
            | ConnectionEvent::IgnoredError { timestamp, .. }
            | ConnectionEvent::StatementRecreated { timestamp, .. } => *timestamp,
        }
    }

    fn connection_name(&self) -> &str {
        match self {
            ConnectionEvent::ConnectionLost {
                connection_name, ..
            }
            | ConnectionEvent::Reconnected {
                connection_name, ..
            }
            | ConnectionEvent::ReconnectExhausted {
                connection_name, ..
            }
            | ConnectionEvent::IgnoredError {
                connection_name, ..
            }
            | ConnectionEvent::StatementRecreated {
                connection_name, ..
            } => connection_name,
        }
    }
}
