//! Transparent reconnection for database connections and statements.
//!
//! This crate wraps a database driver so that losing the server ("MySQL
//! server has gone away") does not surface to the caller. The connection is
//! redialed, statements are re-prepared, their bindings replayed, they are
//! re-executed and, for result sets that were being read, fast-forwarded to
//! the row the caller had reached. Only errors classified as transient are
//! retried, and never more than `max_reconnection` times per call.
//!
//! # Features
//!
//! - **Bounded reconnection**: every call reconnects at most `max_reconnection` times
//! - **Statement recovery**: bindings, parameters and cursor position survive a reconnect
//! - **Pluggable classification**: decide which driver errors are transient
//! - **Reconnect policies**: immediate, fixed or exponential delay between dials
//! - **Event system**: listeners for lost, reconnected, exhausted and recreated
//! - **Optional `tracing` and `metrics`** instrumentation
//!
//! # Examples
//!
//! ```rust
//! use sql_reconnect::{ConnectionConfig, ReconnectPolicy};
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::builder()
//!     .dsn("mysql:host=db.internal;dbname=shop")
//!     .username("app")
//!     .password("secret")
//!     .max_reconnection(3)
//!     .policy(ReconnectPolicy::fixed(Duration::from_millis(100)))
//!     .on_reconnect(|attempt| println!("reconnected after {attempt} attempt(s)"))
//!     .build();
//!
//! assert_eq!(config.max_reconnection(), 3);
//! ```
//!
//! A driver adapter implements [`Driver`], [`DriverConnection`] and
//! [`DriverStatement`]; [`ReconnectingConnection`] is then used in place of
//! the raw connection.
//!
//! # Single-threaded
//!
//! Connections and statements share state through `Rc<RefCell<_>>` and are
//! not `Send`. Use one connection per thread.

mod config;
mod connection;
mod cursor;
mod driver;
mod error;
mod events;
mod policy;
mod seed;
mod state;
mod statement;
mod value;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, ConnectionParameters, DEFAULT_MAX_RECONNECTION,
};
pub use connection::ReconnectingConnection;
pub use cursor::{Cursor, CursorUnderflow};
pub use driver::{Driver, DriverConnection, DriverStatement, StatementOf};
pub use error::Error;
pub use events::ConnectionEvent;
pub use policy::ReconnectPolicy;
pub use seed::{BindKind, Binding, SeedData};
pub use state::{ConnectionState, ReconnectState};
pub use statement::{ReconnectingStatement, StatementKind};
pub use value::{
    BoundVar, ColumnMeta, DriverOptions, ErrorInfo, FromRow, ParamId, ParamType, Params, Row,
    Value,
};

pub use sql_reconnect_core::{
    events::{EventListener, EventListeners, FnListener, ReconnectEvent},
    DriverError, FnClassifier, GoneAwayClassifier, TransientClassifier,
};

#[cfg(feature = "metrics")]
use metrics::describe_counter;
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Registers metric descriptions once per process.
pub(crate) fn describe_metrics() {
    #[cfg(feature = "metrics")]
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "sqlreconnect_calls_total",
            "Intercepted connection calls by outcome (success, error or exhausted)"
        );
        describe_counter!(
            "sqlreconnect_reconnections_total",
            "Reconnection attempts made after a transient error"
        );
        describe_counter!(
            "sqlreconnect_statement_recreations_total",
            "Statements rebuilt after a connection loss"
        );
        describe_counter!(
            "sqlreconnect_replayed_rows_total",
            "Rows re-fetched to restore a statement's cursor position"
        );
    });
}
