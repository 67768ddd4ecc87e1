use crate::cursor::CursorUnderflow;
use sql_reconnect_core::DriverError;
use thiserror::Error;

/// Errors returned by reconnecting connections and statements.
#[derive(Debug, Error)]
pub enum Error {
    /// No driver connection is attached.
    #[error("no database connection is attached")]
    NoConnection,

    /// DSN, username or password must be set first.
    #[error("connection parameters missing: {}", .missing.join(", "))]
    ConnectionParametersMissing { missing: Vec<&'static str> },

    /// The connection was lost again after `attempts` reconnections.
    #[error("exceeded maximum reconnection attempts ({attempts})")]
    ExceededMaxReconnection {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Cursor(#[from] CursorUnderflow),

    /// A non-transient driver error, exactly as the driver raised it.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    /// Returns true if the retry bound was exhausted.
    pub fn is_exceeded_max_reconnection(&self) -> bool {
        matches!(self, Error::ExceededMaxReconnection { .. })
    }

    /// Returns the driver error carried by this error, either propagated
    /// directly or as the cause of retry exhaustion.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Error::Driver(e) | Error::ExceededMaxReconnection { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Consumes the error, returning the driver error if there is one.
    pub fn into_driver_error(self) -> Option<DriverError> {
        match self {
            Error::Driver(e) | Error::ExceededMaxReconnection { source: e, .. } => Some(e),
            _ => None,
        }
    }
}
