//! The driver error as seen by the reconnecting layer.
//!
//! Drivers convert whatever they raise into a [`DriverError`] carrying the
//! SQLSTATE, the optional native error code and the message. Classification
//! and propagation never rewrite it: a non-transient `DriverError` reaches the
//! caller exactly as the driver produced it.

use thiserror::Error;

/// SQLSTATE drivers report for errors without a more specific class.
pub const GENERAL_ERROR_SQLSTATE: &str = "HY000";

/// SQLSTATE class prefix for connection exceptions.
pub const CONNECTION_EXCEPTION_CLASS: &str = "08";

/// SQLSTATE reported when no error occurred.
pub const SUCCESS_SQLSTATE: &str = "00000";

/// An error raised by the underlying database driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("SQLSTATE[{sqlstate}]: {message}")]
pub struct DriverError {
    sqlstate: String,
    code: Option<i64>,
    message: String,
}

impl DriverError {
    /// Creates a driver error with the given SQLSTATE and message.
    pub fn new(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Creates a driver error in the generic `HY000` class.
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(GENERAL_ERROR_SQLSTATE, message)
    }

    /// The error MySQL-compatible servers raise once the connection is gone.
    ///
    /// ```
    /// use sql_reconnect_core::DriverError;
    ///
    /// let err = DriverError::server_gone_away();
    /// assert_eq!(err.sqlstate(), "HY000");
    /// assert_eq!(err.code(), Some(2006));
    /// ```
    pub fn server_gone_away() -> Self {
        Self::general("General error: 2006 MySQL server has gone away").with_code(2006)
    }

    /// Attaches the driver-native error code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns the five-character SQLSTATE.
    pub fn sqlstate(&self) -> &str {
        &self.sqlstate
    }

    /// Returns the driver-native error code, if the driver supplied one.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Returns the driver message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for the generic class or the connection-exception class.
    pub fn is_connection_class(&self) -> bool {
        self.sqlstate == GENERAL_ERROR_SQLSTATE
            || self.sqlstate.starts_with(CONNECTION_EXCEPTION_CLASS)
    }
}
