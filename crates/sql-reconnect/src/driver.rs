//! The driver boundary.
//!
//! The reconnecting layer never talks to a database directly. It drives these
//! three traits, which an adapter implements over a concrete client library:
//!
//! - [`Driver`] dials new connections from a [`ConnectionConfig`]
//! - [`DriverConnection`] is one live session
//! - [`DriverStatement`] is one prepared statement or query result
//!
//! Every fallible method reports a [`DriverError`]; the layer classifies it
//! and either recovers or hands it back to the caller untouched.

use crate::config::ConnectionConfig;
use crate::value::{
    BoundVar, ColumnMeta, DriverOptions, ErrorInfo, ParamId, ParamType, Params, Row, Value,
};
use sql_reconnect_core::DriverError;

/// Dials connections.
pub trait Driver {
    /// The live connection handle this driver produces.
    type Connection: DriverConnection;

    /// Opens a new connection from the stored parameters and options.
    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DriverError>;

    /// Lists the driver backends available to this adapter.
    fn available_drivers() -> Vec<String>
    where
        Self: Sized;
}

/// A live database connection.
pub trait DriverConnection {
    /// The statement handle produced by `prepare` and `query`.
    type Statement: DriverStatement;

    /// Prepares a statement for execution.
    fn prepare(
        &mut self,
        sql: &str,
        options: &DriverOptions,
    ) -> Result<Self::Statement, DriverError>;

    /// Executes the SQL immediately and returns its result set.
    fn query(&mut self, sql: &str) -> Result<Self::Statement, DriverError>;

    /// Executes the SQL and returns the number of affected rows.
    fn exec(&mut self, sql: &str) -> Result<u64, DriverError>;

    fn begin_transaction(&mut self) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;

    fn in_transaction(&self) -> bool;

    fn get_attribute(&self, name: &str) -> Result<Value, DriverError>;

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), DriverError>;

    /// Quotes a string literal for inclusion in SQL text.
    fn quote(&self, text: &str, ty: ParamType) -> Result<String, DriverError>;

    /// Returns the id of the last inserted row or sequence value.
    fn last_insert_id(&mut self, name: Option<&str>) -> Result<String, DriverError>;

    /// SQLSTATE of the last operation, `None` if nothing ran yet.
    fn error_code(&self) -> Option<String>;

    fn error_info(&self) -> ErrorInfo;

    /// Cheap liveness probe issued before dispatching most calls.
    fn ping(&mut self) -> Result<(), DriverError> {
        self.exec("SELECT 1").map(|_| ())
    }
}

/// A prepared statement or an executed query's result set.
pub trait DriverStatement {
    /// The SQL text this statement was created from.
    fn query_string(&self) -> &str;

    /// Binds a placeholder to a variable read at execute time.
    fn bind_param(
        &mut self,
        param: &ParamId,
        var: &BoundVar,
        ty: ParamType,
    ) -> Result<(), DriverError>;

    /// Binds a placeholder to a fixed value.
    fn bind_value(
        &mut self,
        param: &ParamId,
        value: &Value,
        ty: ParamType,
    ) -> Result<(), DriverError>;

    /// Declares an output column binding.
    fn bind_column(&mut self, column: &ParamId, ty: Option<ParamType>) -> Result<(), DriverError>;

    /// Executes the statement; explicit `params` override bound values.
    fn execute(&mut self, params: Option<&Params>) -> Result<bool, DriverError>;

    /// Fetches the next row; `None` once the result set is drained.
    fn fetch(&mut self) -> Result<Option<Row>, DriverError>;

    /// Fetches every remaining row.
    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError>;

    /// Fetches one 0-based column of the next row.
    fn fetch_column(&mut self, column: usize) -> Result<Option<Value>, DriverError>;

    fn row_count(&self) -> Result<u64, DriverError>;

    fn column_count(&self) -> Result<usize, DriverError>;

    fn column_meta(&self, column: usize) -> Result<Option<ColumnMeta>, DriverError>;

    /// Frees the result set so the statement can be executed again.
    fn close_cursor(&mut self) -> Result<(), DriverError>;

    fn error_code(&self) -> Option<String>;

    fn error_info(&self) -> ErrorInfo;
}

/// Statement type produced by a driver's connections.
pub type StatementOf<D> = <<D as Driver>::Connection as DriverConnection>::Statement;
