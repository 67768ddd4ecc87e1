//! Statements that survive a connection loss.
//!
//! A [`ReconnectingStatement`] wraps one driver statement handle. When a call
//! on the handle fails with a transient error the statement asks its
//! connection manager for a fresh handle, re-prepares (or re-queries),
//! replays the recorded bindings, re-executes with the last parameters and
//! fetches forward to where the caller was. Then the failed call is retried.
//!
//! Recovery is bounded by the connection's `max_reconnection`, counted per
//! call on the statement.

use crate::connection::{Operation, Session};
use crate::cursor::Cursor;
use crate::driver::{Driver, DriverConnection, DriverStatement, StatementOf};
use crate::error::Error;
use crate::events::ConnectionEvent;
use crate::seed::{Binding, SeedData};
use crate::value::{
    BoundVar, ColumnMeta, DriverOptions, ErrorInfo, FromRow, ParamId, ParamType, Params, Row,
    Value,
};
#[cfg(feature = "metrics")]
use metrics::counter;
use sql_reconnect_core::DriverError;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// How a statement was created, which decides how it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatementKind {
    /// Created by `query`; rebuilt by running the SQL again.
    DirectQuery,
    /// Created by `prepare`; rebuilt by preparing, rebinding and re-executing.
    Prepared,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::DirectQuery => "query",
            StatementKind::Prepared => "prepared",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statement handle with transparent recovery.
pub struct ReconnectingStatement<D: Driver> {
    statement: StatementOf<D>,
    session: Weak<RefCell<Session<D>>>,
    sql: String,
    kind: StatementKind,
    options: DriverOptions,
    executed: bool,
    last_params: Option<Params>,
    cursor: Cursor,
    seed: SeedData,
}

impl<D: Driver> ReconnectingStatement<D> {
    pub(crate) fn new(
        statement: StatementOf<D>,
        session: Weak<RefCell<Session<D>>>,
        kind: StatementKind,
        options: DriverOptions,
    ) -> Self {
        Self {
            sql: statement.query_string().to_string(),
            statement,
            session,
            kind,
            options,
            executed: false,
            last_params: None,
            cursor: Cursor::new(),
            seed: SeedData::new(),
        }
    }

    /// The SQL text the statement was created from.
    pub fn query_string(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_direct_query(&self) -> bool {
        self.kind == StatementKind::DirectQuery
    }

    /// True once `execute` has succeeded and the result set was not closed.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Rows consumed from the current result set.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Bindings that will be replayed on a rebuilt handle.
    pub fn seed_data(&self) -> &SeedData {
        &self.seed
    }

    /// The current driver handle. It changes after every recovery.
    pub fn statement(&self) -> &StatementOf<D> {
        &self.statement
    }

    pub fn into_statement(self) -> StatementOf<D> {
        self.statement
    }

    /// Binds a placeholder to a variable read when the statement executes.
    pub fn bind_param(
        &mut self,
        param: impl Into<ParamId>,
        var: &BoundVar,
        ty: ParamType,
    ) -> Result<(), Error> {
        let id = param.into();
        self.seed.record(
            id.clone(),
            Binding::Param {
                var: var.clone(),
                ty,
            },
        );
        self.run(|this| this.statement.bind_param(&id, var, ty))
    }

    /// Binds a placeholder to a fixed value.
    pub fn bind_value(
        &mut self,
        param: impl Into<ParamId>,
        value: impl Into<Value>,
        ty: ParamType,
    ) -> Result<(), Error> {
        let id = param.into();
        let value = value.into();
        self.seed.record(
            id.clone(),
            Binding::Value {
                value: value.clone(),
                ty,
            },
        );
        self.run(|this| this.statement.bind_value(&id, &value, ty))
    }

    /// Binds an output column, by 1-based position or by name, to a variable
    /// refreshed after each fetch.
    pub fn bind_column(
        &mut self,
        column: impl Into<ParamId>,
        var: &BoundVar,
        ty: Option<ParamType>,
    ) -> Result<(), Error> {
        let id = column.into();
        self.seed.record(
            id.clone(),
            Binding::Column {
                var: var.clone(),
                ty,
            },
        );
        self.run(|this| this.statement.bind_column(&id, ty))
    }

    /// Executes the statement. Explicit `params` override bound values and
    /// are reused if the statement has to be rebuilt.
    pub fn execute(&mut self, params: Option<Params>) -> Result<bool, Error> {
        // The previous result set is gone once execute is attempted.
        self.executed = false;
        self.cursor.reset();

        let outcome = self.run(|this| this.statement.execute(params.as_ref()))?;
        self.executed = true;
        self.last_params = params;
        Ok(outcome)
    }

    /// Fetches the next row, refreshing bound columns.
    pub fn fetch(&mut self) -> Result<Option<Row>, Error> {
        let row = self.run(|this| this.statement.fetch())?;

        if let Some(row) = &row {
            self.cursor.next();
            self.refresh_columns(row);
        }
        Ok(row)
    }

    /// Fetches the next row and maps it.
    pub fn fetch_object<T: FromRow>(&mut self) -> Result<Option<T>, Error> {
        Ok(self.fetch()?.map(|row| T::from_row(&row)))
    }

    /// Fetches every remaining row. Bound columns end up holding the last
    /// row's values.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>, Error> {
        let rows = self.run(|this| this.statement.fetch_all())?;
        self.cursor.advance(rows.len() as u64);
        if let Some(last) = rows.last() {
            self.refresh_columns(last);
        }
        Ok(rows)
    }

    /// Fetches one 0-based column of the next row.
    pub fn fetch_column(&mut self, column: usize) -> Result<Option<Value>, Error> {
        let value = self.run(|this| this.statement.fetch_column(column))?;
        if value.is_some() {
            self.cursor.next();
        }
        Ok(value)
    }

    pub fn row_count(&mut self) -> Result<u64, Error> {
        self.run(|this| this.statement.row_count())
    }

    pub fn column_count(&mut self) -> Result<usize, Error> {
        self.run(|this| this.statement.column_count())
    }

    /// Metadata for a 0-based column.
    pub fn column_meta(&mut self, column: usize) -> Result<Option<ColumnMeta>, Error> {
        self.run(|this| this.statement.column_meta(column))
    }

    /// Frees the result set. A later recovery will not re-execute or replay.
    pub fn close_cursor(&mut self) -> Result<(), Error> {
        self.run(|this| this.statement.close_cursor())?;
        self.executed = false;
        self.cursor.reset();
        Ok(())
    }

    pub fn error_code(&self) -> Option<String> {
        self.statement.error_code()
    }

    pub fn error_info(&self) -> ErrorInfo {
        self.statement.error_info()
    }

    fn run<T, F>(&mut self, mut call: F) -> Result<T, Error>
    where
        F: FnMut(&mut Self) -> Result<T, DriverError>,
    {
        let mut recreations = 0u32;
        loop {
            match call(self) {
                Ok(value) => return Ok(value),
                Err(error) => self.recover(error, &mut recreations)?,
            }
        }
    }

    fn refresh_columns(&self, row: &Row) {
        for (id, var) in self.seed.columns() {
            if let Some(value) = row.column(id) {
                var.set(value.clone());
            }
        }
    }

    fn recover(&mut self, mut error: DriverError, recreations: &mut u32) -> Result<(), Error> {
        let session = self.session.upgrade().ok_or(Error::NoConnection)?;
        loop {
            let (transient, max) = {
                let session = session.borrow();
                (
                    session.config.is_transient(&error),
                    session.config.max_reconnection,
                )
            };
            if !transient {
                return Err(Error::Driver(error));
            }

            if *recreations >= max {
                let session = session.borrow();
                #[cfg(feature = "tracing")]
                tracing::error!(
                    connection = %session.config.name,
                    kind = %self.kind,
                    attempts = *recreations,
                    error = %error,
                    "giving up on statement recovery"
                );
                session.notify(ConnectionEvent::ReconnectExhausted {
                    connection_name: session.config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: *recreations,
                    error: error.clone(),
                });
                return Err(Error::ExceededMaxReconnection {
                    attempts: *recreations,
                    source: error,
                });
            }
            *recreations += 1;

            #[cfg(feature = "tracing")]
            tracing::warn!(
                connection = %session.borrow().config.name,
                kind = %self.kind,
                attempt = *recreations,
                error = %error,
                "statement handle lost; rebuilding"
            );

            match self.recreate(&session) {
                Ok(()) => return Ok(()),
                Err(Error::Driver(next)) => error = next,
                Err(other) => return Err(other),
            }
        }
    }

    /// Rebuilds the handle on the manager's current connection.
    fn recreate(&mut self, session: &Rc<RefCell<Session<D>>>) -> Result<(), Error> {
        let mut statement = match self.kind {
            StatementKind::DirectQuery => session
                .borrow_mut()
                .dispatch(Operation::Query, |conn| conn.query(&self.sql))?,
            StatementKind::Prepared => {
                let mut statement = session
                    .borrow_mut()
                    .dispatch(Operation::Prepare, |conn| {
                        conn.prepare(&self.sql, &self.options)
                    })?;
                self.seed.replay(&mut statement)?;
                if self.executed {
                    statement.execute(self.last_params.as_ref())?;
                }
                statement
            }
        };

        let replays = self.kind == StatementKind::DirectQuery || self.executed;
        let replayed_rows = if replays && self.cursor.position() > 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                sql = %self.sql,
                position = self.cursor.position(),
                "replaying cursor on recreated statement"
            );
            fast_forward(&mut statement, &mut self.cursor)?
        } else {
            0
        };
        self.statement = statement;

        let session = session.borrow();
        #[cfg(feature = "tracing")]
        tracing::info!(
            connection = %session.config.name,
            kind = %self.kind,
            replayed_rows,
            "statement recreated"
        );
        #[cfg(feature = "metrics")]
        {
            counter!(
                "sqlreconnect_statement_recreations_total",
                "connection" => session.config.name.clone(),
                "kind" => self.kind.as_str()
            )
            .increment(1);
            counter!(
                "sqlreconnect_replayed_rows_total",
                "connection" => session.config.name.clone()
            )
            .increment(replayed_rows);
        }
        session.notify(ConnectionEvent::StatementRecreated {
            connection_name: session.config.name.clone(),
            timestamp: Instant::now(),
            kind: self.kind,
            replayed_rows,
        });
        Ok(())
    }
}

/// Re-fetches and discards rows until the new handle is where `cursor`
/// says the caller was. Stops early if the result set is now shorter.
///
/// The cursor keeps the caller's position whatever happens; the number of
/// rows actually fetched is returned.
fn fast_forward<S: DriverStatement>(
    statement: &mut S,
    cursor: &mut Cursor,
) -> Result<u64, DriverError> {
    let target = cursor.position();
    cursor.reset();

    let outcome = loop {
        if cursor.position() >= target {
            break Ok(());
        }
        match statement.fetch() {
            Ok(Some(_)) => {
                cursor.next();
            }
            Ok(None) => break Ok(()),
            Err(error) => break Err(error),
        }
    };

    let replayed = cursor.position();
    cursor.set_position(target);
    outcome.map(|()| replayed)
}

impl<D: Driver> fmt::Debug for ReconnectingStatement<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectingStatement")
            .field("sql", &self.sql)
            .field("kind", &self.kind)
            .field("executed", &self.executed)
            .field("cursor", &self.cursor)
            .field("bindings", &self.seed.len())
            .finish()
    }
}
