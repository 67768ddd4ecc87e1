//! The reconnecting connection manager.
//!
//! [`ReconnectingConnection`] owns the live driver handle, the parameters
//! needed to dial a replacement, and the reconnect counter. Every intercepted
//! call runs through one bounded loop:
//!
//! 1. probe the handle (unless the operation is on the no-probe list),
//! 2. run the driver call,
//! 3. on success reset the counter and return,
//! 4. on a non-transient error return it unchanged,
//! 5. on a transient error give up once the counter reached
//!    `max_reconnection`, otherwise dial a new handle and go to 1.
//!
//! The counter only grows inside the loop, so a call makes at most
//! `max_reconnection` reconnections.

use crate::config::{ConnectionConfig, ConnectionParameters};
use crate::driver::{Driver, DriverConnection};
use crate::error::Error;
use crate::events::ConnectionEvent;
use crate::state::{ConnectionState, ReconnectState};
use crate::statement::{ReconnectingStatement, StatementKind};
use crate::value::{DriverOptions, ErrorInfo, ParamType, Value};
#[cfg(feature = "metrics")]
use metrics::counter;
use sql_reconnect_core::DriverError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// Calls that go through the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Prepare,
    Query,
    Exec,
    BeginTransaction,
    Commit,
    Rollback,
    GetAttribute,
    SetAttribute,
    Quote,
    LastInsertId,
}

impl Operation {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Operation::Prepare => "prepare",
            Operation::Query => "query",
            Operation::Exec => "exec",
            Operation::BeginTransaction => "begin_transaction",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::GetAttribute => "get_attribute",
            Operation::SetAttribute => "set_attribute",
            Operation::Quote => "quote",
            Operation::LastInsertId => "last_insert_id",
        }
    }

    /// A probe query would overwrite the last insert id.
    fn probes(self) -> bool {
        !matches!(self, Operation::LastInsertId)
    }
}

/// State shared by a connection manager and the statements it produced.
pub(crate) struct Session<D: Driver> {
    driver: D,
    pub(crate) config: ConnectionConfig,
    handle: Option<D::Connection>,
    state: ReconnectState,
    attributes: Vec<(String, Value)>,
}

impl<D: Driver> Session<D> {
    fn new(driver: D, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            handle: None,
            state: ReconnectState::new(),
            attributes: Vec::new(),
        }
    }

    /// Runs a driver call with transparent reconnection.
    pub(crate) fn dispatch<T, F>(&mut self, op: Operation, mut call: F) -> Result<T, Error>
    where
        F: FnMut(&mut D::Connection) -> Result<T, DriverError>,
    {
        let probe = op.probes() && self.config.liveness_probe;
        loop {
            let conn = self.handle.as_mut().ok_or(Error::NoConnection)?;
            let outcome = if probe {
                conn.ping().and_then(|()| call(conn))
            } else {
                call(conn)
            };

            match outcome {
                Ok(value) => {
                    self.state.reset_attempts();
                    self.record_call("success");
                    return Ok(value);
                }
                Err(error) => self.recover(op, error)?,
            }
        }
    }

    /// Replaces the handle after a transient error, or returns the error
    /// that ends the call.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn recover(&mut self, op: Operation, mut error: DriverError) -> Result<(), Error> {
        loop {
            if !self.config.is_transient(&error) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    connection = %self.config.name,
                    operation = op.name(),
                    error = %error,
                    "propagating non-transient driver error"
                );
                self.notify(ConnectionEvent::IgnoredError {
                    connection_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    error: error.clone(),
                });
                self.record_call("error");
                return Err(Error::Driver(error));
            }

            let attempts = self.state.attempts();
            if attempts >= self.config.max_reconnection {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    connection = %self.config.name,
                    operation = op.name(),
                    attempts,
                    error = %error,
                    "giving up after maximum reconnection attempts"
                );
                self.notify(ConnectionEvent::ReconnectExhausted {
                    connection_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    attempts,
                    error: error.clone(),
                });
                self.record_call("exhausted");
                return Err(Error::ExceededMaxReconnection {
                    attempts,
                    source: error,
                });
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(
                connection = %self.config.name,
                operation = op.name(),
                attempt = attempts + 1,
                error = %error,
                "database connection lost; reconnecting"
            );
            self.notify(ConnectionEvent::ConnectionLost {
                connection_name: self.config.name.clone(),
                timestamp: Instant::now(),
                attempt: attempts + 1,
                error,
            });

            match self.reconnect() {
                Ok(()) => return Ok(()),
                Err(next) => error = next,
            }
        }
    }

    /// Dials a replacement handle. The broken handle stays attached until
    /// the new one is up and is then dropped without draining.
    fn reconnect(&mut self) -> Result<(), DriverError> {
        self.state.mark_reconnecting();
        let attempt = self.state.increment_attempts();

        #[cfg(feature = "metrics")]
        counter!("sqlreconnect_reconnections_total", "connection" => self.config.name.clone())
            .increment(1);

        if let Some(delay) = self.config.policy.delay_for_attempt(attempt) {
            std::thread::sleep(delay);
        }

        match self.establish() {
            Ok(conn) => {
                self.handle = Some(conn);
                self.state.mark_connected();

                #[cfg(feature = "tracing")]
                tracing::info!(
                    connection = %self.config.name,
                    attempt,
                    "database connection re-established"
                );

                self.notify(ConnectionEvent::Reconnected {
                    connection_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    attempt,
                });
                Ok(())
            }
            Err(error) => {
                self.state.mark_disconnected();
                Err(error)
            }
        }
    }

    /// Dials and restores attributes set through the manager.
    fn establish(&self) -> Result<D::Connection, DriverError> {
        let mut conn = self.driver.connect(&self.config)?;
        for (name, value) in &self.attributes {
            conn.set_attribute(name, value.clone())?;
        }
        Ok(conn)
    }

    fn dial(&mut self) -> Result<(), Error> {
        if self.config.parameters.dsn.is_none() {
            return Err(Error::ConnectionParametersMissing {
                missing: vec!["dsn"],
            });
        }
        let conn = self.establish()?;
        self.attach(conn);
        Ok(())
    }

    fn attach(&mut self, conn: D::Connection) {
        self.handle = Some(conn);
        self.state.mark_connected();
        self.state.reset_attempts();
    }

    fn remember_attribute(&mut self, name: &str, value: Value) {
        self.attributes.retain(|(existing, _)| existing != name);
        self.attributes.push((name.to_string(), value));
    }

    fn handle(&self) -> Result<&D::Connection, Error> {
        self.handle.as_ref().ok_or(Error::NoConnection)
    }

    pub(crate) fn notify(&self, event: ConnectionEvent) {
        self.config.event_listeners.emit(&event);
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_call(&self, outcome: &'static str) {
        #[cfg(feature = "metrics")]
        counter!(
            "sqlreconnect_calls_total",
            "connection" => self.config.name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// A database connection that survives "server has gone away".
///
/// Cloning is cheap and yields another handle to the same session. All calls
/// are synchronous and must not be shared across threads; the type is
/// deliberately `!Send`.
///
/// # Example
///
/// ```rust,ignore
/// use sql_reconnect::{ConnectionConfig, ReconnectingConnection};
///
/// let config = ConnectionConfig::builder()
///     .dsn("mysql:host=db.internal;dbname=shop")
///     .username("app")
///     .password("secret")
///     .max_reconnection(3)
///     .build();
///
/// let conn = ReconnectingConnection::connect(MysqlDriver::default(), config)?;
/// let mut orders = conn.prepare("SELECT id, total FROM orders WHERE customer = :customer")?;
/// orders.bind_value("customer", 42, ParamType::Int)?;
/// orders.execute(None)?;
/// while let Some(row) = orders.fetch()? {
///     // a dropped connection here is rebuilt and the iteration resumes
/// }
/// ```
pub struct ReconnectingConnection<D: Driver> {
    session: Rc<RefCell<Session<D>>>,
}

impl<D: Driver> ReconnectingConnection<D> {
    /// Creates a manager without dialing. Calls fail with
    /// [`Error::NoConnection`] until [`open`](Self::open) or
    /// [`attach_external_connection`](Self::attach_external_connection).
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self {
            session: Rc::new(RefCell::new(Session::new(driver, config))),
        }
    }

    /// Creates a manager and dials immediately. Requires a DSN.
    pub fn connect(driver: D, config: ConnectionConfig) -> Result<Self, Error> {
        let conn = Self::new(driver, config);
        conn.open()?;
        Ok(conn)
    }

    /// Dials a connection from the stored parameters, replacing any handle.
    pub fn open(&self) -> Result<(), Error> {
        self.session.borrow_mut().dial()
    }

    /// Redials now and resets the reconnect counter.
    ///
    /// This is the way out after [`Error::ExceededMaxReconnection`]: the
    /// counter is left at the limit after exhaustion, so later calls give up
    /// immediately until a call succeeds or the connection is reopened.
    pub fn reconnect(&self) -> Result<(), Error> {
        self.open()
    }

    /// Attaches an already-open driver connection.
    ///
    /// DSN, username and password must be set beforehand so the handle can be
    /// rebuilt if it is later lost.
    pub fn attach_external_connection(&self, handle: D::Connection) -> Result<(), Error> {
        let mut session = self.session.borrow_mut();
        let missing = session.config.parameters.missing();
        if !missing.is_empty() {
            return Err(Error::ConnectionParametersMissing { missing });
        }
        session.attach(handle);
        Ok(())
    }

    /// Replaces DSN and credentials used for future dials.
    pub fn set_connection_parameters(&self, parameters: ConnectionParameters) {
        self.session.borrow_mut().config.parameters = parameters;
    }

    /// Replaces the driver options used for future dials.
    pub fn set_driver_options(&self, options: DriverOptions) {
        self.session.borrow_mut().config.options = options;
    }

    /// Sets the maximum number of reconnections per call.
    pub fn set_max_reconnection(&self, max: u32) {
        self.session.borrow_mut().config.max_reconnection = max;
    }

    pub fn max_reconnection(&self) -> u32 {
        self.session.borrow().config.max_reconnection
    }

    /// Reconnections made since the last successful call.
    pub fn reconnect_attempts(&self) -> u32 {
        self.session.borrow().state.attempts()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.borrow().state.state()
    }

    /// Returns true if a driver handle is attached.
    pub fn is_connected(&self) -> bool {
        self.session.borrow().handle.is_some()
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> ConnectionConfig {
        self.session.borrow().config.clone()
    }

    /// Prepares a statement.
    pub fn prepare(&self, sql: &str) -> Result<ReconnectingStatement<D>, Error> {
        self.prepare_with_options(sql, DriverOptions::new())
    }

    /// Prepares a statement with driver options, kept for re-preparing.
    pub fn prepare_with_options(
        &self,
        sql: &str,
        options: DriverOptions,
    ) -> Result<ReconnectingStatement<D>, Error> {
        let statement = self
            .session
            .borrow_mut()
            .dispatch(Operation::Prepare, |conn| conn.prepare(sql, &options))?;
        Ok(ReconnectingStatement::new(
            statement,
            Rc::downgrade(&self.session),
            StatementKind::Prepared,
            options,
        ))
    }

    /// Executes a query and wraps its result set.
    pub fn query(&self, sql: &str) -> Result<ReconnectingStatement<D>, Error> {
        let statement = self
            .session
            .borrow_mut()
            .dispatch(Operation::Query, |conn| conn.query(sql))?;
        Ok(ReconnectingStatement::new(
            statement,
            Rc::downgrade(&self.session),
            StatementKind::DirectQuery,
            DriverOptions::new(),
        ))
    }

    /// Executes SQL and returns the number of affected rows.
    pub fn exec(&self, sql: &str) -> Result<u64, Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::Exec, |conn| conn.exec(sql))
    }

    /// Starts a transaction.
    ///
    /// A reconnection inside an open transaction silently loses it; the
    /// replacement connection is in autocommit mode.
    pub fn begin_transaction(&self) -> Result<(), Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::BeginTransaction, |conn| conn.begin_transaction())
    }

    pub fn commit(&self) -> Result<(), Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::Commit, |conn| conn.commit())
    }

    pub fn rollback(&self) -> Result<(), Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::Rollback, |conn| conn.rollback())
    }

    pub fn in_transaction(&self) -> Result<bool, Error> {
        Ok(self.session.borrow().handle()?.in_transaction())
    }

    pub fn get_attribute(&self, name: &str) -> Result<Value, Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::GetAttribute, |conn| conn.get_attribute(name))
    }

    /// Sets a connection attribute; it is re-applied after every reconnection.
    pub fn set_attribute(&self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        let mut session = self.session.borrow_mut();
        session.dispatch(Operation::SetAttribute, |conn| {
            conn.set_attribute(name, value.clone())
        })?;
        session.remember_attribute(name, value);
        Ok(())
    }

    /// Quotes a string for use in SQL text.
    pub fn quote(&self, text: &str, ty: ParamType) -> Result<String, Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::Quote, |conn| conn.quote(text, ty))
    }

    /// Returns the id of the last inserted row. Never probes first.
    pub fn last_insert_id(&self, name: Option<&str>) -> Result<String, Error> {
        self.session
            .borrow_mut()
            .dispatch(Operation::LastInsertId, |conn| conn.last_insert_id(name))
    }

    pub fn error_code(&self) -> Result<Option<String>, Error> {
        Ok(self.session.borrow().handle()?.error_code())
    }

    pub fn error_info(&self) -> Result<ErrorInfo, Error> {
        Ok(self.session.borrow().handle()?.error_info())
    }

    /// Lists the backends the driver adapter supports.
    pub fn available_drivers() -> Vec<String>
    where
        D: Sized,
    {
        D::available_drivers()
    }
}

impl<D: Driver> Clone for ReconnectingConnection<D> {
    fn clone(&self) -> Self {
        Self {
            session: Rc::clone(&self.session),
        }
    }
}

impl<D: Driver> fmt::Debug for ReconnectingConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session.try_borrow() {
            Ok(session) => f
                .debug_struct("ReconnectingConnection")
                .field("name", &session.config.name)
                .field("connected", &session.handle.is_some())
                .field("state", &session.state)
                .finish(),
            Err(_) => f
                .debug_struct("ReconnectingConnection")
                .finish_non_exhaustive(),
        }
    }
}
