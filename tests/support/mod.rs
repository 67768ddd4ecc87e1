//! Scripted in-memory driver shared by the integration tests and benchmarks.
//!
//! A [`MockServer`] holds result sets keyed by SQL text, one-shot fault
//! queues per driver operation and a call log. Handles remember the server
//! generation they were opened in; [`MockServer::kill_connections`] bumps the
//! generation so every older connection and statement starts failing with
//! "server has gone away", the way a restarted MySQL server behaves.

#![allow(dead_code)]

use sql_reconnect::{
    BoundVar, ColumnMeta, ConnectionConfig, ConnectionConfigBuilder, ConnectionEvent, Driver,
    DriverConnection, DriverError, DriverOptions, DriverStatement, ErrorInfo, FnListener,
    ParamId, ParamType, Params, ReconnectEvent, ReconnectingConnection, Row, Value,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Driver operations that can be logged and faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Ping,
    Prepare,
    Query,
    Exec,
    Begin,
    Commit,
    Rollback,
    GetAttribute,
    SetAttribute,
    Quote,
    LastInsertId,
    BindParam,
    BindValue,
    BindColumn,
    Execute,
    Fetch,
    FetchAll,
    FetchColumn,
    RowCount,
    ColumnCount,
    CloseCursor,
}

/// One statement execution as the server saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    /// Effective parameters keyed by `ParamId` display form (`1`, `:id`).
    pub params: BTreeMap<String, Value>,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct Table {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

#[derive(Default)]
struct ServerState {
    generation: u64,
    tables: HashMap<String, Table>,
    faults: HashMap<Op, VecDeque<DriverError>>,
    log: Vec<Op>,
    connects: u32,
    executions: Vec<Execution>,
    execs: Vec<String>,
    next_insert_id: u64,
    quiet: bool,
}

impl ServerState {
    /// Logs the call and returns the queued fault for it, if any.
    fn enter(&mut self, op: Op, generation: u64) -> Result<(), DriverError> {
        if !self.quiet {
            self.log.push(op);
        }
        if op != Op::Connect && generation != self.generation {
            return Err(DriverError::server_gone_away());
        }
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Shared handle to the scripted server.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Rc<RefCell<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(&self) -> MockDriver {
        MockDriver {
            server: self.clone(),
        }
    }

    /// Stops recording the call log and execution history.
    pub fn quiet(&self) {
        self.state.borrow_mut().quiet = true;
    }

    /// Registers a result set returned for `sql`.
    pub fn add_table(&self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        self.state.borrow_mut().tables.insert(
            sql.to_string(),
            Table {
                columns: columns.into(),
                rows,
            },
        );
    }

    /// Registers `sql` as a single `n` column holding 1..=count.
    pub fn add_numbers(&self, sql: &str, count: i64) {
        let rows = (1..=count).map(|n| vec![Value::Int(n)]).collect();
        self.add_table(sql, &["n"], rows);
    }

    /// Makes every open connection and statement fail with "gone away".
    pub fn kill_connections(&self) {
        self.state.borrow_mut().generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Queues one failure for the next call of `op`.
    pub fn fail_next(&self, op: Op, error: DriverError) {
        self.fail_times(op, 1, error);
    }

    /// Queues `times` consecutive failures for `op`.
    pub fn fail_times(&self, op: Op, times: usize, error: DriverError) {
        let mut state = self.state.borrow_mut();
        let queue = state.faults.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Number of logged calls of `op`.
    pub fn calls(&self, op: Op) -> usize {
        self.state.borrow().log.iter().filter(|o| **o == op).count()
    }

    pub fn log(&self) -> Vec<Op> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Successful dials.
    pub fn connects(&self) -> u32 {
        self.state.borrow().connects
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.state.borrow().executions.clone()
    }

    /// SQL passed to successful `exec` calls.
    pub fn execs(&self) -> Vec<String> {
        self.state.borrow().execs.clone()
    }
}

pub struct MockDriver {
    server: MockServer,
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect(&self, config: &ConnectionConfig) -> Result<MockConnection, DriverError> {
        let mut state = self.server.state.borrow_mut();
        state.enter(Op::Connect, 0)?;
        if config.dsn().is_none() {
            return Err(DriverError::new("HY000", "invalid data source name"));
        }
        state.connects += 1;
        Ok(MockConnection {
            server: self.server.clone(),
            generation: state.generation,
            in_transaction: false,
            attributes: HashMap::new(),
            last_insert_id: None,
        })
    }

    fn available_drivers() -> Vec<String> {
        vec!["mock".to_string()]
    }
}

pub struct MockConnection {
    server: MockServer,
    generation: u64,
    in_transaction: bool,
    attributes: HashMap<String, Value>,
    last_insert_id: Option<u64>,
}

impl MockConnection {
    fn enter(&self, op: Op) -> Result<(), DriverError> {
        self.server.state.borrow_mut().enter(op, self.generation)
    }

    fn statement(&self, sql: &str) -> MockStatement {
        MockStatement {
            server: self.server.clone(),
            generation: self.generation,
            sql: sql.to_string(),
            bindings: BTreeMap::new(),
            columns: Vec::new(),
            result: None,
            position: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl DriverConnection for MockConnection {
    type Statement = MockStatement;

    fn prepare(
        &mut self,
        sql: &str,
        _options: &DriverOptions,
    ) -> Result<MockStatement, DriverError> {
        self.enter(Op::Prepare)?;
        Ok(self.statement(sql))
    }

    fn query(&mut self, sql: &str) -> Result<MockStatement, DriverError> {
        self.enter(Op::Query)?;
        let mut statement = self.statement(sql);
        statement.run(None);
        Ok(statement)
    }

    fn exec(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.enter(Op::Exec)?;
        let mut state = self.server.state.borrow_mut();
        if !state.quiet {
            state.execs.push(sql.to_string());
        }
        if sql.starts_with("INSERT") {
            state.next_insert_id += 1;
            self.last_insert_id = Some(state.next_insert_id);
        }
        Ok(1)
    }

    fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.enter(Op::Begin)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.enter(Op::Commit)?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.enter(Op::Rollback)?;
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn get_attribute(&self, name: &str) -> Result<Value, DriverError> {
        self.enter(Op::GetAttribute)?;
        Ok(self.attributes.get(name).cloned().unwrap_or_default())
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), DriverError> {
        self.enter(Op::SetAttribute)?;
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn quote(&self, text: &str, _ty: ParamType) -> Result<String, DriverError> {
        self.enter(Op::Quote)?;
        Ok(format!("'{}'", text.replace('\'', "''")))
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> Result<String, DriverError> {
        self.enter(Op::LastInsertId)?;
        Ok(self.last_insert_id.unwrap_or(0).to_string())
    }

    fn error_code(&self) -> Option<String> {
        Some("00000".to_string())
    }

    fn error_info(&self) -> ErrorInfo {
        ErrorInfo::default()
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.enter(Op::Ping)
    }
}

#[derive(Debug, Clone)]
enum Bound {
    Var(BoundVar),
    Value(Value),
}

pub struct MockStatement {
    server: MockServer,
    generation: u64,
    sql: String,
    bindings: BTreeMap<String, Bound>,
    columns: Vec<ParamId>,
    result: Option<Table>,
    position: usize,
}

impl MockStatement {
    fn enter(&self, op: Op) -> Result<(), DriverError> {
        self.server.state.borrow_mut().enter(op, self.generation)
    }

    fn run(&mut self, params: Option<&Params>) {
        let mut effective: BTreeMap<String, Value> = self
            .bindings
            .iter()
            .map(|(key, bound)| {
                let value = match bound {
                    Bound::Var(var) => var.get(),
                    Bound::Value(value) => value.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        match params {
            Some(Params::Positional(values)) => {
                for (i, value) in values.iter().enumerate() {
                    effective.insert((i + 1).to_string(), value.clone());
                }
            }
            Some(Params::Named(pairs)) => {
                for (name, value) in pairs {
                    effective.insert(format!(":{name}"), value.clone());
                }
            }
            None => {}
        }

        let mut state = self.server.state.borrow_mut();
        if !state.quiet {
            state.executions.push(Execution {
                sql: self.sql.clone(),
                params: effective,
                generation: self.generation,
            });
        }
        self.result = Some(state.tables.get(&self.sql).cloned().unwrap_or(Table {
            columns: Vec::<String>::new().into(),
            rows: Vec::new(),
        }));
        self.position = 0;
    }

    fn next_row(&mut self) -> Option<Row> {
        let table = self.result.as_ref()?;
        let values = table.rows.get(self.position)?.clone();
        self.position += 1;
        Some(Row::new(Arc::clone(&table.columns), values))
    }

    pub fn bound_columns(&self) -> &[ParamId] {
        &self.columns
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

impl DriverStatement for MockStatement {
    fn query_string(&self) -> &str {
        &self.sql
    }

    fn bind_param(
        &mut self,
        param: &ParamId,
        var: &BoundVar,
        _ty: ParamType,
    ) -> Result<(), DriverError> {
        self.enter(Op::BindParam)?;
        self.bindings.insert(param.to_string(), Bound::Var(var.clone()));
        Ok(())
    }

    fn bind_value(
        &mut self,
        param: &ParamId,
        value: &Value,
        _ty: ParamType,
    ) -> Result<(), DriverError> {
        self.enter(Op::BindValue)?;
        self.bindings
            .insert(param.to_string(), Bound::Value(value.clone()));
        Ok(())
    }

    fn bind_column(&mut self, column: &ParamId, _ty: Option<ParamType>) -> Result<(), DriverError> {
        self.enter(Op::BindColumn)?;
        if !self.columns.contains(column) {
            self.columns.push(column.clone());
        }
        Ok(())
    }

    fn execute(&mut self, params: Option<&Params>) -> Result<bool, DriverError> {
        self.enter(Op::Execute)?;
        self.run(params);
        Ok(true)
    }

    fn fetch(&mut self) -> Result<Option<Row>, DriverError> {
        self.enter(Op::Fetch)?;
        Ok(self.next_row())
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        self.enter(Op::FetchAll)?;
        let mut rows = Vec::new();
        while let Some(row) = self.next_row() {
            rows.push(row);
        }
        Ok(rows)
    }

    fn fetch_column(&mut self, column: usize) -> Result<Option<Value>, DriverError> {
        self.enter(Op::FetchColumn)?;
        Ok(self
            .next_row()
            .map(|row| row.get(column).cloned().unwrap_or_default()))
    }

    fn row_count(&self) -> Result<u64, DriverError> {
        self.enter(Op::RowCount)?;
        Ok(self.result.as_ref().map_or(0, |t| t.rows.len() as u64))
    }

    fn column_count(&self) -> Result<usize, DriverError> {
        self.enter(Op::ColumnCount)?;
        Ok(self.result.as_ref().map_or(0, |t| t.columns.len()))
    }

    fn column_meta(&self, column: usize) -> Result<Option<ColumnMeta>, DriverError> {
        Ok(self
            .result
            .as_ref()
            .and_then(|t| t.columns.get(column))
            .map(|name| ColumnMeta {
                name: name.clone(),
                ..ColumnMeta::default()
            }))
    }

    fn close_cursor(&mut self) -> Result<(), DriverError> {
        self.enter(Op::CloseCursor)?;
        self.result = None;
        self.position = 0;
        Ok(())
    }

    fn error_code(&self) -> Option<String> {
        Some("00000".to_string())
    }

    fn error_info(&self) -> ErrorInfo {
        ErrorInfo::default()
    }
}

/// Fully configured connection config for the mock driver.
pub fn config() -> ConnectionConfigBuilder {
    ConnectionConfig::builder()
        .dsn("mock:memory")
        .username("app")
        .password("secret")
        .name("test")
}

/// Opens a connection with default settings and `max_reconnection`.
pub fn connect(server: &MockServer, max_reconnection: u32) -> ReconnectingConnection<MockDriver> {
    let config = config().max_reconnection(max_reconnection).build();
    ReconnectingConnection::connect(server.driver(), config).expect("mock connect")
}

/// Collects emitted events for later inspection.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener pushing each event's type onto this log.
    pub fn attach(&self, builder: ConnectionConfigBuilder) -> ConnectionConfigBuilder {
        let events = Arc::clone(&self.events);
        builder.on_event(FnListener::new(move |event: &ConnectionEvent| {
            events
                .lock()
                .expect("event log lock")
                .push(event.event_type().to_string());
        }))
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("event log lock").clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events().iter().filter(|e| *e == event_type).count()
    }
}

/// A gone-away error.
pub fn gone_away() -> DriverError {
    DriverError::server_gone_away()
}

/// A non-transient syntax error.
pub fn syntax_error() -> DriverError {
    DriverError::new("42000", "You have an error in your SQL syntax").with_code(1064)
}
