use crate::support::{self, gone_away, syntax_error, MockServer, Op};
use sql_reconnect::{ConnectionEvent, FnListener, ReconnectingConnection};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

/// Log sink shared with the subscriber.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let guard = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .with_max_level(LevelFilter::DEBUG)
        .finish()
        .set_default();
    (captured, guard)
}

#[test]
fn reconnection_is_logged() {
    let (logs, _guard) = capture();
    let server = MockServer::new();
    let conn = support::connect(&server, 5);
    server.fail_next(Op::Exec, gone_away());

    conn.exec("SELECT 1").unwrap();

    let output = logs.contents();
    assert!(output.contains("database connection lost; reconnecting"), "{output}");
    assert!(output.contains("database connection re-established"), "{output}");
    assert!(output.contains("connection=test"), "{output}");
}

#[test]
fn exhaustion_and_propagation_are_logged() {
    let (logs, _guard) = capture();
    let server = MockServer::new();
    let conn = support::connect(&server, 0);

    server.fail_next(Op::Exec, gone_away());
    let _ = conn.exec("SELECT 1");
    server.fail_next(Op::Exec, syntax_error());
    let _ = conn.exec("SELEC 1");

    let output = logs.contents();
    assert!(output.contains("giving up after maximum reconnection attempts"), "{output}");
    assert!(output.contains("propagating non-transient driver error"), "{output}");
}

#[test]
fn statement_recreation_is_logged() {
    let (logs, _guard) = capture();
    let server = MockServer::new();
    server.add_numbers("SELECT n FROM numbers", 3);
    let conn = support::connect(&server, 5);
    let mut stmt = conn.query("SELECT n FROM numbers").unwrap();
    stmt.fetch().unwrap();

    server.kill_connections();
    stmt.fetch().unwrap();

    let output = logs.contents();
    assert!(output.contains("statement recreated"), "{output}");
    assert!(output.contains("replayed_rows=1"), "{output}");
    assert!(output.contains("replaying cursor on recreated statement"), "{output}");
}

#[test]
fn panicking_listener_is_logged_with_connection() {
    let (logs, _guard) = capture();
    let server = MockServer::new();
    let config = support::config()
        .name("orders")
        .on_event(FnListener::new(|_: &ConnectionEvent| panic!("listener bug")))
        .build();
    let conn = ReconnectingConnection::connect(server.driver(), config).unwrap();
    server.fail_next(Op::Exec, gone_away());

    conn.exec("SELECT 1").unwrap();

    let output = logs.contents();
    assert!(output.contains("event listener panicked"), "{output}");
    assert!(output.contains("connection=orders"), "{output}");
    assert!(output.contains("connection_lost"), "{output}");
}
