//! Connection state tracking for reconnection logic.

use std::time::{Duration, Instant};

/// Connection state information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A driver handle is attached and the last dial succeeded
    Connected,

    /// No handle, or the last dial failed
    Disconnected,

    /// Dialing a replacement handle
    Reconnecting,
}

/// Reconnection bookkeeping for one connection manager.
///
/// `attempts` counts reconnections made on behalf of the call in flight. It is
/// reset only once a call succeeds; an exhausted call leaves it at the limit.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    state: ConnectionState,
    attempts: u32,
    last_connected: Option<Instant>,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_connected: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnections made since the last successful call.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Increments and returns the attempt number.
    pub fn increment_attempts(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Records a freshly attached handle.
    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.last_connected = Some(Instant::now());
    }

    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub fn mark_reconnecting(&mut self) {
        self.state = ConnectionState::Reconnecting;
    }

    /// Time since a handle was last attached.
    pub fn time_since_connected(&self) -> Option<Duration> {
        self.last_connected.map(|at| at.elapsed())
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}
