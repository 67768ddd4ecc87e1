//! Core infrastructure for sql-reconnect.
//!
//! This crate provides what every layer of the reconnecting wrapper shares:
//! - [`DriverError`], the error a database driver reports at the boundary
//! - Transient-error classification ("server has gone away" detection)
//! - Event system for observability

pub mod classify;
pub mod error;
pub mod events;

pub use classify::{FnClassifier, GoneAwayClassifier, TransientClassifier};
pub use error::DriverError;
pub use events::{EventListener, EventListeners, FnListener, ReconnectEvent};
