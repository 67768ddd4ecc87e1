//! Transient-error classification.
//!
//! A [`TransientClassifier`] decides whether a [`DriverError`] means the
//! connection was lost (reconnect and retry) or anything else (propagate
//! unchanged, never retry).

use crate::error::DriverError;
use std::fmt;
use std::sync::Arc;

/// Decides whether a driver error is a recoverable connection loss.
pub trait TransientClassifier: Send + Sync {
    /// Returns `true` if the error should trigger reconnection.
    fn is_transient(&self, error: &DriverError) -> bool;
}

impl<T: TransientClassifier + ?Sized> TransientClassifier for Arc<T> {
    fn is_transient(&self, error: &DriverError) -> bool {
        (**self).is_transient(error)
    }
}

/// Default classifier: the "server has gone away" signature.
///
/// An error is transient when its message contains one of the signatures
/// (case-insensitive) and its SQLSTATE is in the generic `HY000` class or the
/// `08` connection-exception class. Syntax errors, constraint violations and
/// every other class are never transient, whatever their message says.
///
/// # Example
///
/// ```rust
/// use sql_reconnect_core::{DriverError, GoneAwayClassifier, TransientClassifier};
///
/// let classifier = GoneAwayClassifier::default();
///
/// assert!(classifier.is_transient(&DriverError::general("MySQL server has gone away")));
/// assert!(!classifier.is_transient(&DriverError::new("42000", "server has gone away")));
/// assert!(!classifier.is_transient(&DriverError::general("Division by zero")));
/// ```
#[derive(Debug, Clone)]
pub struct GoneAwayClassifier {
    signatures: Vec<String>,
}

impl GoneAwayClassifier {
    /// Creates a classifier with the built-in signatures.
    pub fn new() -> Self {
        Self {
            signatures: vec![
                "server has gone away".to_string(),
                "general error: 2006".to_string(),
            ],
        }
    }

    /// Adds a message signature that also counts as a connection loss.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signatures.push(signature.into().to_lowercase());
        self
    }

    /// Returns the configured signatures, lowercased.
    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }
}

impl Default for GoneAwayClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TransientClassifier for GoneAwayClassifier {
    fn is_transient(&self, error: &DriverError) -> bool {
        if !error.is_connection_class() {
            return false;
        }
        let message = error.message().to_lowercase();
        self.signatures.iter().any(|sig| message.contains(sig))
    }
}

/// A classifier backed by a closure.
///
/// ```rust
/// use sql_reconnect_core::{DriverError, FnClassifier, TransientClassifier};
///
/// // MySQL "Lost connection to server during query"
/// let classifier = FnClassifier::new(|err: &DriverError| err.code() == Some(2013));
///
/// assert!(classifier.is_transient(&DriverError::general("lost").with_code(2013)));
/// assert!(!classifier.is_transient(&DriverError::general("lost")));
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&DriverError) -> bool + Send + Sync,
{
    /// Creates a classifier from the given predicate.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> TransientClassifier for FnClassifier<F>
where
    F: Fn(&DriverError) -> bool + Send + Sync,
{
    fn is_transient(&self, error: &DriverError) -> bool {
        (self.f)(error)
    }
}

impl<F> fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}
