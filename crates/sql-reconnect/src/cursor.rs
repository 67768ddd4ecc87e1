//! Result-set position tracking.

use thiserror::Error;

/// Raised when a cursor would move before the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cursor position cannot be less than zero")]
pub struct CursorUnderflow;

/// Number of rows a statement has delivered from its current result set.
///
/// Movement is always expressed in single steps; cursor replay after a
/// recreation walks a fresh statement forward the same way, one discarded
/// row per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    position: u64,
}

impl Cursor {
    /// Creates a cursor at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves one row forward.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> &mut Self {
        self.position += 1;
        self
    }

    /// Moves one row back.
    pub fn prev(&mut self) -> Result<&mut Self, CursorUnderflow> {
        if self.position == 0 {
            return Err(CursorUnderflow);
        }
        self.position -= 1;
        Ok(self)
    }

    /// Walks to `target` one step at a time.
    pub fn set_position(&mut self, target: u64) -> &mut Self {
        while self.position < target {
            self.next();
        }
        while self.position > target {
            // position > target >= 0
            self.position -= 1;
        }
        self
    }

    /// Walks forward by `steps` rows.
    pub fn advance(&mut self, steps: u64) -> &mut Self {
        let target = self.position.saturating_add(steps);
        self.set_position(target)
    }

    /// Returns to position 0.
    pub fn reset(&mut self) -> &mut Self {
        self.set_position(0)
    }
}
