//! Recorded bindings used to rebuild a statement.
//!
//! Every `bind_param`, `bind_value` and `bind_column` call is recorded under
//! its (kind, identifier) key. Re-binding the same key replaces the old entry
//! and moves it to the end, so replay applies bindings in the order they were
//! last set and the driver ends up in the same state it was in before the
//! connection dropped.

use crate::driver::DriverStatement;
use crate::value::{BoundVar, ParamId, ParamType, Value};
use sql_reconnect_core::DriverError;

/// Which bind call produced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindKind {
    Param,
    Value,
    Column,
}

/// One recorded bind call.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Placeholder bound to a caller-held variable.
    Param { var: BoundVar, ty: ParamType },
    /// Placeholder bound to a fixed value.
    Value { value: Value, ty: ParamType },
    /// Output column refreshed after every fetch.
    Column { var: BoundVar, ty: Option<ParamType> },
}

impl Binding {
    pub fn kind(&self) -> BindKind {
        match self {
            Binding::Param { .. } => BindKind::Param,
            Binding::Value { .. } => BindKind::Value,
            Binding::Column { .. } => BindKind::Column,
        }
    }

    /// Applies this binding to a statement handle.
    pub fn apply<S: DriverStatement + ?Sized>(
        &self,
        id: &ParamId,
        statement: &mut S,
    ) -> Result<(), DriverError> {
        match self {
            Binding::Param { var, ty } => statement.bind_param(id, var, *ty),
            Binding::Value { value, ty } => statement.bind_value(id, value, *ty),
            Binding::Column { ty, .. } => statement.bind_column(id, *ty),
        }
    }
}

/// Ordered record of a statement's bindings.
#[derive(Debug, Clone, Default)]
pub struct SeedData {
    entries: Vec<(ParamId, Binding)>,
}

impl SeedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a binding, replacing any earlier one with the same key.
    pub fn record(&mut self, id: ParamId, binding: Binding) {
        let kind = binding.kind();
        self.entries
            .retain(|(existing, b)| !(b.kind() == kind && *existing == id));
        self.entries.push((id, binding));
    }

    /// Returns the binding recorded for the key.
    pub fn get(&self, kind: BindKind, id: &ParamId) -> Option<&Binding> {
        self.entries
            .iter()
            .find(|(existing, b)| b.kind() == kind && existing == id)
            .map(|(_, b)| b)
    }

    /// Iterates in replay order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamId, &Binding)> {
        self.entries.iter().map(|(id, b)| (id, b))
    }

    /// Iterates over bound output columns.
    pub fn columns(&self) -> impl Iterator<Item = (&ParamId, &BoundVar)> {
        self.entries.iter().filter_map(|(id, b)| match b {
            Binding::Column { var, .. } => Some((id, var)),
            _ => None,
        })
    }

    /// Returns true if any output column is bound.
    pub fn has_columns(&self) -> bool {
        self.columns().next().is_some()
    }

    /// Re-applies every binding onto a fresh statement, in replay order.
    pub fn replay<S: DriverStatement + ?Sized>(
        &self,
        statement: &mut S,
    ) -> Result<(), DriverError> {
        for (id, binding) in &self.entries {
            binding.apply(id, statement)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
