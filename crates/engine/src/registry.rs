//! Row registry: semantic row keys to (sheet, row) positions.
//!
//! Keys are bound once, when the owning sheet appends the row, and never
//! rebound. Later sheets resolve keys to emit references. A key reserved
//! for second-pass fill resolves only after its row has been filled.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::BuildError;
use crate::sheet::SheetId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RowBinding {
    pub sheet: SheetId,
    /// 0-based row index; the spreadsheet row number is `row + 1`.
    pub row: usize,
}

impl RowBinding {
    pub fn excel_row(&self) -> usize {
        self.row + 1
    }
}

impl fmt::Display for RowBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}", self.sheet.tab_name(), self.excel_row())
    }
}

/// A reserved row slot. Move-only: filling consumes it, so a reservation
/// is written exactly once.
#[derive(Debug)]
pub struct RowHandle {
    key: String,
    binding: RowBinding,
}

impl RowHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn binding(&self) -> RowBinding {
        self.binding
    }
}

#[derive(Debug, Default)]
pub struct RowRegistry {
    bindings: BTreeMap<String, RowBinding>,
    pending: BTreeSet<String>,
}

impl RowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, key: &str, sheet: SheetId, row: usize) -> Result<(), BuildError> {
        if let Some(existing) = self.bindings.get(key) {
            return Err(BuildError::DuplicateKey { key: key.to_string(), existing: *existing });
        }
        self.bindings.insert(key.to_string(), RowBinding { sheet, row });
        Ok(())
    }

    pub fn resolve(&self, key: &str) -> Result<RowBinding, BuildError> {
        match self.bindings.get(key) {
            None => Err(BuildError::UnresolvedReference {
                key: key.to_string(),
                reason: "key was never bound".into(),
            }),
            Some(_) if self.pending.contains(key) => Err(BuildError::UnresolvedReference {
                key: key.to_string(),
                reason: "row is reserved and not yet filled".into(),
            }),
            Some(binding) => Ok(*binding),
        }
    }

    /// Bind `key` and mark it reserved.
    pub fn reserve(&mut self, key: &str, sheet: SheetId, row: usize) -> Result<RowHandle, BuildError> {
        self.bind(key, sheet, row)?;
        self.pending.insert(key.to_string());
        Ok(RowHandle { key: key.to_string(), binding: RowBinding { sheet, row } })
    }

    /// Release a reservation; the key resolves from now on.
    pub fn complete(&mut self, handle: RowHandle) -> RowBinding {
        self.pending.remove(&handle.key);
        handle.binding
    }

    /// Binding for `key`, reserved or not.
    pub fn get(&self, key: &str) -> Option<RowBinding> {
        self.bindings.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, RowBinding)> {
        self.bindings.iter().map(|(k, b)| (k.as_str(), *b))
    }
}
