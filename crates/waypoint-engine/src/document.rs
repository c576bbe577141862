//! The mutable JSON document threaded through an execution.
//!
//! Writes never mutate in place: `set` and `merge` build the updated tree on a
//! structural copy and commit it only when the whole write succeeds, so a
//! failed write leaves the document untouched and snapshots taken earlier are
//! never affected by later updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{ErrorCategory, Failure};
use crate::path::{Path, PathSegment, navigate_segment, render_segments};

/// Errors from document reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// A traversed segment is absent.
    #[error("path '{path}' not found (missing at '{missing}')")]
    NotFound { path: String, missing: String },

    /// A write would have to traverse through a scalar.
    #[error("cannot write '{path}': '{at}' is not a container")]
    Conflict { path: String, at: String },
}

impl From<DocumentError> for Failure {
    fn from(err: DocumentError) -> Self {
        Failure::new(ErrorCategory::PathNotFound, err.to_string())
    }
}

/// A JSON document with path-scoped read, write, and merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    value: Value,
}

impl Document {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// An independent copy of the current tree, for audit records.
    pub fn snapshot(&self) -> Value {
        self.value.clone()
    }

    /// Read the value at `path`, failing if any segment is absent.
    pub fn get(&self, path: &Path) -> Result<&Value, DocumentError> {
        let mut current = &self.value;
        for (i, segment) in path.segments().iter().enumerate() {
            current =
                navigate_segment(current, segment).ok_or_else(|| DocumentError::NotFound {
                    path: path.to_string(),
                    missing: render_segments(&path.segments()[..=i]),
                })?;
        }
        Ok(current)
    }

    /// Read the value at `path`, returning `None` if absent.
    pub fn lookup(&self, path: &Path) -> Option<&Value> {
        path.resolve(&self.value)
    }

    /// Read the value at `path`, returning `null` if absent.
    pub fn get_or_null(&self, path: &Path) -> Value {
        self.lookup(path).cloned().unwrap_or(Value::Null)
    }

    /// Write `value` at `path`, creating intermediate containers as needed.
    ///
    /// Field segments create objects, index segments create arrays padded with
    /// `null`. Writing at the root replaces the document.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<(), DocumentError> {
        let mut next = self.value.clone();
        write_at(&mut next, path.segments(), value, path, 0)?;
        self.value = next;
        Ok(())
    }

    /// Shallow-merge `value` into the target at `path`.
    ///
    /// - root: the document is replaced by `value`
    /// - object into object: union of keys, incoming keys win
    /// - anything else: same as [`Document::set`]
    pub fn merge(&mut self, path: &Path, value: Value) -> Result<(), DocumentError> {
        if path.is_root() {
            self.value = value;
            return Ok(());
        }
        let merged = match (self.lookup(path), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let mut union = existing.clone();
                union.extend(incoming);
                Value::Object(union)
            }
            (_, other) => other,
        };
        self.set(path, merged)
    }

    /// Top-level field names, when the document is an object.
    pub fn field_names(&self) -> Vec<String> {
        match &self.value {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn write_at(
    target: &mut Value,
    segments: &[PathSegment],
    value: Value,
    full: &Path,
    depth: usize,
) -> Result<(), DocumentError> {
    let Some((segment, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    let conflict = || DocumentError::Conflict {
        path: full.to_string(),
        at: render_segments(&full.segments()[..depth]),
    };

    match segment {
        PathSegment::Field(name) => {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let map = target.as_object_mut().ok_or_else(conflict)?;
            let slot = map.entry(name.clone()).or_insert(Value::Null);
            write_at(slot, rest, value, full, depth + 1)
        }
        PathSegment::Index(i) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let arr = target.as_array_mut().ok_or_else(conflict)?;
            if arr.len() <= *i {
                arr.resize(*i + 1, Value::Null);
            }
            write_at(&mut arr[*i], rest, value, full, depth + 1)
        }
    }
}
