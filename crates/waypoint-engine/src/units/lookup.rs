//! Key-value configuration lookups exposed as units.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{UnitContext, UnitOfWork};
use crate::error::Failure;
use crate::path::Path;

/// A read-only key-value source.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, Failure>;
}

/// A [`ConfigStore`] held in memory.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for InMemoryConfigStore {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Failure> {
        Ok(self.entries.read().get(key).cloned())
    }
}

/// Reads a key from a field of its input and returns the stored value.
///
/// A key field that is absent or not a string, and a key the store does not
/// hold, are both `TaskFailed` failures.
pub struct LookupUnit {
    name: String,
    key_field: Path,
    store: Arc<dyn ConfigStore>,
}

impl LookupUnit {
    /// A lookup keyed by the input's `key` field.
    pub fn new(name: impl Into<String>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            name: name.into(),
            key_field: Path::root().child(crate::path::PathSegment::Field("key".into())),
            store,
        }
    }

    /// Read the key from `field` instead.
    pub fn with_key_field(mut self, field: Path) -> Self {
        self.key_field = field;
        self
    }
}

#[async_trait]
impl UnitOfWork for LookupUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: Value, _ctx: &UnitContext) -> Result<Value, Failure> {
        let key = self
            .key_field
            .resolve(&input)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Failure::task_failed(format!(
                    "lookup input has no string field '{}'",
                    self.key_field
                ))
            })?;
        self.store
            .get(key)
            .await?
            .ok_or_else(|| Failure::task_failed(format!("no configuration for key '{key}'")))
    }
}
