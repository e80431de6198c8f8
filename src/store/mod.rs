//! Store module - document persistence behind the orchestration core
//!
//! The persistent store is an external collaborator. This module defines the
//! narrow contract the core needs from it:
//!
//! - documents grouped in named collections
//! - a secondary index on `(partition, key)`, used as `(user_id, date)`,
//!   `(user_id, cache_key)` and `(thread_id, "pending")`
//! - `insert`, `get`, `patch`, `query`, `delete`
//! - [`Store::apply`], an all-or-nothing [`WriteBatch`] with preconditions,
//!   which commit tools use to write a ledger entry, resolve the pending
//!   confirmation and evict cache entries in one step
//!
//! [`MemoryStore`] is the in-process implementation, optionally persisted to a
//! JSON snapshot file.

mod memory;
pub mod records;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NutriError, Result};

/// Collection names used by the core.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const PREFERENCES: &str = "preferences";
    pub const FOOD_LOGS: &str = "food_logs";
    pub const WEIGHT_LOGS: &str = "weight_logs";
    pub const THREADS: &str = "threads";
    pub const CONFIRMATIONS: &str = "pending_confirmations";
    pub const CONTEXT_CACHE: &str = "context_cache";
    pub const CACHE_EPOCHS: &str = "cache_epochs";
}

/// A stored document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier within the store
    pub id: String,
    /// Collection the document lives in
    pub collection: String,
    /// First index component (user id or thread id)
    pub partition: String,
    /// Second index component (date, cache key, ...)
    pub key: String,
    /// Document payload
    pub body: Value,
    /// Monotonic insertion sequence, used for ordering
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Deserialize the payload into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            NutriError::Store(format!(
                "document {} in {} has unexpected shape: {}",
                self.id, self.collection, e
            ))
        })
    }
}

/// Predicate for [`WriteOp::DeleteWhere`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the partition
    All,
    /// Documents whose index key equals the value
    KeyEquals(String),
    /// Documents whose body field is an array containing the value
    ArrayContains { field: String, value: Value },
}

impl Filter {
    pub(crate) fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::KeyEquals(key) => doc.key == *key,
            Filter::ArrayContains { field, value } => doc
                .body
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
        }
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new document.
    Insert {
        collection: String,
        partition: String,
        key: String,
        body: Value,
    },
    /// Shallow-merge `fields` into an existing document body.
    Patch {
        collection: String,
        id: String,
        fields: Value,
    },
    /// Delete one document by id. Missing ids are ignored.
    Delete { collection: String, id: String },
    /// Delete every document in a partition matching the filter.
    DeleteWhere {
        collection: String,
        partition: String,
        filter: Filter,
    },
    /// Increment an integer counter stored at `(partition, key)`, creating it
    /// at 1 when absent.
    Increment {
        collection: String,
        partition: String,
        key: String,
        field: String,
    },
    /// Abort the whole batch unless `body[field] == equals`.
    Expect {
        collection: String,
        id: String,
        field: String,
        equals: Value,
    },
}

/// An ordered list of mutations applied atomically.
///
/// # Example
///
/// ```
/// use nutrichat::store::{Filter, WriteBatch};
/// use serde_json::json;
///
/// let batch = WriteBatch::new()
///     .expect("pending_confirmations", "c1", "status", json!("pending"))
///     .insert("food_logs", "user-1", "2026-03-01", json!({"calories": 105}))
///     .patch("pending_confirmations", "c1", json!({"status": "confirmed"}))
///     .delete_where(
///         "context_cache",
///         "user-1",
///         Filter::ArrayContains { field: "invalidate_on".into(), value: json!("food_logged") },
///     );
/// assert_eq!(batch.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, collection: &str, partition: &str, key: &str, body: Value) -> Self {
        self.ops.push(WriteOp::Insert {
            collection: collection.to_string(),
            partition: partition.to_string(),
            key: key.to_string(),
            body,
        });
        self
    }

    pub fn patch(mut self, collection: &str, id: &str, fields: Value) -> Self {
        self.ops.push(WriteOp::Patch {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn delete(mut self, collection: &str, id: &str) -> Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn delete_where(mut self, collection: &str, partition: &str, filter: Filter) -> Self {
        self.ops.push(WriteOp::DeleteWhere {
            collection: collection.to_string(),
            partition: partition.to_string(),
            filter,
        });
        self
    }

    pub fn increment(mut self, collection: &str, partition: &str, key: &str, field: &str) -> Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            partition: partition.to_string(),
            key: key.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn expect(mut self, collection: &str, id: &str, field: &str, equals: Value) -> Self {
        self.ops.push(WriteOp::Expect {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            equals,
        });
        self
    }

    /// Append every op of another batch.
    pub fn extend(mut self, other: WriteBatch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Document store contract.
///
/// Implementations must be safe to share across tasks. Queries return
/// documents in insertion order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document and return it.
    async fn insert(
        &self,
        collection: &str,
        partition: &str,
        key: &str,
        body: Value,
    ) -> Result<Document>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Shallow-merge fields into a document body and return the result.
    async fn patch(&self, collection: &str, id: &str, fields: Value) -> Result<Document>;

    /// Query by `(partition, key)`, or the whole partition when `key` is `None`.
    async fn query(
        &self,
        collection: &str,
        partition: &str,
        key: Option<&str>,
    ) -> Result<Vec<Document>>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Apply a batch atomically. Returns the ids of inserted documents in
    /// order. A failed [`WriteOp::Expect`] yields [`NutriError::Conflict`] and
    /// leaves the store untouched.
    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>>;
}
