//! In-process document store.
//!
//! All state lives behind one `RwLock`. Write batches run against a copy of
//! the state and are swapped in only when every op succeeded, so a failed
//! precondition never leaves a partial write behind. When a snapshot path is
//! configured the whole state is rewritten to disk after each mutation.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{Document, Store, WriteBatch, WriteOp};
use crate::config::StoreConfig;
use crate::error::{NutriError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_seq: u64,
    /// collection -> id -> document
    collections: HashMap<String, HashMap<String, Document>>,
}

impl StoreState {
    fn collection_mut(&mut self, name: &str) -> &mut HashMap<String, Document> {
        self.collections.entry(name.to_string()).or_default()
    }

    fn insert(&mut self, collection: &str, partition: &str, key: &str, body: Value) -> Document {
        self.next_seq += 1;
        let now = Utc::now();
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            collection: collection.to_string(),
            partition: partition.to_string(),
            key: key.to_string(),
            body,
            seq: self.next_seq,
            created_at: now,
            updated_at: now,
        };
        self.collection_mut(collection)
            .insert(doc.id.clone(), doc.clone());
        doc
    }

    fn patch(&mut self, collection: &str, id: &str, fields: Value) -> Result<Document> {
        let Value::Object(fields) = fields else {
            return Err(NutriError::Store(format!(
                "patch for {}/{} must be a JSON object",
                collection, id
            )));
        };
        let doc = self
            .collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| NutriError::NotFound(format!("{}/{}", collection, id)))?;

        if !doc.body.is_object() {
            doc.body = Value::Object(Map::new());
        }
        if let Value::Object(body) = &mut doc.body {
            for (k, v) in fields {
                body.insert(k, v);
            }
        }
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    fn query(&self, collection: &str, partition: &str, key: Option<&str>) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|d| d.partition == partition)
                    .filter(|d| key.map(|k| d.key == k).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(|d| d.seq);
        docs
    }

    fn apply_op(&mut self, op: WriteOp, inserted: &mut Vec<String>) -> Result<()> {
        match op {
            WriteOp::Insert {
                collection,
                partition,
                key,
                body,
            } => {
                let doc = self.insert(&collection, &partition, &key, body);
                inserted.push(doc.id);
            }
            WriteOp::Patch {
                collection,
                id,
                fields,
            } => {
                self.patch(&collection, &id, fields)?;
            }
            WriteOp::Delete { collection, id } => {
                if let Some(c) = self.collections.get_mut(&collection) {
                    c.remove(&id);
                }
            }
            WriteOp::DeleteWhere {
                collection,
                partition,
                filter,
            } => {
                if let Some(c) = self.collections.get_mut(&collection) {
                    c.retain(|_, d| !(d.partition == partition && filter.matches(d)));
                }
            }
            WriteOp::Increment {
                collection,
                partition,
                key,
                field,
            } => {
                let existing = self
                    .query(&collection, &partition, Some(&key))
                    .into_iter()
                    .next();
                match existing {
                    Some(doc) => {
                        let current = doc.body.get(&field).and_then(Value::as_u64).unwrap_or(0);
                        let mut fields = Map::new();
                        fields.insert(field, Value::from(current + 1));
                        self.patch(&collection, &doc.id, Value::Object(fields))?;
                    }
                    None => {
                        let mut body = Map::new();
                        body.insert(field, Value::from(1u64));
                        self.insert(&collection, &partition, &key, Value::Object(body));
                    }
                }
            }
            WriteOp::Expect {
                collection,
                id,
                field,
                equals,
            } => {
                let actual = self
                    .collections
                    .get(&collection)
                    .and_then(|c| c.get(&id))
                    .and_then(|d| d.body.get(&field).cloned());
                if actual.as_ref() != Some(&equals) {
                    return Err(NutriError::Conflict(format!(
                        "{}/{} expected {} = {}, found {}",
                        collection,
                        id,
                        field,
                        equals,
                        actual.map(|v| v.to_string()).unwrap_or_else(|| "nothing".into())
                    )));
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`Store`] with optional JSON snapshot persistence.
///
/// # Example
///
/// ```
/// use nutrichat::store::{MemoryStore, Store};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let doc = store
///     .insert("food_logs", "user-1", "2026-03-01", json!({"calories": 105}))
///     .await
///     .unwrap();
/// let found = store.query("food_logs", "user-1", Some("2026-03-01")).await.unwrap();
/// assert_eq!(found[0].id, doc.id);
/// # });
/// ```
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store without persistence.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
        }
    }

    /// Create a store backed by a JSON snapshot. An existing snapshot is
    /// loaded; parent directories are created when missing.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Store described by the `store` config section.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.path.as_deref() {
            Some(path) => Self::with_path(PathBuf::from(path)),
            None => Ok(Self::new()),
        }
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        let state = self.state.read().await;
        state.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(ref path) = self.snapshot_path {
            let content = serde_json::to_string(state)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, content).await?;
            tokio::fs::rename(&tmp, path).await?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        partition: &str,
        key: &str,
        body: Value,
    ) -> Result<Document> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let doc = staged.insert(collection, partition, key, body);
        self.persist(&staged).await?;
        *state = staged;
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn patch(&self, collection: &str, id: &str, fields: Value) -> Result<Document> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let doc = staged.patch(collection, id, fields)?;
        self.persist(&staged).await?;
        *state = staged;
        Ok(doc)
    }

    async fn query(
        &self,
        collection: &str,
        partition: &str,
        key: Option<&str>,
    ) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        Ok(state.query(collection, partition, key))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let removed = staged
            .collections
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            self.persist(&staged).await?;
            *state = staged;
        }
        Ok(removed)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let mut inserted = Vec::new();
        let op_count = batch.len();

        for op in batch.ops {
            staged.apply_op(op, &mut inserted)?;
        }

        // Memory only changes once the snapshot is on disk.
        self.persist(&staged).await?;
        *state = staged;
        crate::log_component!(
            debug,
            "store",
            "Write batch applied",
            ops = op_count,
            inserted = inserted.len()
        );
        Ok(inserted)
    }
}
