//! Pending confirmation store
//!
//! Holds the single staged proposal of each thread. Saving a new proposal
//! replaces whatever the thread held before, so the UI and the model always
//! act on the latest one. Each proposal gets a fresh id; a stale id from an
//! older confirmation card therefore resolves to nothing instead of
//! committing a newer payload.
//!
//! Status moves `pending -> confirmed` or `pending -> rejected` exactly once.
//! Transitions are guarded by a store precondition, so repeating one (or
//! racing two) is a no-op rather than an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::{FoodProposal, WeightProposal};
use crate::error::{NutriError, Result};
use crate::store::{collections, Document, Filter, Store, WriteBatch};

const CONFIRMATION_KEY: &str = "confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::Rejected => "rejected",
        }
    }
}

/// The proposed side effect, exactly as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationPayload {
    Food(FoodProposal),
    Weight(WeightProposal),
}

impl ConfirmationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmationPayload::Food(_) => "food",
            ConfirmationPayload::Weight(_) => "weight",
        }
    }

    /// Name of the tool that commits this payload.
    pub fn commit_tool(&self) -> &'static str {
        match self {
            ConfirmationPayload::Food(_) => "log_food",
            ConfirmationPayload::Weight(_) => "log_weight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Store document id; also the confirmation id handed to the UI
    #[serde(default, skip_serializing)]
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub tool_call_id: String,
    pub confirmation_data: ConfirmationPayload,
    pub status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PendingConfirmation {
    fn from_document(doc: &Document) -> Result<Self> {
        let mut record: PendingConfirmation = doc.decode()?;
        record.id = doc.id.clone();
        Ok(record)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConfirmationStatus::Pending
    }
}

pub struct ConfirmationStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Stage a proposal for the thread, replacing any previous record.
    pub async fn save(
        &self,
        thread_id: &str,
        user_id: &str,
        tool_call_id: &str,
        data: ConfirmationPayload,
    ) -> Result<PendingConfirmation> {
        let mut record = PendingConfirmation {
            id: String::new(),
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            confirmation_data: data,
            status: ConfirmationStatus::Pending,
            created_at: self.clock.now(),
            resolved_at: None,
        };
        let batch = WriteBatch::new()
            .delete_where(collections::CONFIRMATIONS, thread_id, Filter::All)
            .insert(
                collections::CONFIRMATIONS,
                thread_id,
                CONFIRMATION_KEY,
                serde_json::to_value(&record)?,
            );
        let ids = self.store.apply(batch).await?;
        record.id = ids
            .into_iter()
            .next()
            .ok_or_else(|| NutriError::Store("confirmation insert returned no id".into()))?;
        info!(
            thread_id = %thread_id,
            confirmation_id = %record.id,
            kind = record.confirmation_data.kind(),
            "Saved pending confirmation"
        );
        Ok(record)
    }

    /// The thread's record if it is still pending.
    pub async fn get_latest_pending(&self, thread_id: &str) -> Result<Option<PendingConfirmation>> {
        Ok(self.latest(thread_id).await?.filter(|r| r.is_pending()))
    }

    /// The thread's record regardless of status.
    pub async fn latest(&self, thread_id: &str) -> Result<Option<PendingConfirmation>> {
        let docs = self
            .store
            .query(collections::CONFIRMATIONS, thread_id, None)
            .await?;
        docs.iter()
            .max_by_key(|d| d.seq)
            .map(PendingConfirmation::from_document)
            .transpose()
    }

    pub async fn get(&self, confirmation_id: &str) -> Result<Option<PendingConfirmation>> {
        self.store
            .get(collections::CONFIRMATIONS, confirmation_id)
            .await?
            .as_ref()
            .map(PendingConfirmation::from_document)
            .transpose()
    }

    /// Mark confirmed. Already-resolved records are returned unchanged.
    pub async fn confirm(&self, confirmation_id: &str) -> Result<PendingConfirmation> {
        self.transition(confirmation_id, ConfirmationStatus::Confirmed)
            .await
    }

    /// Mark rejected. Already-resolved records are returned unchanged.
    pub async fn reject(&self, confirmation_id: &str) -> Result<PendingConfirmation> {
        self.transition(confirmation_id, ConfirmationStatus::Rejected)
            .await
    }

    /// Write ops that move a pending record to `to`. The batch fails with
    /// [`NutriError::Conflict`] unless the record is still pending.
    pub fn transition_batch(
        confirmation_id: &str,
        to: ConfirmationStatus,
        at: DateTime<Utc>,
    ) -> WriteBatch {
        WriteBatch::new()
            .expect(
                collections::CONFIRMATIONS,
                confirmation_id,
                "status",
                json!(ConfirmationStatus::Pending.as_str()),
            )
            .patch(
                collections::CONFIRMATIONS,
                confirmation_id,
                json!({ "status": to.as_str(), "resolved_at": at }),
            )
    }

    async fn transition(
        &self,
        confirmation_id: &str,
        to: ConfirmationStatus,
    ) -> Result<PendingConfirmation> {
        let current = self
            .get(confirmation_id)
            .await?
            .ok_or_else(|| NutriError::NotFound(format!("confirmation {}", confirmation_id)))?;
        if !current.is_pending() {
            debug!(
                confirmation_id = %confirmation_id,
                status = current.status.as_str(),
                "Confirmation already resolved"
            );
            return Ok(current);
        }

        let batch = Self::transition_batch(confirmation_id, to, self.clock.now());
        match self.store.apply(batch).await {
            Ok(_) | Err(NutriError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
        self.get(confirmation_id)
            .await?
            .ok_or_else(|| NutriError::NotFound(format!("confirmation {}", confirmation_id)))
    }
}
