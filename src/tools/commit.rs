//! Atomic commit of a staged confirmation into the ledger.
//!
//! One write batch carries the whole commit:
//!
//! 1. precondition: the confirmation is still `pending`
//! 2. ledger insert (food or weight row indexed by `(user_id, date)`)
//! 3. confirmation `pending -> confirmed`
//! 4. cache eviction and epoch bump for the matching event
//! 5. for weight, the profile's current weight
//!
//! Either all of it lands or none of it does. A failed precondition means
//! another commit already consumed the confirmation and is reported as a
//! duplicate.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::duplicate::{DuplicateGuard, DuplicateKey};
use super::types::{ToolContext, ToolEffect, ToolOutput};
use crate::cache::{CacheEvent, ContextCache};
use crate::confirmations::{ConfirmationPayload, ConfirmationStatus, ConfirmationStore, PendingConfirmation};
use crate::domain::{FoodEntry, UserProfile, WeightEntry};
use crate::error::{NutriError, Result};
use crate::store::{collections, records, Store, WriteBatch};

/// Why a commit was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// The confirmation was already committed.
    AlreadyConfirmed,
    /// A near-identical entry was written moments ago.
    RecentSimilarEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        confirmation_id: String,
        entry_id: String,
    },
    Duplicate {
        confirmation_id: String,
        reason: DuplicateReason,
    },
}

pub struct Committer {
    store: Arc<dyn Store>,
    guard: Arc<DuplicateGuard>,
    calorie_rounding: u32,
}

impl Committer {
    pub fn new(store: Arc<dyn Store>, guard: Arc<DuplicateGuard>, calorie_rounding: u32) -> Self {
        Self {
            store,
            guard,
            calorie_rounding,
        }
    }

    /// Commit `record` for the user's local `date`.
    pub async fn commit(
        &self,
        record: &PendingConfirmation,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        match self.current_status(record).await? {
            ConfirmationStatus::Pending => {}
            ConfirmationStatus::Confirmed => {
                return Ok(CommitOutcome::Duplicate {
                    confirmation_id: record.id.clone(),
                    reason: DuplicateReason::AlreadyConfirmed,
                })
            }
            ConfirmationStatus::Rejected => {
                return Err(NutriError::tool(
                    record.confirmation_data.commit_tool(),
                    format!("confirmation {} was rejected", record.id),
                ))
            }
        }

        let key = self.duplicate_key(record);
        if !self.guard.try_reserve(&key) {
            warn!(
                user_id = %record.user_id,
                confirmation_id = %record.id,
                "Skipping likely duplicate ledger write"
            );
            return Ok(CommitOutcome::Duplicate {
                confirmation_id: record.id.clone(),
                reason: DuplicateReason::RecentSimilarEntry,
            });
        }

        let entry_id = match self.write_ledger(record, date, now).await {
            Ok(Some(entry_id)) => entry_id,
            Ok(None) => {
                self.guard.release(&key);
                return Ok(CommitOutcome::Duplicate {
                    confirmation_id: record.id.clone(),
                    reason: DuplicateReason::AlreadyConfirmed,
                });
            }
            Err(e) => {
                self.guard.release(&key);
                return Err(e);
            }
        };

        info!(
            user_id = %record.user_id,
            thread_id = %record.thread_id,
            confirmation_id = %record.id,
            entry_id = %entry_id,
            kind = record.confirmation_data.kind(),
            "Committed confirmation to ledger"
        );
        Ok(CommitOutcome::Committed {
            confirmation_id: record.id.clone(),
            entry_id,
        })
    }

    /// Apply the ledger batch. `None` when the pending record was consumed
    /// by another writer first.
    async fn write_ledger(
        &self,
        record: &PendingConfirmation,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let batch = self.build_batch(record, date, now).await?;
        match self.store.apply(batch).await {
            Ok(ids) => ids.into_iter().next().map(Some).ok_or_else(|| {
                NutriError::tool(record.confirmation_data.commit_tool(), "ledger insert returned no id")
            }),
            Err(NutriError::Conflict(detail)) => {
                info!(confirmation_id = %record.id, detail = %detail, "Confirmation already consumed");
                Ok(None)
            }
            Err(e) => Err(NutriError::tool(
                record.confirmation_data.commit_tool(),
                e.to_string(),
            )),
        }
    }

    /// Status as stored now; `record` may be a stale snapshot.
    async fn current_status(&self, record: &PendingConfirmation) -> Result<ConfirmationStatus> {
        let doc = self
            .store
            .get(collections::CONFIRMATIONS, &record.id)
            .await?
            .ok_or_else(|| NutriError::NotFound(format!("confirmation {}", record.id)))?;
        let status = doc.body.get("status").cloned().unwrap_or_default();
        serde_json::from_value(status).map_err(|e| {
            NutriError::Store(format!("confirmation {} has bad status: {}", record.id, e))
        })
    }

    fn duplicate_key(&self, record: &PendingConfirmation) -> DuplicateKey {
        match &record.confirmation_data {
            ConfirmationPayload::Food(food) => DuplicateKey::food(
                &record.user_id,
                food.meal_type,
                food.rounded_calories(self.calorie_rounding),
            ),
            ConfirmationPayload::Weight(weight) => {
                DuplicateKey::weight(&record.user_id, weight.weight_kg)
            }
        }
    }

    async fn build_batch(
        &self,
        record: &PendingConfirmation,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WriteBatch> {
        let user_id = record.user_id.as_str();
        let date_key = records::date_key(date);
        let resolve = ConfirmationStore::transition_batch(&record.id, ConfirmationStatus::Confirmed, now);

        let batch = match &record.confirmation_data {
            ConfirmationPayload::Food(food) => {
                let entry = FoodEntry {
                    user_id: user_id.to_string(),
                    date,
                    logged_at: now,
                    confirmation_id: record.id.clone(),
                    food: food.clone(),
                };
                // Insert first so its id is the first one returned.
                WriteBatch::new()
                    .insert(collections::FOOD_LOGS, user_id, &date_key, serde_json::to_value(&entry)?)
                    .extend(resolve)
                    .extend(ContextCache::invalidation_batch(user_id, &[CacheEvent::FoodLogged]))
            }
            ConfirmationPayload::Weight(weight) => {
                let entry = WeightEntry {
                    user_id: user_id.to_string(),
                    date,
                    logged_at: now,
                    confirmation_id: record.id.clone(),
                    weight_kg: weight.weight_kg,
                };
                let doc = records::ensure_profile(self.store.as_ref(), user_id).await?;
                let mut profile: UserProfile = doc.decode()?;
                profile.current_weight_kg = Some(weight.weight_kg);
                let mut fields = json!({ "current_weight_kg": weight.weight_kg });
                if profile.onboarding_complete() {
                    if let Some(target) = profile.compute_calorie_target() {
                        fields["daily_calorie_target"] = json!(target);
                    }
                }
                WriteBatch::new()
                    .insert(collections::WEIGHT_LOGS, user_id, &date_key, serde_json::to_value(&entry)?)
                    .extend(resolve)
                    .patch(collections::PROFILES, &doc.id, fields)
                    .extend(ContextCache::invalidation_batch(user_id, &[CacheEvent::WeightLogged]))
            }
        };
        Ok(batch)
    }
}

/// Shared body of the `log_*` tools: find the staged record for the thread
/// (or the id the model named), check it is the right kind, and commit it.
pub(crate) async fn execute_commit(
    confirmations: &ConfirmationStore,
    committer: &Committer,
    tool: &str,
    confirmation_id: Option<&str>,
    expected_kind: &str,
    ctx: &ToolContext,
) -> Result<ToolOutput> {
    let record = match confirmation_id {
        Some(id) => confirmations
            .get(id)
            .await?
            .filter(|r| r.thread_id == ctx.thread_id && r.user_id == ctx.user_id),
        None => confirmations.latest(&ctx.thread_id).await?,
    };
    let Some(record) = record else {
        return Ok(ToolOutput::error(format!(
            "Nothing is waiting to be logged. Propose the entry first and ask the user to confirm before calling {}.",
            tool
        )));
    };
    if record.confirmation_data.kind() != expected_kind {
        return Ok(ToolOutput::error(format!(
            "The staged entry is a {} entry; call {} instead.",
            record.confirmation_data.kind(),
            record.confirmation_data.commit_tool()
        )));
    }

    match committer.commit(&record, ctx.today(), ctx.now_utc()).await? {
        CommitOutcome::Committed {
            confirmation_id,
            entry_id,
        } => Ok(ToolOutput::with_effect(
            &json!({
                "status": "logged",
                "confirmation_id": confirmation_id,
                "entry_id": entry_id,
                "logged": record.confirmation_data,
            }),
            ToolEffect::Committed {
                confirmation_id,
                entry_id,
            },
        )),
        CommitOutcome::Duplicate {
            confirmation_id,
            reason,
        } => {
            let reason = match reason {
                DuplicateReason::AlreadyConfirmed => "already_logged",
                DuplicateReason::RecentSimilarEntry => "recent_similar_entry",
            };
            Ok(ToolOutput::with_effect(
                &json!({
                    "status": "duplicate",
                    "reason": reason,
                    "confirmation_id": confirmation_id,
                }),
                ToolEffect::Duplicate {
                    confirmation_id: Some(confirmation_id),
                },
            ))
        }
    }
}
