//! Thread store
//!
//! Maps `(user, calendar day)` to a conversation thread. The first message of
//! a local day lazily creates a thread through the LLM capability; later
//! messages that day continue it. An explicit "new chat" creates another
//! thread for the same day without touching the old one, and daily lookups
//! then prefer the most recently created row.
//!
//! Thread rows live in the `threads` collection indexed by
//! `(user_id, YYYY-MM-DD)`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheEvent, ContextCache};
use crate::clock::{local_date, Clock};
use crate::domain::ThreadContext;
use crate::error::{NutriError, Result};
use crate::providers::LLMProvider;
use crate::store::{collections, records, Document, Store, WriteBatch};
use crate::utils::locks::{keyed_lock, LockMap};

/// A persisted thread mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    pub user_id: String,
    pub created_date: NaiveDate,
    pub message_count: u64,
    pub last_message_at: DateTime<Utc>,
}

impl Thread {
    pub fn context(&self) -> ThreadContext {
        ThreadContext {
            thread_id: self.thread_id.clone(),
            created_date: self.created_date,
            message_count: self.message_count,
            is_new: self.message_count <= 1,
        }
    }
}

/// Result of [`ThreadStore::get_or_create_daily_thread`].
#[derive(Debug, Clone, PartialEq)]
pub struct DailyThread {
    pub thread: Thread,
    pub is_new: bool,
}

impl DailyThread {
    pub fn thread_id(&self) -> &str {
        &self.thread.thread_id
    }
}

/// The row daily lookups resolve to: the most recently created one for the date.
async fn current_row(
    store: &dyn Store,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<(Document, Thread)>> {
    let docs = store
        .query(collections::THREADS, user_id, Some(&records::date_key(date)))
        .await?;
    match docs.into_iter().max_by_key(|d| d.seq) {
        Some(doc) => {
            let thread = doc.decode()?;
            Ok(Some((doc, thread)))
        }
        None => Ok(None),
    }
}

/// The current thread for `(user_id, date)`, without side effects.
pub async fn current_thread(
    store: &dyn Store,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<Thread>> {
    Ok(current_row(store, user_id, date).await?.map(|(_, t)| t))
}

pub struct ThreadStore {
    store: Arc<dyn Store>,
    llm: Arc<dyn LLMProvider>,
    clock: Arc<dyn Clock>,
    default_offset_minutes: i32,
    /// Per-user creation locks so concurrent first messages make one thread
    creation_locks: Mutex<LockMap>,
}

impl ThreadStore {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LLMProvider>,
        clock: Arc<dyn Clock>,
        default_offset_minutes: i32,
    ) -> Self {
        Self {
            store,
            llm,
            clock,
            default_offset_minutes,
            creation_locks: Mutex::new(LockMap::new()),
        }
    }

    /// The user's current local calendar date.
    pub async fn today_for(&self, user_id: &str) -> Result<NaiveDate> {
        let profile = records::load_profile(self.store.as_ref(), user_id).await?;
        let offset = records::user_offset(&profile, self.default_offset_minutes);
        Ok(local_date(self.clock.now(), offset))
    }

    /// Continue today's thread or create it, counting the incoming message.
    pub async fn get_or_create_daily_thread(&self, user_id: &str) -> Result<DailyThread> {
        let today = self.today_for(user_id).await?;
        self.get_or_create_thread_for_date(user_id, today).await
    }

    /// Continue or create the thread for an explicit local date.
    pub async fn get_or_create_thread_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyThread> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        if let Some((doc, mut thread)) = current_row(self.store.as_ref(), user_id, date).await? {
            thread.message_count += 1;
            thread.last_message_at = now;
            self.store
                .patch(
                    collections::THREADS,
                    &doc.id,
                    json!({
                        "message_count": thread.message_count,
                        "last_message_at": thread.last_message_at,
                    }),
                )
                .await?;
            debug!(user_id = %user_id, thread_id = %thread.thread_id, "Continuing daily thread");
            return Ok(DailyThread {
                thread,
                is_new: false,
            });
        }

        let thread = self.create_row(user_id, date, 1).await?;
        info!(user_id = %user_id, thread_id = %thread.thread_id, date = %date, "Created daily thread");
        Ok(DailyThread {
            thread,
            is_new: true,
        })
    }

    /// Start a fresh thread for today. The previous thread stays queryable.
    pub async fn start_new_thread(&self, user_id: &str) -> Result<Thread> {
        let today = self.today_for(user_id).await?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let thread = self.create_row(user_id, today, 0).await?;
        info!(user_id = %user_id, thread_id = %thread.thread_id, "Started new thread");
        Ok(thread)
    }

    /// Every thread row of the user, oldest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Thread>> {
        self.store
            .query(collections::THREADS, user_id, None)
            .await?
            .iter()
            .map(Document::decode)
            .collect()
    }

    async fn create_row(&self, user_id: &str, date: NaiveDate, message_count: u64) -> Result<Thread> {
        let thread_id = self.llm.create_thread(user_id).await?;
        if thread_id.trim().is_empty() {
            return Err(NutriError::Provider("create_thread returned an empty id".into()));
        }
        let thread = Thread {
            thread_id,
            user_id: user_id.to_string(),
            created_date: date,
            message_count,
            last_message_at: self.clock.now(),
        };
        let batch = WriteBatch::new()
            .insert(
                collections::THREADS,
                user_id,
                &records::date_key(date),
                serde_json::to_value(&thread)?,
            )
            .extend(ContextCache::invalidation_batch(
                user_id,
                &[CacheEvent::ThreadStarted],
            ));
        self.store.apply(batch).await?;
        Ok(thread)
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock().await;
        keyed_lock(&mut locks, user_id)
    }
}
