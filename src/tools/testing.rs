//! Shared fixtures for tool tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use super::commit::Committer;
use super::duplicate::DuplicateGuard;
use super::types::ToolContext;
use crate::cache::{ContextCache, StoreRebuilder};
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::confirmations::ConfirmationStore;
use crate::error::{NutriError, Result};
use crate::providers::{EmbeddingProvider, SimilarRecord, VisionProvider, VisionResult};
use crate::store::MemoryStore;

/// Store, clock and services wired the way the orchestrator wires them.
/// The clock starts at 2026-03-01 15:00 UTC; users default to offset 0.
pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub confirmations: Arc<ConfirmationStore>,
    pub committer: Arc<Committer>,
    pub cache: Arc<ContextCache>,
}

impl Harness {
    pub fn new() -> Self {
        let config = Config::default();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
        ));
        let guard = Arc::new(DuplicateGuard::new(
            config.duplicate_window(),
            config.confirmations.duplicate_max_entries,
            clock.clone(),
        ));
        let rebuilder = Arc::new(StoreRebuilder::new(store.clone(), clock.clone(), 0));
        Self {
            confirmations: Arc::new(ConfirmationStore::new(store.clone(), clock.clone())),
            committer: Arc::new(Committer::new(
                store.clone(),
                guard,
                config.confirmations.calorie_rounding,
            )),
            cache: Arc::new(ContextCache::new(store.clone(), clock.clone(), rebuilder, &config)),
            store,
            clock,
        }
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        self.clock.now().fixed_offset()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    /// Context for user `u1` on thread `t1`.
    pub fn ctx(&self, tool_call_id: &str) -> ToolContext {
        ToolContext::new("u1", "t1", self.local_now()).with_tool_call_id(tool_call_id)
    }
}

pub(crate) struct StaticVision {
    result: VisionResult,
}

impl StaticVision {
    pub fn new(result: VisionResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl VisionProvider for StaticVision {
    async fn analyze(&self, _image_ref: &str, _context_hint: Option<&str>) -> Result<VisionResult> {
        Ok(self.result.clone())
    }
}

pub(crate) struct StaticEmbeddings {
    hits: Vec<SimilarRecord>,
    fail: bool,
}

impl StaticEmbeddings {
    pub fn new(hits: Vec<SimilarRecord>) -> Self {
        Self { hits, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(NutriError::Embedding("index offline".into()));
        }
        Ok(vec![0.1, 0.2, 0.3])
    }

    async fn search_similar(&self, _vector: &[f32], _limit: usize) -> Result<Vec<SimilarRecord>> {
        Ok(self.hits.clone())
    }
}
