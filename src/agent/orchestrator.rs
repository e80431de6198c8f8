//! Turn orchestrator
//!
//! The single entry point for a chat turn. One turn moves through
//!
//! ```text
//! received -> thread_resolved -> context_loaded -> tools_selected
//!          -> instructions_built -> model_invoked -> tools_dispatched
//!          -> response_finalized
//! ```
//!
//! Turns on the same thread are serialized by a per-thread lock; turns on
//! different threads run in parallel. A failure at any stage ends the turn
//! with a friendly fallback message. Commits are single store batches, so a
//! failed turn never leaves a ledger row without its confirmation resolved.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::instructions::{InstructionBuilder, PromptContext, TurnState};
use super::onboarding::{strip_markers, OnboardingRecorder};
use crate::cache::{CacheEvent, ContextCache, StoreRebuilder};
use crate::clock::Clock;
use crate::config::Config;
use crate::confirmations::{ConfirmationStore, PendingConfirmation};
use crate::error::{NutriError, Result, FALLBACK_DUPLICATE, FALLBACK_LOGGING, FALLBACK_RETRY};
use crate::intent::{
    format_intents, select_tools, Classifier, Intent, IntentSet, RegexClassifier, ToolSelection,
};
use crate::providers::{
    EmbeddingProvider, GenerateOptions, GenerateRequest, LLMProvider, ToolDefinition,
    VisionProvider,
};
use crate::store::{records, Store};
use crate::threads::ThreadStore;
use crate::tools::{
    default_registry, CommitOutcome, Committer, DispatchOutcome, DuplicateGuard, ExecutedToolCall,
    ToolContext, ToolDispatcher, ToolServices,
};
use crate::utils::locks::{keyed_lock, LockMap};

/// Reply used when a commit succeeded but the model said nothing.
const LOGGED_REPLY: &str = "Done, that's in your log.";

/// Reply used when a proposal was staged but the model said nothing.
const PROPOSED_REPLY: &str = "Here's what I've got. Should I log it?";

/// Stages of a turn, logged at debug level as the turn advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Received,
    ThreadResolved,
    ContextLoaded,
    ToolsSelected,
    InstructionsBuilt,
    ModelInvoked,
    ToolsDispatched,
    ResponseFinalized,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Received => "received",
            TurnStage::ThreadResolved => "thread_resolved",
            TurnStage::ContextLoaded => "context_loaded",
            TurnStage::ToolsSelected => "tools_selected",
            TurnStage::InstructionsBuilt => "instructions_built",
            TurnStage::ModelInvoked => "model_invoked",
            TurnStage::ToolsDispatched => "tools_dispatched",
            TurnStage::ResponseFinalized => "response_finalized",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Plain reply, nothing staged or written
    Replied,
    /// A proposal is waiting for the user
    AwaitingConfirmation { confirmation_id: String },
    /// The ledger was written
    Logged,
    /// A commit was skipped as a repeat
    Duplicate,
    /// The user confirmed but the model did not commit; the reply was replaced
    ConfirmationWithoutCommit,
    /// A commit tool failed; the proposal is still pending
    CommitFailed,
    /// The turn failed; the reply is a fallback
    Failed,
}

/// Result of [`TurnOrchestrator::send_turn`].
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub text: String,
    pub tool_calls: Vec<ExecutedToolCall>,
    /// Absent only when the turn failed before a thread was resolved
    pub thread_id: Option<String>,
    pub outcome: TurnOutcome,
}

impl TurnResponse {
    fn failed(thread_id: Option<String>, e: &NutriError) -> Self {
        Self {
            text: e.user_message().to_string(),
            tool_calls: Vec::new(),
            thread_id,
            outcome: TurnOutcome::Failed,
        }
    }
}

/// Tracks where a turn is, for logs and for the failure path.
struct TurnProgress {
    stage: TurnStage,
    thread_id: Option<String>,
}

impl TurnProgress {
    fn new() -> Self {
        Self {
            stage: TurnStage::Received,
            thread_id: None,
        }
    }

    fn enter(&mut self, stage: TurnStage) {
        self.stage = stage;
        debug!(stage = %stage, "Turn stage");
    }
}

/// The orchestration core.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use nutrichat::agent::TurnOrchestrator;
/// use nutrichat::clock::SystemClock;
/// use nutrichat::config::Config;
/// use nutrichat::store::MemoryStore;
///
/// let orchestrator = TurnOrchestrator::new(
///     Config::default(),
///     Arc::new(MemoryStore::new()),
///     llm,
///     vision,
///     embeddings,
///     Arc::new(SystemClock),
/// );
/// let reply = orchestrator.send_turn("user-1", "I had a banana", None).await?;
/// println!("{}", reply.text);
/// ```
pub struct TurnOrchestrator {
    config: Config,
    store: Arc<dyn Store>,
    llm: Arc<dyn LLMProvider>,
    clock: Arc<dyn Clock>,
    cache: Arc<ContextCache>,
    threads: Arc<ThreadStore>,
    confirmations: Arc<ConfirmationStore>,
    committer: Arc<Committer>,
    dispatcher: ToolDispatcher,
    classifier: Arc<dyn Classifier>,
    instructions: InstructionBuilder,
    onboarding: OnboardingRecorder,
    /// Per-thread locks so turns on one thread never interleave
    thread_locks: Mutex<LockMap>,
}

impl TurnOrchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        llm: Arc<dyn LLMProvider>,
        vision: Arc<dyn VisionProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let offset = config.agent.default_utc_offset_minutes;
        let rebuilder = Arc::new(StoreRebuilder::new(store.clone(), clock.clone(), offset));
        let cache = Arc::new(ContextCache::new(
            store.clone(),
            clock.clone(),
            rebuilder,
            &config,
        ));
        let guard = Arc::new(DuplicateGuard::new(
            config.duplicate_window(),
            config.confirmations.duplicate_max_entries,
            clock.clone(),
        ));
        let confirmations = Arc::new(ConfirmationStore::new(store.clone(), clock.clone()));
        let committer = Arc::new(Committer::new(
            store.clone(),
            guard,
            config.confirmations.calorie_rounding,
        ));
        let services = ToolServices {
            store: store.clone(),
            cache: cache.clone(),
            confirmations: confirmations.clone(),
            committer: committer.clone(),
            vision,
            embeddings,
        };
        let dispatcher = ToolDispatcher::new(Arc::new(default_registry(&services)));
        let threads = Arc::new(ThreadStore::new(
            store.clone(),
            llm.clone(),
            clock.clone(),
            offset,
        ));

        Self {
            onboarding: OnboardingRecorder::new(store.clone()),
            config,
            store,
            llm,
            clock,
            cache,
            threads,
            confirmations,
            committer,
            dispatcher,
            classifier: Arc::new(RegexClassifier::new()),
            instructions: InstructionBuilder::new(),
            thread_locks: Mutex::new(LockMap::new()),
        }
    }

    /// Replace the intent classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the instruction builder.
    pub fn with_instructions(mut self, builder: InstructionBuilder) -> Self {
        self.instructions = builder;
        self
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Process one user message.
    ///
    /// Only a missing identity is returned as an error. Every other failure
    /// becomes a [`TurnOutcome::Failed`] response carrying a friendly message.
    pub async fn send_turn(
        &self,
        user_id: &str,
        message: &str,
        image_ref: Option<&str>,
    ) -> Result<TurnResponse> {
        let user_id = require_user(user_id)?;
        let image_ref = image_ref.map(str::trim).filter(|r| !r.is_empty());

        let span = info_span!(
            "turn",
            request_id = %Uuid::new_v4(),
            user_id = %user_id,
        );
        async move {
            let start = Instant::now();
            let mut progress = TurnProgress::new();
            match self.run_turn(user_id, message, image_ref, &mut progress).await {
                Ok(response) => {
                    info!(
                        thread_id = ?response.thread_id,
                        outcome = ?response.outcome,
                        tool_calls = response.tool_calls.len(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Turn completed"
                    );
                    Ok(response)
                }
                Err(e) => {
                    error!(
                        thread_id = ?progress.thread_id,
                        stage = %progress.stage,
                        error = %e,
                        retryable = e.is_retryable(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Turn failed"
                    );
                    Ok(TurnResponse::failed(progress.thread_id, &e))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_turn(
        &self,
        user_id: &str,
        message: &str,
        image_ref: Option<&str>,
        progress: &mut TurnProgress,
    ) -> Result<TurnResponse> {
        progress.enter(TurnStage::Received);

        let daily = self.threads.get_or_create_daily_thread(user_id).await?;
        let thread_id = daily.thread_id().to_string();
        progress.thread_id = Some(thread_id.clone());
        progress.enter(TurnStage::ThreadResolved);

        let lock = self.thread_lock(&thread_id).await;
        let _thread_guard = lock.lock().await;

        // Context
        let (profile, preferences, core_stats, today_food_log, weight_trend) = futures::try_join!(
            self.cache.profile(user_id),
            self.cache.preferences(user_id),
            self.cache.core_stats(user_id),
            self.cache.today_food_log(user_id),
            self.cache.weight_trend(user_id),
        )?;
        let pending = self.confirmations.get_latest_pending(&thread_id).await?;
        let offset = records::user_offset(&profile, self.config.agent.default_utc_offset_minutes);
        let local_now = self.clock.now().with_timezone(&offset);
        let onboarding_complete = profile.onboarding_complete();
        let mut thread_context = daily.thread.context();
        thread_context.is_new = daily.is_new;
        progress.enter(TurnStage::ContextLoaded);

        // Tool selection
        let mut intents = self.classifier.detect_intents(message);
        if image_ref.is_some() {
            intents.insert(Intent::Photo);
        }
        let selection = self.select(&intents, pending.is_some(), onboarding_complete);
        let tools = self.dispatcher.registry().definitions_for(&selection);
        info!(
            thread_id = %thread_id,
            intents = %format_intents(&intents),
            tools = tools.len(),
            has_pending = pending.is_some(),
            "Selected tools"
        );
        progress.enter(TurnStage::ToolsSelected);

        // Instructions
        let state = TurnState::new(intents, image_ref.is_some());
        let prompt_ctx = PromptContext {
            profile,
            preferences,
            core_stats: Some(core_stats),
            today_food_log: Some(today_food_log),
            weight_trend: Some(weight_trend),
            thread: Some(thread_context),
            local_now,
        };
        let system_prompt = self.instructions.build(&prompt_ctx, pending.as_ref(), &state);
        progress.enter(TurnStage::InstructionsBuilt);

        // Model and tools
        let tool_ctx = ToolContext::new(user_id, &thread_id, local_now)
            .with_message(message)
            .with_image(image_ref);
        let (text, executed) = self
            .run_tool_loop(&thread_id, system_prompt, message, tools, &tool_ctx, progress)
            .await?;

        // Onboarding markers
        let text = if onboarding_complete {
            strip_markers(&text)
        } else {
            self.onboarding.record(user_id, &text).await?.text
        };

        let (text, outcome) = finalize(
            &thread_id,
            text,
            &executed,
            state.is_confirmation(),
            pending.as_ref(),
        );
        progress.enter(TurnStage::ResponseFinalized);

        Ok(TurnResponse {
            text,
            tool_calls: executed,
            thread_id: Some(thread_id),
            outcome,
        })
    }

    fn select(&self, intents: &IntentSet, has_pending: bool, onboarded: bool) -> ToolSelection {
        if !self.config.agent.minimize_tools {
            return ToolSelection::full();
        }
        let mut selection = select_tools(intents, has_pending);
        if !onboarded {
            selection.needs_onboarding_tool = true;
        }
        selection
    }

    /// Call the model until it stops asking for tools, at most
    /// `max_tool_iterations` round-trips.
    async fn run_tool_loop(
        &self,
        thread_id: &str,
        system_prompt: String,
        message: &str,
        tools: Vec<ToolDefinition>,
        tool_ctx: &ToolContext,
        progress: &mut TurnProgress,
    ) -> Result<(String, Vec<ExecutedToolCall>)> {
        let agent = &self.config.agent;
        let mut request = GenerateRequest {
            thread_id: thread_id.to_string(),
            system_prompt,
            user_message: Some(message.to_string()),
            tools,
            tool_results: Vec::new(),
            options: GenerateOptions::new()
                .with_model(&agent.model)
                .with_max_tokens(agent.max_tokens)
                .with_temperature(agent.temperature),
        };

        let mut executed: Vec<ExecutedToolCall> = Vec::new();
        let mut staged = false;
        let mut text = String::new();

        for iteration in 1..=agent.max_tool_iterations.max(1) {
            let response = match self.llm.generate(request.clone()).await {
                Ok(response) => response,
                Err(e) if executed.iter().any(ExecutedToolCall::settles_turn) => {
                    // Tool results already decide the reply.
                    warn!(
                        thread_id = %thread_id,
                        iteration = iteration,
                        error = %e,
                        "Model failed after tool dispatch; finalizing with executed calls"
                    );
                    text = String::new();
                    break;
                }
                Err(e) => return Err(e),
            };
            progress.enter(TurnStage::ModelInvoked);
            text = response.text;
            if response.tool_calls.is_empty() {
                break;
            }

            debug!(
                iteration = iteration,
                calls = response.tool_calls.len(),
                "Dispatching tool calls"
            );
            let calls = self
                .dispatcher
                .dispatch(&response.tool_calls, tool_ctx, staged)
                .await?;
            progress.enter(TurnStage::ToolsDispatched);
            staged |= calls
                .iter()
                .any(|c| matches!(c.outcome, DispatchOutcome::Proposed { .. }));

            request.user_message = None;
            request.tool_results = calls.iter().map(|c| c.result.clone()).collect();
            executed.extend(calls);

            if iteration == agent.max_tool_iterations {
                warn!(
                    thread_id = %thread_id,
                    max_iterations = agent.max_tool_iterations,
                    "Tool loop hit the iteration limit"
                );
            }
        }
        Ok((text, executed))
    }

    // ========================================================================
    // Confirmation cards
    // ========================================================================

    /// The thread's staged proposal, for rendering a confirmation card.
    pub async fn get_pending_confirmation(
        &self,
        thread_id: &str,
    ) -> Result<Option<PendingConfirmation>> {
        self.confirmations.get_latest_pending(thread_id).await
    }

    /// Commit a staged proposal from the UI. Performs the same atomic commit
    /// as the log tools, using the stored payload.
    pub async fn confirm_pending(&self, confirmation_id: &str) -> Result<CommitOutcome> {
        let record = self.find_confirmation(confirmation_id).await?;
        let lock = self.thread_lock(&record.thread_id).await;
        let _thread_guard = lock.lock().await;

        let date = self.threads.today_for(&record.user_id).await?;
        let outcome = self.committer.commit(&record, date, self.clock.now()).await?;
        info!(
            confirmation_id = %confirmation_id,
            thread_id = %record.thread_id,
            outcome = ?outcome,
            "Confirmed from card"
        );
        Ok(outcome)
    }

    /// Reject a staged proposal from the UI. Resolved records are left as
    /// they are.
    pub async fn reject_pending(&self, confirmation_id: &str) -> Result<PendingConfirmation> {
        let record = self.find_confirmation(confirmation_id).await?;
        let lock = self.thread_lock(&record.thread_id).await;
        let _thread_guard = lock.lock().await;

        let rejected = self.confirmations.reject(confirmation_id).await?;
        info!(
            confirmation_id = %confirmation_id,
            status = rejected.status.as_str(),
            "Rejected from card"
        );
        Ok(rejected)
    }

    // ========================================================================
    // Other entry points
    // ========================================================================

    /// Evict cache entries for writes made outside the core.
    pub async fn invalidate(&self, user_id: &str, event: CacheEvent) -> Result<()> {
        let user_id = require_user(user_id)?;
        self.cache.invalidate(user_id, event).await
    }

    /// Start a fresh conversation for today and return its id.
    pub async fn start_new_thread(&self, user_id: &str) -> Result<String> {
        let user_id = require_user(user_id)?;
        Ok(self.threads.start_new_thread(user_id).await?.thread_id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn threads(&self) -> &Arc<ThreadStore> {
        &self.threads
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    async fn find_confirmation(&self, confirmation_id: &str) -> Result<PendingConfirmation> {
        self.confirmations
            .get(confirmation_id)
            .await?
            .ok_or_else(|| NutriError::NotFound(format!("confirmation {}", confirmation_id)))
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        keyed_lock(&mut locks, thread_id)
    }
}

fn require_user(user_id: &str) -> Result<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(NutriError::Authentication("missing user id".into()));
    }
    Ok(user_id)
}

/// Pick the reply text and outcome from what the tools did.
///
/// The model's text is replaced when it could claim something that did not
/// happen: a confirmation turn with a staged proposal and no commit attempt,
/// a failed commit, or a commit skipped as a duplicate.
fn finalize(
    thread_id: &str,
    text: String,
    executed: &[ExecutedToolCall],
    is_confirmation: bool,
    pending: Option<&PendingConfirmation>,
) -> (String, TurnOutcome) {
    let committed = executed.iter().any(ExecutedToolCall::committed);
    let duplicate = executed
        .iter()
        .any(|c| matches!(c.outcome, DispatchOutcome::Duplicate { .. }));
    let commit_attempted = executed.iter().any(|c| c.is_commit);
    let commit_failed = executed.iter().any(|c| c.is_commit && c.failed());
    let proposed = executed.iter().rev().find_map(|c| match &c.outcome {
        DispatchOutcome::Proposed { confirmation_id } => Some(confirmation_id.clone()),
        _ => None,
    });

    if committed {
        return (non_empty(text, LOGGED_REPLY), TurnOutcome::Logged);
    }
    if duplicate {
        return (FALLBACK_DUPLICATE.to_string(), TurnOutcome::Duplicate);
    }
    if is_confirmation && !commit_attempted && proposed.is_none() {
        if let Some(record) = pending {
            warn!(
                thread_id = %thread_id,
                confirmation_id = %record.id,
                "Confirmation without commit; replacing model reply"
            );
            return (FALLBACK_LOGGING.to_string(), TurnOutcome::ConfirmationWithoutCommit);
        }
    }
    if commit_failed && proposed.is_none() {
        return (FALLBACK_LOGGING.to_string(), TurnOutcome::CommitFailed);
    }
    match proposed {
        Some(confirmation_id) => (
            non_empty(text, PROPOSED_REPLY),
            TurnOutcome::AwaitingConfirmation { confirmation_id },
        ),
        None => (non_empty(text, FALLBACK_RETRY), TurnOutcome::Replied),
    }
}

fn non_empty(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}
