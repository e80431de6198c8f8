//! Agent module - Turn orchestration for NutriChat
//!
//! This module turns one user message into a model reply plus the tool calls
//! it triggered. The agent is responsible for:
//!
//! - Resolving the user's daily thread
//! - Loading cached context and the thread's staged proposal
//! - Selecting the tools sent to the model from detected intents
//! - Building the system prompt, including commit and photo directives
//! - Running the model/tool loop and enforcing the commit guard
//! - Persisting onboarding answers from extraction markers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │   UI / CLI  │────>│ TurnOrchestrator │────>│ LLMProvider │
//! │             │     │                  │     │             │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//!                        │      │      │              │
//!                        ▼      ▼      ▼              ▼
//!              ┌─────────┐ ┌────────┐ ┌─────────┐ ┌──────────────┐
//!              │ Threads │ │ Cache  │ │ Pending │ │ToolDispatcher│
//!              └─────────┘ └────────┘ └─────────┘ └──────────────┘
//! ```

pub mod instructions;
pub mod onboarding;
mod orchestrator;

pub use instructions::{InstructionBuilder, PromptContext, TurnState};
pub use onboarding::{OnboardingOutcome, OnboardingRecorder, OnboardingReport};
pub use orchestrator::{TurnOrchestrator, TurnOutcome, TurnResponse, TurnStage};
