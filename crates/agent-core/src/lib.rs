//! Agent core: decides the next browser action and drives the observe-think-act loop.
//!
//! Decisions come from a pluggable [`DecisionProvider`]: the ordered [`RuleTable`], an
//! OpenAI-compatible model via [`LlmDecisionProvider`], or both behind
//! [`FallbackDecisionProvider`]. The [`DecisionLoop`] executes them through the action
//! executor and stops on completion, loops, or its iteration and failure ceilings.

pub mod agent_loop;
pub mod artifacts;
pub mod errors;
pub mod ledger;
pub mod llm_provider;
pub mod model;
pub mod planner;

pub use agent_loop::{
    ActionRunner, DecisionLoop, DecisionLoopConfig, LoopOutcome, LoopPhase, LoopStatus,
    PageObserver,
};
pub use artifacts::{Artifact, ArtifactSink, MemoryArtifactSink, NullArtifactSink};
pub use errors::{AgentError, ErrorKind};
pub use ledger::ActionSignatureLedger;
pub use llm_provider::{
    extract_json_object, parse_decision, ChatModel, LlmConfig, LlmDecisionProvider,
    OpenAiChatModel,
};
pub use model::{Decision, DecisionSource, GoalContext, HistoryEntry};
pub use planner::{
    chat_reply, classify, ChatKind, DecisionProvider, FallbackDecisionProvider, Rule, RuleTable,
};
