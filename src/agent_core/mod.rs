//! Agent Core: session state, tools, and the per-turn tool handshake.
//!
//! Submodules:
//! - `session`: Selected model, conversation, and the single active stream
//! - `turn`: Turn state machine (model response → tool → follow-up)
//! - `tool_registry`: Tool specs and the immutable registry
//! - `tool_dispatcher`: Resolves and executes tool invocations
//! - `tools`: Built-in tools
//! - `history`: Saved chat sessions on disk
//! - `errors`: Agent-level error types

pub mod errors;
pub mod history;
pub mod session;
pub mod tool_dispatcher;
pub mod tool_registry;
pub mod tools;
pub mod turn;

// Re-exports for convenience
pub use errors::AgentError;
pub use history::{ChatHistory, ChatSummary, SavedChat};
pub use session::{SessionContext, StreamLease};
pub use tool_dispatcher::{ToolDispatcher, ToolExecution};
pub use tool_registry::{ParamSpec, ParamType, Tool, ToolOutput, ToolRegistry, ToolSpec};
pub use turn::{begin_turn, run_turn, ClaimedTurn, TurnEvent, TurnEvents, TurnOutcome, TurnState};
