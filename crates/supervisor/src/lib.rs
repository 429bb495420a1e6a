//! Supervisor Engine: the durable ReAct loop that turns a thread plus a
//! run row into LLM calls, local tool dispatch, and `spawn_worker`
//! suspension, grounded in the reference gateway's `runtime` module.

pub mod cancel;
pub mod chat;
pub mod compaction;
pub mod engine;
pub mod evidence;
pub mod message;
pub mod tools;

pub use cancel::{CancelRegistry, CancelToken};
pub use chat::{ChatClient, ChatError, ChatRequest};
pub use engine::{StepOutcome, SupervisorEngine};
pub use tools::{LocalTool, ToolRegistry};
