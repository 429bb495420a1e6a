//! Concrete LLM provider adapters implementing `foreman_supervisor::ChatClient`.
//!
//! spec.md treats the LLM provider as an external collaborator reached
//! through `Chat(messages, tools) -> stream<StreamEvent>`; this crate is
//! the one adapter needed to actually boot the gateway against a real
//! endpoint. Grounded in the reference gateway's `crates/providers`
//! (`openai_compat.rs`, `sse.rs`, `auth.rs`), trimmed to the OpenAI-compatible
//! wire format that covers OpenAI, Azure OpenAI, and self-hosted servers
//! (Ollama, vLLM, LM Studio) that speak the same `/chat/completions` contract.

mod auth;
mod openai_compat;
mod registry;
mod sse;

pub use openai_compat::OpenAiCompatClient;
pub use registry::build_chat_client;
