//! `foreman-runner-sdk` — Reusable SDK for building Foreman runners.
//!
//! A runner is any process that connects to the Foreman gateway over
//! WebSocket, advertises the capabilities it can execute jobs for, and
//! runs whatever command the gateway dispatches to it. This crate
//! provides the building blocks so runner authors don't need to
//! re-implement connection management, authentication, heartbeat, or
//! the job dispatch loop themselves.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your runner (bare-metal box, container, CI agent, ...)   │
//! │                                                           │
//! │   struct MyExecutor;                                      │
//! │   impl CommandExecutor for MyExecutor { ... }              │
//! │                                                           │
//! │   RunnerClientBuilder::new()                              │
//! │       .gateway_ws_url("ws://gw:3210/v1/runners/ws")        │
//! │       .runner_id("mac-studio")                            │
//! │       .token("secret")                                    │
//! │       .capability(Capability::ExecReadonly)                │
//! │       .build()?                                           │
//! │       .run(MyExecutor, shutdown)                          │
//! │       .await;                                             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the SDK)
//!
//! 1. Connect WS to the gateway's runner endpoint.
//! 2. Send `Hello { runner_id, token, capabilities, version }`.
//! 3. Wait for `Welcome { gateway_version, heartbeat_interval_secs }`.
//! 4. Main loop:
//!    - On `JobRequest`: run it through the [`CommandExecutor`], always
//!      reply with `JobResult` or `JobError`.
//!    - On `Heartbeat`: reply with `HeartbeatAck`.
//!    - Emit periodic `Heartbeat` frames of our own.
//! 5. On disconnect: reconnect with jittered exponential back-off.

pub mod builder;
pub mod client;
pub mod executor;
pub mod reconnect;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::RunnerClientBuilder;
pub use client::RunnerClient;
pub use executor::{CommandExecutor, ShellExecutor};
pub use reconnect::ReconnectBackoff;
pub use types::{ExecOutcome, RunnerSdkError};

// Re-export the wire frame so runner authors never need to depend on
// foreman-transport directly just to match on RunnerFrame variants.
pub use foreman_transport::RunnerFrame;
