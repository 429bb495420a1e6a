//! Foreman gateway — the HTTP/WebSocket surface wired on top of the
//! orchestration core (`foreman-supervisor`, `foreman-dispatcher`,
//! `foreman-transport`, `foreman-stream`, `foreman-queue`).
//!
//! This crate is intentionally thin per the core's design: it resolves
//! config, assembles `AppState`, and exposes the routes listed in the
//! external interface contract. All consistency and concurrency
//! decisions live in the crates it wires together.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
