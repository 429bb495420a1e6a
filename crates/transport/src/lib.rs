//! Wire protocol and connection registry for runner WebSocket sessions.
//!
//! Runners are user-owned remote executors that dial in over a
//! WebSocket, authenticate with a device token, and accept job
//! requests from the dispatcher.

pub mod auth;
pub mod dispatch;
pub mod frame;
pub mod manager;

pub use auth::token_eq;
pub use dispatch::{Dispatch, DispatchError, JobOutcome, PendingDispatch};
pub use frame::{RunnerFrame, MAX_FRAME_BYTES};
pub use manager::{Connection, ConnectionKey, ConnectionManager, RunnerSink};
