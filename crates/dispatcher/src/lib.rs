//! Worker Dispatcher: turns a `spawn_worker` request into a validated,
//! tracked `WorkerJob`, suspends the parent run, and drives the job to
//! a terminal outcome on a detached task so the caller never blocks
//! past the initial suspend.

pub mod dispatcher;
pub mod validator;

pub use dispatcher::{DispatchOutcome, DispatcherError, ResumeHandle, Summarizer, WorkerDispatcher};
pub use validator::{validate_command, ValidationError};
