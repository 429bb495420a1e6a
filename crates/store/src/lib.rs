//! Durable persistence for threads, runs, worker jobs and the queue.
//!
//! Every store type wraps a [`pool::Pool`] and exposes dialect-agnostic
//! methods; the SQL text itself branches per dialect inline rather than
//! behind a trait, since the two dialects diverge in ways (claim
//! semantics, `RETURNING`, JSON column types) that are easier to read
//! side by side than hidden behind an abstraction.

pub mod event_store;
pub mod jobs;
pub mod pool;
pub mod queue;
pub mod rows;
pub mod runners;
pub mod runs;

pub use event_store::EventStore;
pub use jobs::JobStore;
pub use pool::Pool;
pub use queue::QueueStore;
pub use runners::RunnerStore;
pub use runs::RunStore;
