//! Job Queue: a durable claim–heartbeat–reschedule queue for scheduled
//! recurring work, plus the cron evaluator and missed-window policy
//! that decide which fires become `queue_items` in the first place.
//!
//! Grounded in the reference gateway's `runtime/schedule_runner.rs`
//! (missed-window math, concurrency guard) and `runtime/schedules/
//! cron.rs` (the timezone-aware cron evaluator), generalized onto
//! `foreman-store`'s dialect-agnostic claim/heartbeat/reclaim storage
//! primitives (`foreman_store::QueueStore`).

pub mod backfill;
pub mod cron;
pub mod scheduler;
pub mod worker;

pub use scheduler::{JobSchedule, Scheduler};
pub use worker::{JobHandler, QueueWorker};
