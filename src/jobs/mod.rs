//! Background-job runner.
//!
//! # Data Flow
//! ```text
//! enqueue(job)            ──▶ Enqueued ─┐
//! schedule(job, delay)    ──▶ Scheduled ┤ (after delay)
//!                                       ▼
//!                         worker permit (semaphore, `jobs.workers`)
//!                                       ▼
//!                                  Processing
//!                             ┌─────────┴─────────┐
//!                          success              error / panic
//!                             ▼                    ▼
//!                         Succeeded   attempts left? ─yes─▶ Scheduled (backoff)
//!                                          │no
//!                                          ▼
//!                                        Failed
//!
//! recurring(id, interval) ── tick ──▶ lock `recurring-job:{id}` ──▶ enqueue
//!                                       └─ held elsewhere ──▶ skip tick
//! ```
//!
//! # Design Decisions
//! - State lives in process memory; recurring schedules are re-registered at
//!   startup
//! - The distributed lock makes a recurring tick run once across the fleet
//! - Jobs stop being picked up once shutdown is signalled

pub mod dashboard;
pub mod job;
pub mod runner;

pub use job::{FnJob, Job, JobContext};
pub use runner::{JobError, JobRecord, JobRunner, JobState, JobStats, RecurringJobInfo};
