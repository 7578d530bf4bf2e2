//! Periodic maintenance for Chorus.
//!
//! This crate provides:
//! - the `JobHandler` trait and the error type jobs report
//! - a scheduler that runs each job on its own interval, isolating failures
//! - the built-in cleanup jobs: empty-group purge, idle-session sweep,
//!   session-mirror reconciliation and diagnostics

pub mod executor;
pub mod jobs;
pub mod scheduler;

pub use executor::{JobExecutionError, JobHandler};
pub use scheduler::WorkerScheduler;
