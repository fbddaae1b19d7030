//! The three roles of a job and the framework entry that dispatches into
//! them.
//!
//! A job consists of `P >= 3` peer processes. Rank [`CONTROLLER`] owns the
//! global lifecycle, rank [`BLACKBOARD`] is the sink for log, error, and
//! result messages, and every rank from [`FIRST_WORKER`] up hosts one
//! application task. Each process constructs a [`Job`] and calls
//! [`Job::run`], which builds the role for the local rank and tears
//! everything down in order: workers, then the blackboard, then the
//! transport.

use crate::Rank;

// Private submodules
mod blackboard;
mod controller;
mod job;
mod run_log;
mod tracker;
mod worker;

// Crate-wide visible imports
pub(crate) use blackboard::Blackboard;
pub(crate) use controller::Controller;
pub(crate) use worker::Worker;

// Public exports
pub use job::{CollectiveHooks, Job, JobError, JobHooks};
pub use run_log::RunLog;
pub use tracker::Tracker;

/// The rank of the controller process.
pub const CONTROLLER: Rank = 0;
/// The rank of the blackboard process.
pub const BLACKBOARD: Rank = 1;
/// The rank of the first work task; all higher ranks are workers too.
pub const FIRST_WORKER: Rank = 2;
/// Sentinel for a rank that has not been assigned yet.
pub const INVALID_RANK: Rank = -1;
