//! The application-facing task contract.
//!
//! A [`TaskAdapter`] is the unit of application work hosted by a worker rank.
//! The framework drives it through the five-operation lifecycle in response
//! to controller commands; each operation returns the [`State`] the task is
//! in afterwards. A [`TaskFactory`] fabricates one adapter per worker from a
//! [`TaskContext`], which carries everything an adapter may need at runtime:
//! its identity, its argument vector, and handles for logging and shipping
//! results to the blackboard.

use std::{error::Error, fmt, sync::Arc};

use bytes::Bytes;

use crate::{
    communication::{Comm, MsgTag},
    logger::Logger,
    node::{BLACKBOARD, CONTROLLER},
    Rank, State,
};

/// An error reported by application task code.
#[derive(Debug)]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for TaskError {}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// The outcome of a task operation: the new task state, or an error the
/// worker turns into [`State::Error`] (or a forced [`State::Terminated`]
/// when stopping).
pub type TaskResult = Result<State, TaskError>;

/// The five-operation lifecycle contract an application task implements.
///
/// `start` may block for as long as the work takes; a batch task usually
/// returns [`State::Completed`] from it, while a long-running task returns
/// [`State::Running`] and finishes later in response to a stop request.
pub trait TaskAdapter: Send {
    /// Performs any per-task setup. Usually returns [`State::Initialized`].
    fn initialize(&mut self) -> TaskResult;

    /// Performs the work.
    fn start(&mut self) -> TaskResult;

    /// Tears the task down. Should return a terminal state; if it does not,
    /// the worker discards the adapter and reports [`State::Terminated`].
    fn stop(&mut self) -> TaskResult;

    /// Cooperative pause point; may be a no-op.
    fn pause(&mut self) -> TaskResult {
        Ok(State::Paused)
    }

    /// Cooperative resume point; may be a no-op.
    fn resume(&mut self) -> TaskResult {
        Ok(State::Running)
    }
}

/// Fabricates the per-worker [`TaskAdapter`].
pub trait TaskFactory: Send + Sync {
    fn create(&self, context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError>;
}

/// Consumes result payloads on the blackboard rank.
///
/// The blackboard receives each `TASK_RESULTS` message and hands the payload
/// over together with the rank that produced it. The manager is mutated only
/// on the blackboard rank.
pub trait OutputManager: Send {
    fn write(&mut self, source: Rank, payload: &[u8]);
}

/// Everything an adapter may need at runtime.
///
/// The argument vector is a copy of the configuration the job was launched
/// with, as though the task were run from the command line itself.
pub struct TaskContext {
    rank: Rank,
    task_id: usize,
    name: String,
    args: Vec<String>,
    logger: Logger,
    comm: Arc<Comm>,
}

impl TaskContext {
    pub(crate) fn new(
        rank: Rank,
        task_id: usize,
        name: String,
        args: Vec<String>,
        logger: Logger,
        comm: Arc<Comm>,
    ) -> Self {
        Self {
            rank,
            task_id,
            name,
            args,
            logger,
            comm,
        }
    }

    /// The rank of the worker hosting this task.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The 1-based tracker index of this task.
    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command-line argument vector, program name dropped.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Writes an informational line, tagged with this task's id, to the run
    /// log.
    pub fn log(&self, msg: &str) {
        self.logger.message_for_task(msg, self.task_id);
    }

    /// Writes a warning line, tagged with this task's id, to the run log.
    pub fn log_warning(&self, msg: &str) {
        self.logger.warning_for_task(msg, self.task_id);
    }

    /// Writes an error line, tagged with this task's id, to the run log.
    pub fn log_error(&self, msg: &str) {
        self.logger.error_for_task(msg, self.task_id);
    }

    /// Ships a result payload to the blackboard's output manager.
    pub fn send_results(&self, payload: &str) {
        let bytes = Bytes::from(payload.as_bytes().to_vec());
        if let Err(e) = self.comm.isend(BLACKBOARD, MsgTag::TaskResults, bytes) {
            tracing::warn!(
                "rank {}: could not post task results to the blackboard: {}",
                self.rank,
                e
            );
        }
    }

    /// Asks the controller to stop the whole job.
    pub fn request_stop(&self) {
        let payload = Bytes::from_static(&[0u8]);
        if let Err(e) = self.comm.isend(CONTROLLER, MsgTag::RequestStop, payload) {
            tracing::warn!(
                "rank {}: could not post a stop request to the controller: {}",
                self.rank,
                e
            );
        }
    }
}
