use std::{error::Error, fmt, io, sync::Arc};

use crate::{
    communication::{Comm, CommunicationError},
    logger::Logger,
    node::{Blackboard, Controller, Worker, BLACKBOARD, CONTROLLER, FIRST_WORKER},
    task::{OutputManager, TaskFactory},
    Configuration, Rank, State, PRODUCT_SHORT_NAME,
};

/// The error raised by [`Job::run`].
#[derive(Debug)]
pub enum JobError {
    /// The transport could not be initialized or torn down.
    Communication(CommunicationError),
    /// The blackboard could not open its run log.
    LogFile(io::Error),
    /// The async runtime could not be built.
    Runtime(io::Error),
    /// The job was assembled incorrectly.
    Configuration(String),
    /// A role loop panicked.
    Internal(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Communication(err) => write!(f, "{}", err),
            JobError::LogFile(err) => write!(f, "could not open the run log: {}", err),
            JobError::Runtime(err) => write!(f, "could not build the runtime: {}", err),
            JobError::Configuration(msg) => write!(f, "{}", msg),
            JobError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for JobError {}

impl From<CommunicationError> for JobError {
    fn from(e: CommunicationError) -> Self {
        JobError::Communication(e)
    }
}

/// Hook points the controller rank fires around the task lifecycle.
///
/// All hooks default to no-ops; applications implement the ones they need.
pub trait JobHooks: Send {
    /// Fired once, before any task has been created.
    fn before_tasks_created(&mut self, _logger: &Logger) {}

    /// Fired when all tasks are created, right before `INITIALIZE_TASK` is
    /// broadcast.
    fn at_init_tasks(&mut self, _logger: &Logger) {}

    /// Fired when all tasks are initialized, right before `START_TASK` is
    /// broadcast.
    fn before_tasks_start(&mut self, _logger: &Logger) {}

    /// Fired between message handlings while tasks are running.
    fn while_active(&mut self, _logger: &Logger) {}

    /// Fired once all tasks have stopped.
    fn after_tasks(&mut self, _logger: &Logger) {}
}

/// Collective callbacks that run on every rank except the blackboard:
/// `before_any_task` immediately after transport init, `after_any_task`
/// immediately before transport finalize.
///
/// The blackboard is excluded because at these moments it is either not yet
/// live or already gone, and no log traffic can be emitted.
pub trait CollectiveHooks: Send {
    fn before_any_task(&mut self, _rank: Rank) {}
    fn after_any_task(&mut self, _rank: Rank) {}
}

/// The framework entry: one `Job` runs in every process of the fleet.
///
/// `Job` initializes the transport, validates the process count, dispatches
/// on the local rank into the controller, blackboard, or worker role, and
/// guarantees ordered teardown: the controller returns only once every
/// worker is stopped and the blackboard has confirmed its stop, and the
/// transport is finalized last on every rank.
///
/// ```ignore
/// let matches = foreman::new_app("my-app").get_matches();
/// let configuration = Configuration::from_args(&matches);
/// Job::new(configuration)
///     .with_task_factory(Arc::new(MyFactory))
///     .run()?;
/// ```
pub struct Job {
    configuration: Configuration,
    task_factory: Option<Arc<dyn TaskFactory>>,
    output_manager: Option<Box<dyn OutputManager>>,
    job_hooks: Option<Box<dyn JobHooks>>,
    collective_hooks: Option<Box<dyn CollectiveHooks>>,
}

impl Job {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            task_factory: None,
            output_manager: None,
            job_hooks: None,
            collective_hooks: None,
        }
    }

    /// Supplies the factory that fabricates the per-worker task adapters.
    /// Required on worker ranks.
    pub fn with_task_factory(mut self, factory: Arc<dyn TaskFactory>) -> Self {
        self.task_factory = Some(factory);
        self
    }

    /// Supplies the optional consumer of task results; used only on the
    /// blackboard rank.
    pub fn with_output_manager(mut self, manager: Box<dyn OutputManager>) -> Self {
        self.output_manager = Some(manager);
        self
    }

    /// Supplies the controller-side lifecycle hooks.
    pub fn with_job_hooks(mut self, hooks: Box<dyn JobHooks>) -> Self {
        self.job_hooks = Some(hooks);
        self
    }

    /// Supplies the collective callbacks run on every rank except the
    /// blackboard.
    pub fn with_collective_hooks(mut self, hooks: Box<dyn CollectiveHooks>) -> Self {
        self.collective_hooks = Some(hooks);
        self
    }

    /// Runs this rank's role to completion.
    ///
    /// Builds the runtime, establishes the transport mesh, runs the
    /// role-appropriate event loop, and finalizes the transport. Returns
    /// `Ok(())` for nominal completion, including the below-minimum
    /// process-count case, which is reported on the output stream of rank 0
    /// but is not an error exit.
    pub fn run(self) -> Result<(), JobError> {
        let index = self.configuration.index;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name(format!("foreman-rank-{}", index))
            .build()
            .map_err(JobError::Runtime)?;
        // The role loop runs as a spawned task so that adapter calls may use
        // blocking sections.
        let outcome = runtime.block_on(async move { tokio::spawn(self.execute()).await });
        match outcome {
            Ok(result) => result,
            Err(join_error) => Err(JobError::Internal(join_error.to_string())),
        }
    }

    async fn execute(mut self) -> Result<(), JobError> {
        if let Some(level) = self.configuration.logging_level {
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
        }

        let comm = Comm::connect(
            PRODUCT_SHORT_NAME,
            self.configuration.index,
            self.configuration.addresses.clone(),
        )
        .await?;
        let rank = comm.rank();

        if comm.size() < self.configuration.min_processes {
            if rank == CONTROLLER {
                println!(
                    "\n    You requested {} processes.\n    The minimum number of processes is {}\n",
                    comm.size(),
                    self.configuration.min_processes
                );
            }
            comm.finalize().await;
            return Ok(());
        }

        if rank != BLACKBOARD {
            if let Some(hooks) = self.collective_hooks.as_mut() {
                hooks.before_any_task(rank);
            }
        }

        let logger = Logger::new(comm.clone(), BLACKBOARD);
        match rank {
            CONTROLLER => {
                let num_tasks = comm.size() - FIRST_WORKER as usize;
                let mut controller = Controller::new(
                    comm.clone(),
                    logger,
                    self.configuration.args.clone(),
                    num_tasks,
                    self.job_hooks.take(),
                );
                // Assume the blackboard is (or shortly will be) available.
                controller.set_blackboard_state(State::Running);
                controller.activate().await;
            }
            BLACKBOARD => {
                let mut blackboard = match Blackboard::new(
                    comm.clone(),
                    CONTROLLER,
                    self.output_manager.take(),
                    &self.configuration.log_file_root,
                ) {
                    Ok(blackboard) => blackboard,
                    Err(e) => {
                        comm.finalize().await;
                        return Err(JobError::LogFile(e));
                    }
                };
                blackboard.activate().await;
            }
            _ => {
                let factory = match self.task_factory.take() {
                    Some(factory) => factory,
                    None => {
                        comm.finalize().await;
                        return Err(JobError::Configuration(
                            "a task factory is required on worker ranks".to_string(),
                        ));
                    }
                };
                let name = format!("Task {}", rank);
                let mut worker = Worker::new(
                    comm.clone(),
                    logger,
                    name,
                    CONTROLLER,
                    &factory,
                    self.configuration.args.clone(),
                );
                worker.activate().await;
            }
        }

        if rank != BLACKBOARD {
            if let Some(hooks) = self.collective_hooks.as_mut() {
                hooks.after_any_task(rank);
            }
        }
        comm.finalize().await;
        Ok(())
    }
}
