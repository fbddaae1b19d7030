//! Foreman is a controller-task-blackboard coordination framework for
//! fleets of cooperating processes connected by a tagged message-passing
//! transport.
//!
//! A job consists of `P >= 3` peer processes, each holding a unique integer
//! *rank*. Rank 0 hosts the **controller**, which owns the global lifecycle:
//! it waits for every task to report created, broadcasts initialize and
//! start commands, tracks the per-task state machine, and finally performs
//! the ordered shutdown of workers, blackboard, and transport. Rank 1 hosts
//! the **blackboard**, an asynchronous sink that serializes log, error, and
//! result messages onto the run log file and an optional
//! [`OutputManager`](crate::OutputManager). Every rank from 2 up is a
//! **worker** hosting one application [`TaskAdapter`](crate::TaskAdapter).
//!
//! ## Example
//! Application code plugs in by supplying a task factory; the same binary
//! runs on every rank and the framework dispatches on the rank index.
//!
//! ```ignore
//! struct SleepTask;
//!
//! impl TaskAdapter for SleepTask {
//!     fn initialize(&mut self) -> TaskResult {
//!         Ok(State::Initialized)
//!     }
//!     fn start(&mut self) -> TaskResult {
//!         // ... the application's work ...
//!         Ok(State::Completed)
//!     }
//!     fn stop(&mut self) -> TaskResult {
//!         Ok(State::Terminated)
//!     }
//! }
//!
//! struct SleepFactory;
//!
//! impl TaskFactory for SleepFactory {
//!     fn create(&self, _context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError> {
//!         Ok(Box::new(SleepTask))
//!     }
//! }
//!
//! fn main() -> Result<(), JobError> {
//!     let matches = foreman::new_app("sleepy").get_matches();
//!     let configuration = Configuration::from_args(&matches);
//!     Job::new(configuration)
//!         .with_task_factory(Arc::new(SleepFactory))
//!         .run()
//! }
//! ```
//!
//! ## Messages
//! All coordination happens through tagged messages; the closed tag set and
//! the payload shape per tag live in [`communication`]. Between any two
//! ranks, messages are delivered in send order; there is no ordering across
//! senders. The only strictly ordered exchange is the blackboard shutdown
//! handshake: the controller's `STOP_BLACKBOARD` is answered by exactly one
//! `CONFIRMATION` before the controller returns.
//!
//! ## Roles and ownership
//! The controller exclusively owns the job configuration, the state
//! [`Tracker`](crate::node::Tracker), and the job timer. The blackboard
//! exclusively owns the run log file; every other rank mutates the log only
//! by sending a log message through [`Logger`](crate::Logger). Each worker
//! exclusively owns its adapter.

// Private submodules
mod configuration;
mod logger;
mod state;
mod task;

// Public submodules
pub mod communication;
pub mod node;
pub mod timing;
pub mod util;

// Public exports
pub use configuration::{fetch_cmdline_args, Configuration};
pub use logger::Logger;
pub use node::{CollectiveHooks, Job, JobError, JobHooks};
pub use state::State;
pub use task::{OutputManager, TaskAdapter, TaskContext, TaskError, TaskFactory, TaskResult};

/// A process's unique integer identifier within the job's process group.
pub type Rank = i32;

/// The product's short name; also the root of the default run log name.
pub const PRODUCT_SHORT_NAME: &str = "Foreman";
/// The product's long name.
pub const PRODUCT_LONG_NAME: &str = "Foreman Coordination Framework";
/// The crate version.
pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Defines the command line arguments of the framework's transport surface.
///
/// Everything after `--` is passed through as the opaque application
/// argument vector served by the controller.
pub fn new_app(name: &'static str) -> clap::Command {
    clap::Command::new(name)
        .arg(
            clap::Arg::new("index")
                .long("index")
                .value_name("RANK")
                .default_value("0")
                .help("Rank of this process within the job"),
        )
        .arg(
            clap::Arg::new("addresses")
                .long("addresses")
                .value_name("ADDR,ADDR,...")
                .default_value("127.0.0.1:9000,127.0.0.1:9001,127.0.0.1:9002")
                .help("Comma-separated socket addresses of every rank, indexed by rank"),
        )
        .arg(
            clap::Arg::new("min-processes")
                .long("min-processes")
                .value_name("N")
                .default_value("3")
                .help("Minimum number of processes the job will run with"),
        )
        .arg(
            clap::Arg::new("log-file")
                .long("log-file")
                .value_name("ROOT")
                .default_value("")
                .help("Root of the run log file name"),
        )
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("Raises the diagnostic logging level"),
        )
        .arg(
            clap::Arg::new("args")
                .value_name("ARGS")
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .help("Opaque application arguments"),
        )
}
