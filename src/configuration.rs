use std::net::SocketAddr;

use bytes::Bytes;
use tracing::Level;

use crate::{
    communication::{Comm, CommunicationError, MsgTag},
    node::{CONTROLLER, FIRST_WORKER},
    Rank,
};

/// Stores the configuration parameters of one rank of a job.
///
/// The application argument vector is an ordered sequence of opaque strings
/// (program name dropped). It is held by the controller and served on demand
/// to any rank through the command-line-args request
/// ([`fetch_cmdline_args`]); the framework itself never interprets it.
#[derive(Clone)]
pub struct Configuration {
    /// The rank of this process.
    pub index: Rank,
    /// Mapping between ranks and their socket addresses.
    pub addresses: Vec<SocketAddr>,
    /// The minimum number of processes the framework will run with.
    pub min_processes: usize,
    /// Opaque application arguments, program name dropped.
    pub args: Vec<String>,
    /// Root of the run log file name; empty selects the product default.
    pub log_file_root: String,
    /// The logging level of the `tracing` subscriber initialized by the
    /// framework. If `None`, no subscriber is initialized. Defaults to
    /// [`Level::DEBUG`] when compiling in debug mode, [`Level::INFO`] when
    /// compiling in release mode.
    pub logging_level: Option<Level>,
}

impl Configuration {
    /// Creates a new rank configuration.
    pub fn new(index: Rank, addresses: Vec<SocketAddr>) -> Self {
        let log_level = if cfg!(debug_assertions) {
            Some(Level::DEBUG)
        } else {
            Some(Level::INFO)
        };
        Self {
            index,
            addresses,
            min_processes: FIRST_WORKER as usize + 1,
            args: Vec::new(),
            log_file_root: String::new(),
            logging_level: log_level,
        }
    }

    /// Creates a rank configuration from command line arguments.
    pub fn from_args(matches: &clap::ArgMatches) -> Self {
        let index: Rank = matches
            .get_one::<String>("index")
            .and_then(|value| value.parse().ok())
            .expect("Unable to parse the rank index");
        let mut addresses: Vec<SocketAddr> = Vec::new();
        for addr in matches
            .get_one::<String>("addresses")
            .expect("The rank addresses are required")
            .split(',')
        {
            addresses.push(addr.parse().expect("Unable to parse socket address"));
        }
        let min_processes: usize = matches
            .get_one::<String>("min-processes")
            .and_then(|value| value.parse().ok())
            .expect("Unable to parse the minimum process count");
        let log_file_root = matches
            .get_one::<String>("log-file")
            .cloned()
            .unwrap_or_default();
        let log_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(Level::WARN),
            2 => Some(Level::INFO),
            3 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        };
        let args = matches
            .get_many::<String>("args")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        Self {
            index,
            addresses,
            min_processes: min_processes.max(FIRST_WORKER as usize + 1),
            args,
            log_file_root,
            logging_level: log_level,
        }
    }

    /// Replaces the application argument vector.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the minimum process count; never below `FIRST_WORKER + 1`.
    pub fn with_min_processes(mut self, min_processes: usize) -> Self {
        self.min_processes = min_processes.max(FIRST_WORKER as usize + 1);
        self
    }

    /// Sets the root of the run log file name.
    pub fn with_log_file_root(mut self, root: &str) -> Self {
        self.log_file_root = root.to_string();
        self
    }

    /// Sets the logging level.
    pub fn with_logging_level(mut self, level: Level) -> Self {
        self.logging_level = Some(level);
        self
    }

    /// The framework will not initialize a `tracing` subscriber if this
    /// method is called.
    pub fn disable_logger(mut self) -> Self {
        self.logging_level = None;
        self
    }

    /// The number of processes in the job.
    pub fn num_processes(&self) -> usize {
        self.addresses.len()
    }

    /// The number of worker ranks in the job.
    pub fn num_workers(&self) -> usize {
        self.addresses.len().saturating_sub(FIRST_WORKER as usize)
    }
}

/// Fetches the controller's argument vector over the transport.
///
/// This is the client side of the command-line-args service: it sends
/// `REQUEST_CMDLINE_ARGS` to the controller and blocks until the
/// `CMDLINE_ARGS` reply arrives, newline-joined on the wire.
pub async fn fetch_cmdline_args(comm: &Comm) -> Result<Vec<String>, CommunicationError> {
    comm.send(
        CONTROLLER,
        MsgTag::RequestCmdLineArgs,
        Bytes::from_static(&[0u8]),
    )
    .await?;
    let (_, payload) = comm
        .recv(Some(CONTROLLER), Some(MsgTag::CmdLineArgs))
        .await;
    let joined = String::from_utf8_lossy(&payload);
    Ok(joined
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
