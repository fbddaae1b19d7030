use std::{sync::Arc, time::Duration};

use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;

use crate::{
    communication::{Comm, MsgTag, SendStatus, Status},
    logger::Logger,
    node::{job::JobHooks, tracker::Tracker, BLACKBOARD, FIRST_WORKER},
    timing::JobTimer,
    util, State,
};

/// Owner of the global lifecycle, running on rank 0.
///
/// The controller initializes, starts, and stops the work tasks, reacting to
/// the state and request messages they send back, and finally stops the
/// blackboard. Its event loop runs once, inside
/// [`activate`](Controller::activate), and returns only when every task and
/// the blackboard are stopped.
pub(crate) struct Controller {
    comm: Arc<Comm>,
    logger: Logger,
    args: Vec<String>,
    tracker: Tracker,
    timer: JobTimer,
    blackboard_state: State,
    stopping: bool,
    hooks: Option<Box<dyn JobHooks>>,
}

impl Controller {
    pub(crate) fn new(
        comm: Arc<Comm>,
        logger: Logger,
        args: Vec<String>,
        num_tasks: usize,
        hooks: Option<Box<dyn JobHooks>>,
    ) -> Controller {
        Controller {
            comm,
            logger,
            args,
            tracker: Tracker::new(num_tasks),
            timer: JobTimer::new(false),
            blackboard_state: State::Unknown,
            stopping: false,
            hooks,
        }
    }

    pub(crate) fn set_blackboard_state(&mut self, state: State) {
        self.blackboard_state = state;
    }

    /// Runs the controller event loop until all tasks are stopped and the
    /// blackboard is stopped. Called once; not re-entrant.
    pub(crate) async fn activate(&mut self) {
        self.log_cmdline_args();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.before_tasks_created(&self.logger);
        }

        let mut tasks_created = self.tracker.are_all_created();
        let mut tasks_initialized = false;
        let mut tasks_started = false;
        let mut requested_init = false;

        loop {
            // Recompute the macro-state flags from the tracker.
            if !tasks_created {
                tasks_created = self.tracker.are_all_created();
            }
            if tasks_created && !tasks_initialized {
                tasks_initialized = self.tracker.are_all_initialized();
            }

            // Actions based on the flags.
            if !requested_init && tasks_created && !tasks_initialized {
                self.initialize_all_tasks().await;
                requested_init = true;
            }
            if tasks_initialized && !tasks_started {
                self.start_all_tasks().await;
                tasks_started = true;
            }

            let mut tasks_stopped = self.tracker.are_all_stopped();
            if tasks_started && !tasks_stopped {
                if let Some(hooks) = self.hooks.as_mut() {
                    hooks.while_active(&self.logger);
                }
            }

            // Wait for one message from the tasks and dispatch on its tag.
            let status = self.comm.probe(None, None).await;
            self.dispatch(status).await;

            tasks_stopped = self.tracker.are_all_stopped();
            if tasks_stopped {
                if let Some(hooks) = self.hooks.as_mut() {
                    hooks.after_tasks(&self.logger);
                }
                self.logger.message("Controller: all tasks are stopped.");

                let elapsed = self.timer.stop();
                self.logger.message(&format!(
                    "Elapsed time for all tasks (seconds): {}",
                    elapsed.as_secs_f64()
                ));

                self.stop_blackboard().await;
                break;
            }
        }
        self.logger.message("Controller stopped.");
    }

    async fn dispatch(&mut self, status: Status) {
        match status.msg_tag() {
            MsgTag::State => self.handle_state(status).await,
            MsgTag::RequestStop => self.handle_request_stop(status).await,
            MsgTag::RequestCmdLineArgs => self.handle_request_cmdline_args(status).await,
            MsgTag::RequestConfig => {
                // Reserved; drain the request and send no reply.
                let _ = self.comm.recv(Some(status.source), None).await;
            }
            _ => {
                let _ = self.comm.recv(Some(status.source), None).await;
                self.logger.warning(&format!(
                    "Controller: unhandled message tag {} from rank {}.",
                    status.tag, status.source
                ));
            }
        }
    }

    /// Applies a `[rank, state]` report to the tracker.
    async fn handle_state(&mut self, status: Status) {
        let (_, payload) = self
            .comm
            .recv(Some(status.source), Some(MsgTag::State))
            .await;
        if status.source == BLACKBOARD {
            return;
        }
        if payload.len() < 8 {
            tracing::warn!(
                "controller received a malformed state message from rank {}",
                status.source
            );
            return;
        }
        let task_rank = NetworkEndian::read_i32(&payload[0..4]);
        let raw_state = NetworkEndian::read_i32(&payload[4..8]);
        if task_rank >= FIRST_WORKER {
            let slot = (task_rank - FIRST_WORKER) as usize;
            if slot < self.tracker.len() {
                let new_state = State::of(raw_state);
                let previous = self.tracker.set_state(slot, new_state);
                tracing::debug!(
                    "controller: task rank {} changed state {} -> {}",
                    task_rank,
                    previous,
                    new_state
                );
            } else {
                tracing::warn!(
                    "controller received a state report for unknown task rank {}",
                    task_rank
                );
            }
        }
    }

    async fn handle_request_stop(&mut self, status: Status) {
        self.logger.message("Controller: received stop request.");
        let _ = self
            .comm
            .recv(Some(status.source), Some(MsgTag::RequestStop))
            .await;
        if self.stopping {
            return;
        }
        self.stopping = true;

        if self.stop_all_tasks().await {
            self.logger.message("Controller: all tasks stopped.");
        } else {
            self.logger.message("Controller: stop all tasks failed.");
        }
        self.stop_blackboard().await;
    }

    async fn handle_request_cmdline_args(&mut self, status: Status) {
        let _ = self
            .comm
            .recv(Some(status.source), Some(MsgTag::RequestCmdLineArgs))
            .await;
        let joined = util::join_lines(&self.args, '\n');
        if let Err(e) = self
            .comm
            .send(status.source, MsgTag::CmdLineArgs, Bytes::from(joined.into_bytes()))
            .await
        {
            self.logger.error(&format!(
                "Controller: could not serve the command-line arguments to rank {}: {}",
                status.source, e
            ));
        }
    }

    /// Broadcasts `INITIALIZE_TASK` to every task and waits for the sends to
    /// complete.
    async fn initialize_all_tasks(&mut self) {
        self.timer.start();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.at_init_tasks(&self.logger);
        }
        let statuses = self.broadcast(MsgTag::InitializeTask).await;
        self.log_send_failures("initialize", &statuses);
    }

    /// Broadcasts `START_TASK` to every task and waits for the sends to
    /// complete.
    async fn start_all_tasks(&mut self) {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.before_tasks_start(&self.logger);
        }
        let statuses = self.broadcast(MsgTag::StartTask).await;
        self.log_send_failures("start", &statuses);
    }

    async fn broadcast(&mut self, tag: MsgTag) -> Vec<SendStatus> {
        let mut requests = Vec::with_capacity(self.tracker.len());
        for slot in 0..self.tracker.len() {
            let destination = FIRST_WORKER + slot as crate::Rank;
            match self.comm.isend(destination, tag, Bytes::new()) {
                Ok(request) => requests.push(request),
                Err(e) => self.logger.error(&format!(
                    "Controller: could not post tag {} to rank {}: {}",
                    tag.raw(),
                    destination,
                    e
                )),
            }
        }
        self.comm.wait_all(requests).await
    }

    fn log_send_failures(&self, what: &str, statuses: &[SendStatus]) {
        for status in statuses {
            if let Some(error) = &status.error {
                self.logger.error(&format!(
                    "Controller: {} send failed. Error: {} Tag: {} Destination rank: {}",
                    what, error, status.tag, status.rank
                ));
            }
        }
    }

    /// Requests a stop from every task that is not already terminal, then
    /// keeps handling inbound messages until the tracker converges to
    /// all-stopped.
    async fn stop_all_tasks(&mut self) -> bool {
        self.logger.message("Controller stopping all tasks.");
        for slot in 0..self.tracker.len() {
            let state = self.tracker.state(slot);
            if !state.is_terminal() {
                let destination = FIRST_WORKER + slot as crate::Rank;
                if let Err(e) = self
                    .comm
                    .send(destination, MsgTag::RequestStopTask, Bytes::new())
                    .await
                {
                    self.logger.error(&format!(
                        "Controller: could not request a stop from rank {}: {}",
                        destination, e
                    ));
                }
            }
        }
        while !self.tracker.are_all_stopped() {
            let status = self.comm.probe(None, None).await;
            match status.msg_tag() {
                MsgTag::State => self.handle_state(status).await,
                _ => {
                    // Everything else is drained; redundant stop requests
                    // included.
                    let _ = self.comm.recv(Some(status.source), None).await;
                }
            }
        }
        self.tracker.are_all_stopped()
    }

    /// Performs the blackboard shutdown handshake: one `STOP_BLACKBOARD`,
    /// one `CONFIRMATION` back, then a short pause so the transport can
    /// quiesce.
    async fn stop_blackboard(&mut self) {
        if self.blackboard_state != State::Completed {
            if let Err(e) = self
                .comm
                .send(BLACKBOARD, MsgTag::StopBlackboard, Bytes::new())
                .await
            {
                tracing::error!("controller could not request the blackboard stop: {}", e);
            }
            let _ = self
                .comm
                .recv(Some(BLACKBOARD), Some(MsgTag::Confirmation))
                .await;
            self.blackboard_state = State::Completed;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Writes the job's argument vector to the run log.
    fn log_cmdline_args(&self) {
        let mut text = String::from("Command-line arguments: ");
        if self.args.is_empty() {
            text.push_str("none");
        } else {
            text.push('\n');
            for (i, arg) in self.args.iter().enumerate() {
                text.push_str(&format!("{}: {}\n", i + 1, arg));
            }
        }
        self.logger.message(&text);
    }
}
