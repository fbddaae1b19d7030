use std::{sync::Arc, time::Duration};

use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;

use crate::{
    communication::{Comm, MsgTag},
    logger::Logger,
    node::FIRST_WORKER,
    task::{TaskAdapter, TaskContext, TaskFactory},
    Rank, State,
};

/// The number of drain polls performed after stopping, so leaked controller
/// sends cannot jam transport teardown.
const STOP_DRAIN_POLLS: usize = 10;

/// The action a received message asks the worker to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Initialize,
    Start,
    Stop,
    Pause,
    Resume,
    AcceptData,
    None,
}

/// Hosts one application task and drives it through its lifecycle in
/// response to controller commands.
///
/// The adapter is constructed eagerly so that `CREATED` can be posted as
/// soon as the worker activates; every later state change is published to
/// the controller before the worker waits for its next command.
pub(crate) struct Worker {
    comm: Arc<Comm>,
    logger: Logger,
    rank: Rank,
    controller: Rank,
    /// 1-based tracker index of this task, as it appears in log tags.
    task_id: usize,
    name: String,
    state: State,
    adapter: Option<Box<dyn TaskAdapter>>,
}

impl Worker {
    pub(crate) fn new(
        comm: Arc<Comm>,
        logger: Logger,
        name: String,
        controller: Rank,
        factory: &Arc<dyn TaskFactory>,
        args: Vec<String>,
    ) -> Worker {
        let rank = comm.rank();
        let task_id = (rank - FIRST_WORKER + 1) as usize;
        let context = TaskContext::new(
            rank,
            task_id,
            name.clone(),
            args,
            logger.clone(),
            comm.clone(),
        );
        let adapter = match factory.create(context) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                logger.error_for_task(&format!("could not create the task adapter: {}", e), task_id);
                None
            }
        };
        Worker {
            comm,
            logger,
            rank,
            controller,
            task_id,
            name,
            state: State::Unknown,
            adapter,
        }
    }

    /// Runs the worker's event loop until the task reaches a terminal state.
    pub(crate) async fn activate(&mut self) {
        if self.adapter.is_some() {
            self.set_state(State::Created);
        } else {
            // The factory failed; report the slot as errored and do not loop.
            self.set_state(State::Error);
            self.log_state();
        }

        while !self.state.is_terminal() {
            let status = self.comm.probe(Some(self.controller), None).await;
            let action = self.process_message(status.msg_tag()).await;
            match action {
                Action::Initialize => self.do_initialize(),
                Action::Start => self.do_start(),
                Action::Stop => self.do_stop().await,
                Action::Pause => self.do_pause(),
                Action::Resume => self.do_resume(),
                Action::AcceptData => {}
                Action::None => {}
            }
        }
        // Release the adapter before leaving the loop.
        self.adapter = None;
        tracing::debug!("worker {} (\"{}\") done", self.rank, self.name);
    }

    /// Drains the probed message and maps its tag to an action.
    async fn process_message(&mut self, tag: MsgTag) -> Action {
        // The probed message is the oldest from the controller, so an
        // unfiltered receive takes exactly it.
        let _ = self.comm.recv(Some(self.controller), None).await;
        match tag {
            MsgTag::InitializeTask => Action::Initialize,
            MsgTag::StartTask => Action::Start,
            MsgTag::RequestStopTask | MsgTag::RequestStop => Action::Stop,
            MsgTag::RequestPauseTask => Action::Pause,
            MsgTag::RequestResumeTask => Action::Resume,
            MsgTag::Data => Action::AcceptData,
            _ => {
                self.logger.warning_for_task(
                    &format!("unhandled message tag {} received", tag.raw()),
                    self.task_id,
                );
                Action::None
            }
        }
    }

    fn do_initialize(&mut self) {
        if self.state == State::Error {
            self.log_state();
            return;
        }
        let outcome = match self.adapter.as_mut() {
            Some(adapter) => tokio::task::block_in_place(|| adapter.initialize()),
            None => return,
        };
        match outcome {
            Ok(state) => self.set_state(state),
            Err(e) => {
                self.logger.error_for_task(&e.to_string(), self.task_id);
                self.set_state(State::Error);
            }
        }
        self.log_state();
    }

    fn do_start(&mut self) {
        if self.state == State::Error {
            self.log_state();
            return;
        }
        if self.state != State::Initialized {
            self.logger
                .message_for_task("initialization failed", self.task_id);
            self.set_state(State::Error);
            self.log_state();
            return;
        }
        let outcome = match self.adapter.as_mut() {
            Some(adapter) => tokio::task::block_in_place(|| adapter.start()),
            None => return,
        };
        match outcome {
            Ok(state) => self.set_state(state),
            Err(e) => {
                self.logger.error_for_task(&e.to_string(), self.task_id);
                self.set_state(State::Error);
            }
        }
        self.log_state();
    }

    async fn do_stop(&mut self) {
        let outcome = self
            .adapter
            .as_mut()
            .map(|adapter| tokio::task::block_in_place(|| adapter.stop()));
        match outcome {
            Some(Ok(state)) => self.set_state(state),
            Some(Err(e)) => {
                self.logger.error_for_task(&e.to_string(), self.task_id);
            }
            None => {}
        }
        if !matches!(self.state, State::Completed | State::Terminated) {
            // The adapter refused to stop; discard it and report terminated.
            self.adapter = None;
            self.set_state(State::Terminated);
        }
        self.log_state();

        // Check for and discard any remaining controller messages.
        for _ in 0..STOP_DRAIN_POLLS {
            if self.comm.try_probe(Some(self.controller), None).is_some() {
                let _ = self.comm.recv(Some(self.controller), None).await;
            } else {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    fn do_pause(&mut self) {
        let outcome = match self.adapter.as_mut() {
            Some(adapter) => tokio::task::block_in_place(|| adapter.pause()),
            None => return,
        };
        match outcome {
            Ok(state) => self.set_state(state),
            Err(e) => {
                self.logger.error_for_task(&e.to_string(), self.task_id);
                self.set_state(State::Error);
            }
        }
        self.log_state();
    }

    fn do_resume(&mut self) {
        if self.state == State::Error {
            self.log_state();
            return;
        }
        let outcome = match self.adapter.as_mut() {
            Some(adapter) => tokio::task::block_in_place(|| adapter.resume()),
            None => return,
        };
        match outcome {
            Ok(state) => self.set_state(state),
            Err(e) => {
                self.logger.error_for_task(&e.to_string(), self.task_id);
                self.set_state(State::Error);
            }
        }
        self.log_state();
    }

    /// Records the new state and publishes it to the controller as a
    /// `[rank, state]` pair.
    fn set_state(&mut self, new_state: State) {
        self.state = new_state;
        let mut buffer = [0u8; 8];
        NetworkEndian::write_i32(&mut buffer[0..4], self.rank);
        NetworkEndian::write_i32(&mut buffer[4..8], new_state.raw());
        match self
            .comm
            .isend(self.controller, MsgTag::State, Bytes::copy_from_slice(&buffer))
        {
            Ok(_request) => {}
            Err(e) => {
                tracing::warn!(
                    "worker {} could not publish state {}: {}",
                    self.rank,
                    new_state,
                    e
                );
            }
        }
    }

    fn log_state(&self) {
        self.logger.message(&format!(
            "Tracker ID {}: state = {}",
            self.task_id, self.state
        ));
    }
}
