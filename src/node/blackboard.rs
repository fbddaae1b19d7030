use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{
    communication::{Comm, MsgTag, Status},
    node::run_log::RunLog,
    task::OutputManager,
    timing, Rank,
};

const ERROR_LINE_PREFIX: &str = "Error: ";

/// The information sink of the job, running on its own rank.
///
/// The blackboard acts on no other process; it only accepts messages. Log
/// and error messages land in the [`RunLog`]; result messages are handed to
/// the optional [`OutputManager`]. The run log is always present, the output
/// manager is not.
pub(crate) struct Blackboard {
    comm: Arc<Comm>,
    controller: Rank,
    run_log: RunLog,
    output_manager: Option<Box<dyn OutputManager>>,
}

impl Blackboard {
    /// Creates the blackboard, opening its run log.
    ///
    /// Failure to open the log file is fatal for this rank.
    pub(crate) fn new(
        comm: Arc<Comm>,
        controller: Rank,
        output_manager: Option<Box<dyn OutputManager>>,
        log_file_root: &str,
    ) -> io::Result<Blackboard> {
        let run_log = RunLog::create(log_file_root)?;
        tracing::debug!("blackboard run log: {}", run_log.file_name());
        Ok(Blackboard {
            comm,
            controller,
            run_log,
            output_manager,
        })
    }

    /// Runs the receive loop until a stop request arrives from the
    /// controller.
    ///
    /// On stop, any messages still in flight are drained into their sinks,
    /// the final `"Blackboard stopped."` record is written, and a
    /// `CONFIRMATION` is sent back before returning.
    pub(crate) async fn activate(&mut self) {
        loop {
            let status = self.comm.probe(None, None).await;
            match status.msg_tag() {
                MsgTag::TaskResults => self.handle_task_results(status).await,
                MsgTag::LogMessage => self.receive_and_log_message(status).await,
                MsgTag::ErrorMessage => self.receive_and_log_error(status).await,
                MsgTag::StopBlackboard | MsgTag::RequestStop | MsgTag::RequestStopTask => {
                    let _ = self.comm.recv(Some(status.source), None).await;
                    self.drain_pending().await;
                    self.write_stamped("Blackboard stopped.");
                    if let Err(e) = self
                        .comm
                        .send(self.controller, MsgTag::Confirmation, Bytes::new())
                        .await
                    {
                        tracing::error!("blackboard could not confirm its stop: {}", e);
                    }
                    return;
                }
                _ => {
                    // Unhandled tags are drained and dropped (future extension).
                    let _ = self.comm.recv(Some(status.source), None).await;
                    tracing::debug!(
                        "blackboard dropped a message with tag {} from rank {}",
                        status.tag,
                        status.source
                    );
                }
            }
        }
    }

    /// Polls a few more times for messages that were still in flight when
    /// the stop request arrived, so late log lines and results are not lost.
    async fn drain_pending(&mut self) {
        for _ in 0..10 {
            while let Some(status) = self.comm.try_probe(None, None) {
                match status.msg_tag() {
                    MsgTag::TaskResults => self.handle_task_results(status).await,
                    MsgTag::LogMessage => self.receive_and_log_message(status).await,
                    MsgTag::ErrorMessage => self.receive_and_log_error(status).await,
                    _ => {
                        let _ = self.comm.recv(Some(status.source), None).await;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn handle_task_results(&mut self, status: Status) {
        let (_, payload) = self
            .comm
            .recv(Some(status.source), Some(MsgTag::TaskResults))
            .await;
        if let Some(manager) = self.output_manager.as_mut() {
            manager.write(status.source, &payload);
        }
    }

    async fn receive_and_log_message(&mut self, status: Status) {
        let (_, payload) = self
            .comm
            .recv(Some(status.source), Some(MsgTag::LogMessage))
            .await;
        let msg = String::from_utf8_lossy(&payload);
        self.run_log.write(&msg);
    }

    async fn receive_and_log_error(&mut self, status: Status) {
        let (_, payload) = self
            .comm
            .recv(Some(status.source), Some(MsgTag::ErrorMessage))
            .await;
        let body = String::from_utf8_lossy(&payload);
        if body.starts_with(ERROR_LINE_PREFIX) {
            self.run_log.write(&body);
        } else {
            let mut msg = String::with_capacity(ERROR_LINE_PREFIX.len() + body.len());
            msg.push_str(ERROR_LINE_PREFIX);
            msg.push_str(&body);
            self.run_log.write(&msg);
        }
    }

    fn write_stamped(&mut self, msg: &str) {
        let mut text = timing::timestamp_prefix();
        text.push_str(msg);
        self.run_log.write(&text);
    }
}
