//! Rank-aware logging over the transport.
//!
//! A [`Logger`] formats log lines with a consistent date-time prefix and
//! ships them to the blackboard rank as [`MsgTag::LogMessage`] or
//! [`MsgTag::ErrorMessage`] payloads. It never touches the log file itself;
//! the blackboard is the only writer.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    communication::{Comm, MsgTag},
    timing, Rank,
};

const WARNING_PREFIX: &str = "Warning: ";
const ERROR_PREFIX: &str = "ERROR: ";

/// Formats the `"Tracker ID <n>: "` tag for a task.
fn task_tag(task_id: usize) -> String {
    format!("Tracker ID {}: ", task_id)
}

fn compose(tag: Option<&str>, severity: Option<&str>, msg: &str) -> String {
    let mut text = timing::timestamp_prefix();
    if let Some(tag) = tag {
        text.push_str(tag);
    }
    if let Some(severity) = severity {
        text.push_str(severity);
    }
    text.push_str(msg);
    text
}

/// Ships formatted log, warning, and error lines to the blackboard.
///
/// Sends are posted asynchronously so that adapter code running outside the
/// event loop can log; a failed post is reported through `tracing` rather
/// than back to the caller.
#[derive(Clone)]
pub struct Logger {
    comm: Arc<Comm>,
    blackboard: Rank,
}

impl Logger {
    pub fn new(comm: Arc<Comm>, blackboard: Rank) -> Self {
        Self { comm, blackboard }
    }

    fn ship(&self, text: String, tag: MsgTag) {
        match self.comm.isend(self.blackboard, tag, Bytes::from(text.into_bytes())) {
            Ok(_request) => {}
            Err(e) => {
                tracing::warn!(
                    "rank {}: could not post log message to rank {}: {}",
                    self.comm.rank(),
                    self.blackboard,
                    e
                );
            }
        }
    }

    /// Writes an informational line.
    pub fn message(&self, msg: &str) {
        self.ship(compose(None, None, msg), MsgTag::LogMessage);
    }

    /// Writes an informational line tagged with a task id.
    pub fn message_for_task(&self, msg: &str, task_id: usize) {
        self.ship(
            compose(Some(&task_tag(task_id)), None, msg),
            MsgTag::LogMessage,
        );
    }

    /// Writes an informational line with a caller-supplied tag.
    pub fn message_tagged(&self, msg: &str, tag: &str) {
        self.ship(compose(Some(tag), None, msg), MsgTag::LogMessage);
    }

    /// Writes a `Warning: ` line.
    pub fn warning(&self, msg: &str) {
        self.ship(compose(None, Some(WARNING_PREFIX), msg), MsgTag::LogMessage);
    }

    /// Writes a `Warning: ` line tagged with a task id.
    pub fn warning_for_task(&self, msg: &str, task_id: usize) {
        self.ship(
            compose(Some(&task_tag(task_id)), Some(WARNING_PREFIX), msg),
            MsgTag::LogMessage,
        );
    }

    /// Writes a `Warning: ` line with a caller-supplied tag.
    pub fn warning_tagged(&self, msg: &str, tag: &str) {
        self.ship(
            compose(Some(tag), Some(WARNING_PREFIX), msg),
            MsgTag::LogMessage,
        );
    }

    /// Writes an `ERROR: ` line, shipped under [`MsgTag::ErrorMessage`].
    pub fn error(&self, msg: &str) {
        self.ship(compose(None, Some(ERROR_PREFIX), msg), MsgTag::ErrorMessage);
    }

    /// Writes an `ERROR: ` line tagged with a task id.
    pub fn error_for_task(&self, msg: &str, task_id: usize) {
        self.ship(
            compose(Some(&task_tag(task_id)), Some(ERROR_PREFIX), msg),
            MsgTag::ErrorMessage,
        );
    }

    /// Writes an `ERROR: ` line with a caller-supplied tag.
    pub fn error_tagged(&self, msg: &str, tag: &str) {
        self.ship(
            compose(Some(tag), Some(ERROR_PREFIX), msg),
            MsgTag::ErrorMessage,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_stamp(line: &str) -> &str {
        // "YYYY-MM-DD_HH-MM-SS: " is 21 bytes.
        &line[21..]
    }

    #[test]
    fn error_lines_carry_task_tag_and_prefix() {
        let line = compose(Some(&task_tag(5)), Some(ERROR_PREFIX), "boom");
        assert_eq!(strip_stamp(&line), "Tracker ID 5: ERROR: boom");
        assert_eq!(&line[10..11], "_");
        assert_eq!(&line[19..21], ": ");
    }

    #[test]
    fn warning_and_plain_lines() {
        let warning = compose(None, Some(WARNING_PREFIX), "low disk");
        assert_eq!(strip_stamp(&warning), "Warning: low disk");
        let plain = compose(None, None, "hello");
        assert_eq!(strip_stamp(&plain), "hello");
    }
}
