//! Tagged message passing between the ranks of a job.
//!
//! Every framework message travels as an [`Envelope`]: the sender's rank, a
//! tag from the closed [`MsgTag`] set, and an opaque payload. The payload
//! shape is fixed per tag:
//!
//! 1. *Zero-byte control messages*: the tag carries the entire semantics
//!    (initialize/start/stop/request/confirmation).
//! 2. *A `[rank, state]` pair of 4-byte signed integers*: tag
//!    [`MsgTag::State`].
//! 3. *A raw UTF-8 byte sequence*: tags [`MsgTag::LogMessage`],
//!    [`MsgTag::ErrorMessage`], [`MsgTag::TaskResults`], and
//!    [`MsgTag::CmdLineArgs`]. The length comes from the transport's
//!    [`Status::count`], never from a length prefix in the payload.
//! 4. *A packed string vector*: newline-delimited concatenation, see
//!    [`PackedStringChannel`].
//!
//! The transport itself is a full TCP mesh managed by [`Comm`]: each rank
//! connects to every lower rank and accepts a connection from every higher
//! rank, so any pair of ranks shares exactly one ordered byte stream.

use bytes::Bytes;

use crate::Rank;

// Private submodules
mod codec;
mod comm;
mod packed_strings;

// Crate-wide visible submodules
pub(crate) mod errors;

// Public exports
pub use codec::EnvelopeCodec;
pub use comm::{Comm, SendRequest, SendStatus};
pub use errors::{CodecError, CommunicationError};
pub use packed_strings::PackedStringChannel;

/// Value below the first valid message tag.
pub const TAG_FIRST: i32 = 101;
/// Value above the last valid message tag.
pub const TAG_LAST: i32 = 120;

/// Tags that label the type of content of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MsgTag {
    /// Contains the state of a task as a `[rank, state]` integer pair.
    State = 102,
    /// Contains task results for the blackboard's output manager.
    TaskResults = 103,
    /// Contains a message for the log file.
    LogMessage = 104,
    /// Contains an error message for the log file.
    ErrorMessage = 105,
    /// To task: initialize.
    InitializeTask = 106,
    /// To task: start after initialization.
    StartTask = 107,
    /// To task: stop.
    RequestStopTask = 108,
    /// To task: pause.
    RequestPauseTask = 109,
    /// To task: resume.
    RequestResumeTask = 110,
    /// To controller: send me the command-line arguments.
    RequestCmdLineArgs = 111,
    /// To controller: stop the job.
    RequestStop = 112,
    /// Here are the command-line arguments.
    CmdLineArgs = 113,
    /// To controller: send me the configuration data (reserved).
    RequestConfig = 114,
    /// Here is the configuration data (reserved).
    Configuration = 115,
    /// To blackboard: stop.
    StopBlackboard = 116,
    /// Confirms a stop request.
    Confirmation = 117,
    /// Contains data for the destination task (reserved).
    Data = 118,
    Unknown = 119,
}

impl MsgTag {
    /// Is the raw tag value within the valid range?
    pub fn is_valid(tag: i32) -> bool {
        tag > TAG_FIRST && tag < TAG_LAST
    }

    /// Maps a raw wire value to a tag; unrecognized values map to
    /// [`MsgTag::Unknown`].
    pub fn of(tag: i32) -> MsgTag {
        match tag {
            102 => MsgTag::State,
            103 => MsgTag::TaskResults,
            104 => MsgTag::LogMessage,
            105 => MsgTag::ErrorMessage,
            106 => MsgTag::InitializeTask,
            107 => MsgTag::StartTask,
            108 => MsgTag::RequestStopTask,
            109 => MsgTag::RequestPauseTask,
            110 => MsgTag::RequestResumeTask,
            111 => MsgTag::RequestCmdLineArgs,
            112 => MsgTag::RequestStop,
            113 => MsgTag::CmdLineArgs,
            114 => MsgTag::RequestConfig,
            115 => MsgTag::Configuration,
            116 => MsgTag::StopBlackboard,
            117 => MsgTag::Confirmation,
            118 => MsgTag::Data,
            _ => MsgTag::Unknown,
        }
    }

    /// The raw wire value of this tag.
    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// A single message as it travels between ranks.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The rank that sent the message.
    pub(crate) src: Rank,
    /// The raw message tag.
    pub(crate) tag: i32,
    /// The message payload.
    pub(crate) payload: Bytes,
}

/// The projection of a probed or received message: who sent it, under which
/// tag, and how many payload bytes it carries.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub source: Rank,
    pub tag: i32,
    pub count: usize,
}

impl Status {
    pub(crate) fn of(envelope: &Envelope) -> Status {
        Status {
            source: envelope.src,
            tag: envelope.tag,
            count: envelope.payload.len(),
        }
    }

    /// The message tag, with unrecognized raw values folded to
    /// [`MsgTag::Unknown`].
    pub fn msg_tag(&self) -> MsgTag {
        MsgTag::of(self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_validity_brackets() {
        assert!(!MsgTag::is_valid(TAG_FIRST));
        assert!(!MsgTag::is_valid(TAG_LAST));
        assert!(!MsgTag::is_valid(0));
        for raw in (TAG_FIRST + 1)..TAG_LAST {
            assert!(MsgTag::is_valid(raw));
        }
    }

    #[test]
    fn raw_values_round_trip() {
        for raw in (TAG_FIRST + 1)..TAG_LAST {
            assert_eq!(MsgTag::of(raw).raw(), raw);
        }
        assert_eq!(MsgTag::of(42), MsgTag::Unknown);
    }
}
