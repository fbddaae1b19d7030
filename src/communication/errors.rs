use std::{error::Error, fmt, io};

use tokio::sync::{mpsc, oneshot};

use crate::Rank;

/// Error raised by the communication layer.
#[derive(Debug)]
pub enum CommunicationError {
    /// The channel or the connection to the peer has been closed.
    Disconnected,
    /// The destination rank is not part of the process group.
    UnknownRank(Rank),
    /// Failed to serialize/deserialize an envelope header with Bincode.
    BincodeError(bincode::Error),
    /// Failed to read/write data from/to the TCP stream.
    IoError(io::Error),
}

impl fmt::Display for CommunicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunicationError::Disconnected => write!(f, "peer disconnected"),
            CommunicationError::UnknownRank(rank) => {
                write!(f, "rank {} is not part of the process group", rank)
            }
            CommunicationError::BincodeError(err) => write!(f, "{}", err),
            CommunicationError::IoError(err) => write!(f, "{}", err),
        }
    }
}

impl Error for CommunicationError {}

impl From<io::Error> for CommunicationError {
    fn from(e: io::Error) -> Self {
        CommunicationError::IoError(e)
    }
}

impl From<bincode::Error> for CommunicationError {
    fn from(e: bincode::Error) -> Self {
        CommunicationError::BincodeError(e)
    }
}

impl From<CodecError> for CommunicationError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::IoError(e) => CommunicationError::IoError(e),
            CodecError::BincodeError(e) => CommunicationError::BincodeError(e),
        }
    }
}

impl<T> From<mpsc::error::SendError<T>> for CommunicationError {
    fn from(_e: mpsc::error::SendError<T>) -> Self {
        CommunicationError::Disconnected
    }
}

impl From<oneshot::error::RecvError> for CommunicationError {
    fn from(_e: oneshot::error::RecvError) -> Self {
        CommunicationError::Disconnected
    }
}

/// Error raised by the [`EnvelopeCodec`](super::EnvelopeCodec) when messages
/// cannot be encoded or decoded.
#[derive(Debug)]
pub enum CodecError {
    IoError(io::Error),
    /// Bincode serialization/deserialization error. It is raised when the
    /// envelope header serialization fails. This should not ever happen.
    BincodeError(bincode::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::IoError(err) => write!(f, "{}", err),
            CodecError::BincodeError(err) => write!(f, "{}", err),
        }
    }
}

impl Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> CodecError {
        CodecError::IoError(e)
    }
}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::BincodeError(e)
    }
}
