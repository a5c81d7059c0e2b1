//! Error taxonomy reported to clients.
//!
//! Every [`CommandError`] is sent back as an `error:<kind>` / `reason:<message>`
//! envelope and leaves the connection open. Only transport failures and
//! [`FrameError`]s close a connection.

use thiserror::Error;

/// Wire-level error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCommand,
    InvalidCore,
    InvalidArgument,
    NotAllowed,
    ProtocolError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidCommand => "invalid_command",
            ErrorKind::InvalidCore => "invalid_core",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotAllowed => "not_allowed",
            ErrorKind::ProtocolError => "protocol_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Unknown binary command")]
    UnknownBinaryCommand,
    #[error("Invalid core name")]
    InvalidCore,
    #[error("Unsupported core loaded")]
    UnsupportedCore,
    #[error("{verb} requires an argument: {argument}")]
    MissingArgument {
        verb: &'static str,
        argument: &'static str,
    },
    #[error("{verb} requires a memory name and pairs of offset/size")]
    Arity { verb: &'static str },
    #[error("Invalid memory name: {0}")]
    UnknownRegion(String),
    #[error("Invalid offset: {0}")]
    InvalidOffset(String),
    #[error("Invalid size: {0}")]
    InvalidSize(String),
    #[error("Memory {access} out of bounds")]
    OutOfBounds { access: &'static str },
    #[error("Read request exceeds {limit} bytes")]
    ReadTooLarge { limit: usize },
    #[error("Insufficient data received for bCORE_WRITE")]
    PayloadTooShort,
    #[error("{0}")]
    Frame(#[from] FrameError),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand | CommandError::UnknownBinaryCommand => {
                ErrorKind::InvalidCommand
            }
            CommandError::InvalidCore | CommandError::UnsupportedCore => ErrorKind::InvalidCore,
            CommandError::MissingArgument { .. }
            | CommandError::Arity { .. }
            | CommandError::UnknownRegion(_)
            | CommandError::InvalidOffset(_)
            | CommandError::InvalidSize(_) => ErrorKind::InvalidArgument,
            CommandError::OutOfBounds { .. } | CommandError::ReadTooLarge { .. } => {
                ErrorKind::NotAllowed
            }
            CommandError::PayloadTooShort | CommandError::Frame(_) => ErrorKind::ProtocolError,
        }
    }
}

/// Faults that make further framing on a connection impossible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("binary frame of {declared} bytes exceeds the {capacity} byte receive buffer")]
    BinaryTooLarge { declared: usize, capacity: usize },
    #[error("command line exceeds the {capacity} byte receive buffer")]
    LineTooLong { capacity: usize },
}
