//! HeatIoError: Unified error type for heat-restart public APIs
//!
//! Every fallible operation in this crate returns this error. Errors detected
//! on the coordinating rank are also turned into a group abort (see
//! [`Communicator::abort`](crate::algs::communicator::Communicator::abort)),
//! so peers never wait on a collective the coordinator will not issue.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for field I/O and checkpoint operations.
#[derive(Debug, Error)]
pub enum HeatIoError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Could not open a file; carries the path for context.
    #[error("failed to open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The initial-condition file does not follow `# <rows> <cols>` + values.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// Grid dimensions cannot be split across the process group.
    #[error("invalid decomposition: {0}")]
    InvalidDecomposition(String),
    /// The operation needs every rank to own the same number of rows.
    #[error("rows_full={rows_full} does not split evenly across {size} ranks")]
    NonUniformDecomposition { rows_full: usize, size: usize },
    /// A value does not fit in the 32-bit checkpoint header.
    #[error("value {value} of `{field}` does not fit in a 32-bit header field")]
    HeaderOverflow { field: &'static str, value: u64 },
    /// A single padded tile is too large to address in bytes.
    #[error("checkpoint tile of {local_rows}x{local_cols} cells overflows u64 bytes")]
    TileSizeOverflow { local_rows: usize, local_cols: usize },
    /// Byte offset arithmetic overflowed `u64`.
    #[error("checkpoint byte offset overflow for rank {rank}")]
    OffsetOverflow { rank: usize },
    /// The checkpoint file is truncated or inconsistent with its header.
    #[error("corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),
    /// Restart attempted with a different process count than the writer used.
    #[error("checkpoint written by {written} ranks cannot be restarted on {current} ranks")]
    ProcessCountMismatch { written: usize, current: usize },
    /// A collective checkpoint step was issued out of order.
    #[error("checkpoint phase violation: cannot {action} while {phase:?}")]
    PhaseViolation {
        action: &'static str,
        phase: crate::io::checkpoint::CheckpointPhase,
    },
    /// Point-to-point or collective transfer failure.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Another rank aborted the group while this rank was waiting.
    #[error("process group aborted with code {code}")]
    GroupAborted { code: i32 },
    /// The external image encoder failed.
    #[error("image encoder failed for `{path}`: {message}")]
    Encoder { path: PathBuf, message: String },
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
    /// MPI could not be initialized.
    #[error("MPI initialization failed")]
    MpiInit,
}

impl HeatIoError {
    /// Exit code handed to [`Communicator::abort`](crate::algs::communicator::Communicator::abort).
    pub fn exit_code(&self) -> i32 {
        match self {
            HeatIoError::MalformedInput(_) => -1,
            HeatIoError::Io(_) | HeatIoError::Open { .. } => -2,
            HeatIoError::CorruptCheckpoint(_) | HeatIoError::ProcessCountMismatch { .. } => -3,
            HeatIoError::CommError { .. } => -4,
            HeatIoError::Encoder { .. } => -5,
            HeatIoError::GroupAborted { code } => *code,
            _ => -10,
        }
    }
}
