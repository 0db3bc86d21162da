//! Error types for the write-ahead log.
//!
//! Every failure the log can surface is a variant of [`WalError`].
//! Filesystem and lock failures pass through as [`WalError::Io`]; everything
//! else is a structural problem with the log itself and carries enough
//! context for the caller to decide between aborting and recovering.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::wal::{Recovered, Wal};

/// The error type for write-ahead log operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// [`Wal::create`] was invoked on a directory that already exists.
    #[error("wal: directory {} already exists", .dir.display())]
    AlreadyExists {
        /// The directory that was refused.
        dir: PathBuf,
    },

    /// No segment covers the requested position, or the segment sequence
    /// numbers have a gap.
    #[error("wal: file not found")]
    FileNotFound,

    /// The running CRC chain did not match a record's stored checksum.
    #[error("wal: crc mismatch")]
    CrcMismatch,

    /// Two segments carry different metadata payloads.
    #[error("wal: conflicting metadata found")]
    MetadataConflict,

    /// A snapshot record at the starting index carries a different term.
    #[error("wal: snapshot mismatch")]
    SnapshotMismatch,

    /// Replay finished without ever observing the starting snapshot.
    ///
    /// The log has still transitioned to append mode. The variant carries it
    /// together with everything that was read, so a caller that considers a
    /// missing snapshot record tolerable can destructure the error and keep
    /// going; plain `?` propagation treats it as fatal.
    #[error("wal: snapshot not found")]
    SnapshotNotFound {
        /// The log, ready for appending.
        wal: Box<Wal>,
        /// The records read before the end of the stream.
        recovered: Recovered,
    },

    /// A record carried a type code this implementation does not know.
    #[error("wal: unexpected record type {0}")]
    UnexpectedRecordType(i64),

    /// A framed record failed to parse.
    #[error("wal: record decode: {0}")]
    Decode(#[from] prost::DecodeError),

    /// An I/O or file-lock error from the underlying segment files.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type alias using [`WalError`].
pub type Result<T> = std::result::Result<T, WalError>;
