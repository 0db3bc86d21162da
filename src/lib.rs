//! Segmented, crash-safe write-ahead log for a replicated consensus node.
//!
//! The log durably records the node's state transitions: committed entries,
//! periodic hard states, and pointers to externally persisted snapshots. On
//! restart the node replays the log from a known snapshot point to rebuild
//! its in-memory state.
//!
//! # Key Components
//!
//! - **Record codec**: length-prefixed, typed records whose checksums form
//!   a per-file CRC-32C chain, so bit-rot and torn writes are caught on
//!   replay no matter where a segment was rotated.
//! - **Segments**: `<seq:016x>-<firstindex:016x>.wal` files whose fixed-width
//!   names sort into sequence order and encode the first entry index each
//!   file may contain.
//! - **Segment locks**: one cross-process advisory lock per segment, held by
//!   the appender for the whole live tail and released only once a snapshot
//!   covers the segment.
//! - **Mode machine**: [`Wal`] appends, [`OpenWal`] replays, and
//!   [`OpenWal::read_all`] is the single one-way transition between them.
//!
//! # Example
//!
//! ```ignore
//! use quorum_wal::{Entry, HardState, Snapshot, Wal};
//!
//! // First boot: create the log and append.
//! let mut wal = Wal::create("/var/lib/node/wal", b"node-1".to_vec())?;
//! let state = HardState { term: 1, vote: 2, commit: 1 };
//! wal.save(state, &[Entry::new(1, 1, payload)])?;
//! wal.close()?;
//!
//! // Restart: replay from the last snapshot, then keep appending.
//! let (mut wal, recovered) = Wal::open("/var/lib/node/wal", Snapshot::new(0, 0))?.read_all()?;
//! apply(recovered.hard_state, recovered.entries);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
pub mod error;
mod lock;
pub mod record;
mod segment;
pub mod types;
mod wal;

pub use error::{Result, WalError};
pub use record::{Record, RecordType};
pub use types::{Entry, EntryType, HardState, Snapshot};
pub use wal::{OpenWal, Recovered, Wal, SEGMENT_SIZE_BYTES, WARN_SYNC_DURATION};
