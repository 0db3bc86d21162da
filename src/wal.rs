//! The write-ahead log state machine.
//!
//! A log is always in exactly one of two modes, and the modes are two
//! types: [`Wal`] appends, [`OpenWal`] replays. [`Wal::create`] produces an
//! appendable log with its first segment's header already on disk;
//! [`Wal::open`] produces an [`OpenWal`] whose [`read_all`](OpenWal::read_all)
//! consumes it, replays every record after the starting snapshot, and hands
//! back a [`Wal`] whose CRC chain continues seamlessly from the last record
//! read. The transition is one-way and happens exactly once.
//!
//! All mutating operations take `&mut self` or `self`: a single log is
//! single-writer and callers serialize access externally. The log performs
//! no internal locking of its own; the only locks here are the cross-process
//! advisory locks on the segment files.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use prost::Message;
use tracing::warn;

use crate::codec::{Decoder, Encoder};
use crate::error::{Result, WalError};
use crate::lock::FileLock;
use crate::record::RecordType;
use crate::segment::{check_wal_names, is_valid_seq, parse_wal_name, search_index, wal_name};
use crate::types::{Entry, HardState, Snapshot};

/// The owner can make and remove files inside the log directory.
const PRIVATE_DIR_MODE: u32 = 0o700;
/// Segment files are readable and writable by the owner only.
const SEGMENT_FILE_MODE: u32 = 0o600;

/// The segment size callers typically feed their rotation policy from.
///
/// Rotation itself is caller-driven: watch the write volume and invoke
/// [`Wal::cut`] when a segment outgrows this.
pub const SEGMENT_SIZE_BYTES: u64 = 64 * 1000 * 1000;

/// An fsync slower than this is reported through `tracing`.
pub const WARN_SYNC_DURATION: Duration = Duration::from_secs(1);

/// A write-ahead log in append mode.
///
/// Owns the open write file (through its encoder), the running CRC chain,
/// and one advisory lock per segment it has written and not yet released.
#[derive(Debug)]
pub struct Wal {
    dir: PathBuf,
    /// Recorded at the head of every segment; invariant across the log.
    metadata: Vec<u8>,
    /// The most recent non-empty hard state written by this instance.
    state: HardState,
    /// Highest entry index written, or advanced past by a snapshot.
    enti: u64,
    /// Sequence number of the active write segment.
    seq: u64,
    encoder: Encoder,
    /// Held segment locks, ordered by segment sequence.
    locks: Vec<FileLock>,
}

/// A write-ahead log opened for recovery.
///
/// Holds the decoder over every readable segment at or after the starting
/// snapshot, plus the last segment already opened for appending so the
/// transition in [`read_all`](OpenWal::read_all) cannot fail to find it.
#[derive(Debug)]
pub struct OpenWal {
    dir: PathBuf,
    /// The snapshot reading starts from.
    start: Snapshot,
    decoder: Decoder,
    /// The highest-numbered segment, opened append-only but untouched
    /// until the transition.
    file: File,
    seq: u64,
    locks: Vec<FileLock>,
}

/// Everything [`OpenWal::read_all`] recovered from the log.
#[derive(Debug, Clone)]
pub struct Recovered {
    /// The metadata recorded at the head of every segment.
    pub metadata: Vec<u8>,
    /// The last hard state in the log, or the empty state if none.
    pub hard_state: HardState,
    /// Entries after the starting snapshot, tail overwrites applied.
    pub entries: Vec<Entry>,
}

impl Wal {
    /// Whether a log directory already exists at `dir`.
    ///
    /// Callers use this on boot to choose between [`Wal::create`] and
    /// [`Wal::open`].
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        dir.as_ref().exists()
    }

    /// Create a fresh log under `dir`, which must not exist yet.
    ///
    /// `metadata` is recorded at the head of every segment and handed back
    /// by replay. The returned log is in append mode, holding the lock on
    /// segment zero, with the header records (`crc(0)`, metadata, an empty
    /// snapshot pointer) already fsynced.
    pub fn create(dir: impl AsRef<Path>, metadata: Vec<u8>) -> Result<Wal> {
        let dir = dir.as_ref();
        if dir.exists() {
            return Err(WalError::AlreadyExists {
                dir: dir.to_path_buf(),
            });
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(PRIVATE_DIR_MODE)
            .create(dir)?;

        let path = dir.join(wal_name(0, 0));
        let file = open_segment(&path)?;
        let lock = FileLock::new(&path)?;
        lock.lock()?;

        let mut wal = Wal {
            dir: dir.to_path_buf(),
            metadata,
            state: HardState::default(),
            enti: 0,
            seq: 0,
            encoder: Encoder::new(file, 0),
            locks: vec![lock],
        };
        wal.encoder.append_crc(0)?;
        let metadata = wal.metadata.clone();
        wal.encoder.append(RecordType::Metadata, metadata)?;
        wal.save_snapshot(Snapshot::default())?;
        Ok(wal)
    }

    /// Open the log at the snapshot `snap` for recovery.
    ///
    /// Every segment from the one covering `snap.index` onward must be
    /// present, strictly sequential, and lockable; a segment held by
    /// another process fails the open. The snapshot should have been saved
    /// to the log previously, or the following
    /// [`read_all`](OpenWal::read_all) will not find it.
    pub fn open(dir: impl AsRef<Path>, snap: Snapshot) -> Result<OpenWal> {
        Self::open_at(dir.as_ref(), snap, true)
    }

    /// Like [`Wal::open`], but skips the segments another process holds.
    ///
    /// Reading stops just before the first segment whose lock cannot be
    /// taken, so the replay sees a consistent prefix of the log while a
    /// producer keeps appending to the tail.
    pub fn open_not_in_use(dir: impl AsRef<Path>, snap: Snapshot) -> Result<OpenWal> {
        Self::open_at(dir.as_ref(), snap, false)
    }

    fn open_at(dir: &Path, snap: Snapshot, require_all: bool) -> Result<OpenWal> {
        let mut listing = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                listing.push(name.to_string());
            }
        }
        let names = check_wal_names(listing);
        let Some(last) = names.last() else {
            return Err(WalError::FileNotFound);
        };

        let name_index = search_index(&names, snap.index).ok_or(WalError::FileNotFound)?;
        let tail = &names[name_index..];
        if !is_valid_seq(tail) {
            return Err(WalError::FileNotFound);
        }

        // Open the tail segments for reading and take their locks.
        let mut files = Vec::new();
        let mut locks = Vec::new();
        for name in tail {
            let path = dir.join(name);
            let file = File::open(&path)?;
            let lock = FileLock::new(&path)?;
            match lock.try_lock() {
                Ok(()) => {
                    files.push(file);
                    locks.push(lock);
                }
                Err(err) if require_all => return Err(err.into()),
                Err(_) => {
                    warn!(segment = %name, "segment is in use, stopping the read tail before it");
                    break;
                }
            }
        }

        // The highest-numbered segment keeps taking appends after the
        // transition, whether or not its records were readable here.
        let (seq, _) = parse_wal_name(last).ok_or(WalError::FileNotFound)?;
        let file = OpenOptions::new().append(true).open(dir.join(last))?;

        Ok(OpenWal {
            dir: dir.to_path_buf(),
            start: snap,
            decoder: Decoder::new(files),
            file,
            seq,
            locks,
        })
    }

    /// Durably append a hard state and a batch of entries.
    ///
    /// An empty hard state is skipped; entries are written in order. The
    /// call returns only after everything is flushed and fsynced, so a
    /// successful return means the records are on stable storage. A failed
    /// call may leave a partial suffix on disk; the CRC chain catches it on
    /// the next replay.
    pub fn save(&mut self, state: HardState, entries: &[Entry]) -> Result<()> {
        self.save_state(&state)?;
        for entry in entries {
            self.save_entry(entry)?;
        }
        self.sync()
    }

    /// Durably record a snapshot pointer.
    ///
    /// Advances the last-index watermark when the snapshot is ahead of
    /// every entry written so far.
    pub fn save_snapshot(&mut self, snap: Snapshot) -> Result<()> {
        self.encoder
            .append(RecordType::Snapshot, snap.encode_to_vec())?;
        if self.enti < snap.index {
            self.enti = snap.index;
        }
        self.sync()
    }

    /// Roll over to a new segment, preserving the CRC chain.
    ///
    /// The new segment is named `(seq+1, enti+1)`: its first-index half is
    /// a lower bound on the next entry written. Its lock is taken before
    /// the old segment is synced and closed, so the log never drops
    /// cross-process protection over its active tail. The new header is
    /// `crc(prev)`, the metadata, and the current hard state; the
    /// last-known snapshot pointer is not part of it, so callers that need
    /// it recoverable mid-segment follow up with [`Wal::save_snapshot`].
    pub fn cut(&mut self) -> Result<()> {
        let path = self.dir.join(wal_name(self.seq + 1, self.enti + 1));
        let file = open_segment(&path)?;
        let lock = FileLock::new(&path)?;
        lock.lock()?;
        self.locks.push(lock);

        // Finish the old segment on disk before any byte goes to the new one.
        self.sync()?;

        let prev_crc = self.encoder.crc();
        self.encoder = Encoder::new(file, prev_crc);
        self.seq += 1;

        self.encoder.append_crc(prev_crc)?;
        let metadata = self.metadata.clone();
        self.encoder.append(RecordType::Metadata, metadata)?;
        let state = self.state.clone();
        self.save_state(&state)?;
        self.sync()
    }

    /// Release every held lock whose segment's first index is at or below
    /// `index`, stopping at the first one beyond it.
    ///
    /// Invoked once a snapshot covering `index` has been persisted
    /// elsewhere, so readers may take over the released segments. The
    /// comparison is inclusive: when the active segment's first index falls
    /// at or below `index` its lock is released too; this instance keeps
    /// appending through its open descriptor regardless.
    pub fn release_lock_to(&mut self, index: u64) -> Result<()> {
        while let Some(lock) = self.locks.first() {
            let first_index = lock
                .path()
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_wal_name)
                .map(|(_, first)| first)
                .ok_or(WalError::FileNotFound)?;
            if first_index > index {
                break;
            }
            let lock = self.locks.remove(0);
            lock.unlock()?;
            lock.destroy();
        }
        Ok(())
    }

    /// Flush and fsync the active segment, close it, and give up every
    /// held lock.
    ///
    /// A lock that fails to release is reported and skipped; teardown of
    /// the rest continues.
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        let Wal { encoder, locks, .. } = self;
        // Close the write file before surrendering the locks.
        drop(encoder);
        for lock in locks {
            if let Err(err) = lock.unlock() {
                warn!(
                    segment = %lock.path().display(),
                    error = %err,
                    "failed to unlock segment during close"
                );
            }
            lock.destroy();
        }
        Ok(())
    }

    fn save_entry(&mut self, entry: &Entry) -> Result<()> {
        self.encoder
            .append(RecordType::Entry, entry.encode_to_vec())?;
        self.enti = entry.index;
        Ok(())
    }

    fn save_state(&mut self, state: &HardState) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }
        self.state = state.clone();
        self.encoder
            .append(RecordType::State, state.encode_to_vec())
    }

    /// The durability boundary: drain the encoder and fsync the segment.
    fn sync(&mut self) -> Result<()> {
        self.encoder.flush()?;
        let started = Instant::now();
        self.encoder.file().sync_all()?;
        let took = started.elapsed();
        if took > WARN_SYNC_DURATION {
            warn!(took_ms = took.as_millis() as u64, "slow fsync on wal segment");
        }
        Ok(())
    }
}

impl OpenWal {
    /// Replay every record after the starting snapshot and transition to
    /// append mode.
    ///
    /// Entries before the start are skipped; a later entry at index `i`
    /// supersedes anything previously read at `i` or beyond, which is how
    /// replay tolerates leader-change overwrites. Hard states are
    /// last-writer-wins. Metadata must agree across segments. Each
    /// chain-commit record is checked against the running CRC and re-keys
    /// it for the next segment's epoch.
    ///
    /// On a clean end of stream the returned [`Wal`] is appendable, its
    /// encoder seeded with the final CRC read so the chain continues
    /// unbroken. If the starting snapshot never appeared, the same log and
    /// records come back inside [`WalError::SnapshotNotFound`]. Any other
    /// failure discards the partial read entirely.
    pub fn read_all(mut self) -> Result<(Wal, Recovered)> {
        let mut metadata: Option<Vec<u8>> = None;
        let mut state = HardState::default();
        let mut entries: Vec<Entry> = Vec::new();
        let mut enti = 0;
        let mut matched = false;

        while let Some(rec) = self.decoder.decode()? {
            match RecordType::try_from(rec.record_type) {
                Ok(RecordType::Entry) => {
                    let entry = Entry::decode(rec.data.as_slice())?;
                    enti = entry.index;
                    if entry.index > self.start.index {
                        // A rewrite at this index truncates whatever was
                        // read beyond it.
                        entries.truncate((entry.index - self.start.index - 1) as usize);
                        entries.push(entry);
                    }
                }
                Ok(RecordType::State) => {
                    state = HardState::decode(rec.data.as_slice())?;
                }
                Ok(RecordType::Metadata) => {
                    if let Some(prev) = &metadata {
                        if *prev != rec.data {
                            return Err(WalError::MetadataConflict);
                        }
                    }
                    metadata = Some(rec.data);
                }
                Ok(RecordType::Crc) => {
                    let crc = self.decoder.last_crc();
                    // A fresh decoder still carries seed 0 and has nothing
                    // to match yet.
                    if crc != 0 {
                        rec.validate(crc)?;
                    }
                    self.decoder.update_crc(rec.crc);
                }
                Ok(RecordType::Snapshot) => {
                    let snap = Snapshot::decode(rec.data.as_slice())?;
                    if snap.index == self.start.index {
                        if snap.term != self.start.term {
                            return Err(WalError::SnapshotMismatch);
                        }
                        matched = true;
                    }
                }
                Err(code) => return Err(WalError::UnexpectedRecordType(code)),
            }
        }

        // Reading is done; chain the append epoch off the final CRC read.
        let metadata = metadata.unwrap_or_default();
        let wal = Wal {
            dir: self.dir,
            metadata: metadata.clone(),
            state: HardState::default(),
            enti,
            seq: self.seq,
            encoder: Encoder::new(self.file, self.decoder.last_crc()),
            locks: self.locks,
        };
        let recovered = Recovered {
            metadata,
            hard_state: state,
            entries,
        };
        if !matched {
            return Err(WalError::SnapshotNotFound {
                wal: Box::new(wal),
                recovered,
            });
        }
        Ok((wal, recovered))
    }
}

fn open_segment(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(SEGMENT_FILE_MODE)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(range: std::ops::RangeInclusive<u64>, term: u64) -> Vec<Entry> {
        range.map(|i| Entry::new(term, i, vec![i as u8])).collect()
    }

    #[test]
    fn create_refuses_existing_directory() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("wal");
        let wal = Wal::create(&dir, b"meta".to_vec()).unwrap();
        wal.close().unwrap();

        assert!(Wal::exists(&dir));
        assert!(matches!(
            Wal::create(&dir, b"meta".to_vec()),
            Err(WalError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn create_lays_down_segment_zero() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("wal");
        let wal = Wal::create(&dir, Vec::new()).unwrap();
        assert!(dir.join(wal_name(0, 0)).is_file());
        assert_eq!(wal.seq, 0);
        assert_eq!(wal.enti, 0);
        assert_eq!(wal.locks.len(), 1);
        wal.close().unwrap();
    }

    #[test]
    fn cut_names_next_segment_past_last_index() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("wal");
        let mut wal = Wal::create(&dir, Vec::new()).unwrap();
        wal.save(HardState::default(), &entries(1..=3, 1)).unwrap();
        wal.cut().unwrap();

        assert_eq!(wal.seq, 1);
        assert!(dir.join(wal_name(1, 4)).is_file());
        assert_eq!(wal.locks.len(), 2);
        wal.close().unwrap();
    }

    #[test]
    fn release_lock_to_releases_exactly_the_covered_prefix() {
        let tmp = tempdir().unwrap();
        let mut wal = Wal::create(tmp.path().join("wal"), Vec::new()).unwrap();
        wal.save(HardState::default(), &entries(1..=3, 1)).unwrap();
        wal.cut().unwrap(); // first index 4
        wal.save(HardState::default(), &entries(4..=6, 1)).unwrap();
        wal.cut().unwrap(); // first index 7
        assert_eq!(wal.locks.len(), 3);

        wal.release_lock_to(5).unwrap();
        let remaining: Vec<u64> = wal
            .locks
            .iter()
            .map(|l| {
                let name = l.path().file_name().unwrap().to_str().unwrap();
                parse_wal_name(name).unwrap().1
            })
            .collect();
        assert_eq!(remaining, vec![7]);
        wal.close().unwrap();
    }

    #[test]
    fn release_lock_to_may_release_the_active_segment() {
        // The comparator is inclusive, so a snapshot index at or past the
        // active segment's first index releases its lock as well.
        let tmp = tempdir().unwrap();
        let mut wal = Wal::create(tmp.path().join("wal"), Vec::new()).unwrap();
        wal.save(HardState::default(), &entries(1..=2, 1)).unwrap();
        wal.release_lock_to(2).unwrap();
        assert!(wal.locks.is_empty());
        wal.close().unwrap();
    }

    #[test]
    fn read_all_is_one_way() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("wal");
        Wal::create(&dir, Vec::new()).unwrap().close().unwrap();

        let opened = Wal::open(&dir, Snapshot::default()).unwrap();
        let (wal, _) = opened.read_all().unwrap();
        // The returned log appends immediately; no second read is possible
        // because the reading half was consumed.
        let mut wal = wal;
        wal.save(HardState::default(), &entries(1..=1, 1)).unwrap();
        wal.close().unwrap();
    }
}
