//! Payload wire messages.
//!
//! These are the externally defined messages whose serialized forms travel
//! inside [`Record`](crate::record::Record) payloads: the consensus log
//! entry, the hard state, and the snapshot pointer. The field tags match the
//! established consensus wire format, so the bytes written here are readable
//! by any peer of that ecosystem. The log itself treats entry and hard-state
//! bytes as opaque; only the snapshot pointer's `index` and `term` are ever
//! inspected.

/// A single consensus log entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entry {
    /// What kind of entry this is.
    #[prost(enumeration = "EntryType", tag = "1")]
    pub entry_type: i32,
    /// The term in which the entry was proposed.
    #[prost(uint64, tag = "2")]
    pub term: u64,
    /// The entry's position in the log.
    #[prost(uint64, tag = "3")]
    pub index: u64,
    /// Opaque application payload.
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

/// The kind of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EntryType {
    /// An ordinary application command.
    Normal = 0,
    /// A cluster membership change.
    ConfChange = 1,
}

/// The consensus module's durable voting and commit state.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HardState {
    /// The current term.
    #[prost(uint64, tag = "1")]
    pub term: u64,
    /// The candidate voted for in the current term, or 0.
    #[prost(uint64, tag = "2")]
    pub vote: u64,
    /// The highest committed index.
    #[prost(uint64, tag = "3")]
    pub commit: u64,
}

/// A pointer to an externally persisted snapshot: the `(index, term)` pair
/// up to which the log has been compacted elsewhere.
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Snapshot {
    /// The last index covered by the snapshot.
    #[prost(uint64, tag = "1")]
    pub index: u64,
    /// The term of the entry at that index.
    #[prost(uint64, tag = "2")]
    pub term: u64,
}

impl Entry {
    /// A [`EntryType::Normal`] entry carrying `data` at `index` in `term`.
    #[must_use]
    pub fn new(term: u64, index: u64, data: Vec<u8>) -> Self {
        Self {
            entry_type: EntryType::Normal as i32,
            term,
            index,
            data,
        }
    }
}

impl HardState {
    /// True when no field has ever been set.
    ///
    /// Empty hard states are never persisted; `save` drops them instead of
    /// writing a meaningless record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.term == 0 && self.vote == 0 && self.commit == 0
    }
}

impl Snapshot {
    /// A pointer at `(index, term)`.
    #[must_use]
    pub const fn new(index: u64, term: u64) -> Self {
        Self { index, term }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn hard_state_emptiness() {
        assert!(HardState::default().is_empty());
        let hs = HardState {
            term: 1,
            vote: 0,
            commit: 0,
        };
        assert!(!hs.is_empty());
    }

    #[test]
    fn entry_defaults_to_normal() {
        let e = Entry::new(3, 7, vec![1, 2, 3]);
        assert_eq!(e.entry_type, EntryType::Normal as i32);
        assert_eq!(e.term, 3);
        assert_eq!(e.index, 7);
    }

    #[test]
    fn snapshot_wire_shape() {
        // Both fields are varint-encoded under tags 1 and 2.
        let bytes = Snapshot::new(5, 2).encode_to_vec();
        assert_eq!(bytes, vec![0x08, 0x05, 0x10, 0x02]);
        let back = Snapshot::decode(bytes.as_slice()).unwrap();
        assert_eq!(back, Snapshot::new(5, 2));
    }
}
