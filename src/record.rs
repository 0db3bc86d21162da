//! Record framing.
//!
//! Every unit in a segment file is one [`Record`]: a typed envelope whose
//! `crc` field participates in the per-file CRC-32C chain. Records are
//! serialized with the field-tagged varint wire format of the consensus
//! ecosystem and written length-prefixed by the codec.

use crate::error::{Result, WalError};

/// A framed, typed unit within a segment.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    /// Type code; see [`RecordType`].
    #[prost(int64, tag = "1")]
    pub record_type: i64,
    /// For ordinary records, the running chain CRC updated through this
    /// record's `data`; for [`RecordType::Crc`] records, the previous
    /// epoch's terminal value.
    #[prost(uint32, tag = "2")]
    pub crc: u32,
    /// Opaque payload bytes; empty for [`RecordType::Crc`] records.
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

impl Record {
    /// Check the stored checksum against the chain value `crc`.
    pub fn validate(&self, crc: u32) -> Result<()> {
        if self.crc == crc {
            Ok(())
        } else {
            Err(WalError::CrcMismatch)
        }
    }
}

/// Type codes carried in [`Record::record_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum RecordType {
    /// Application-chosen metadata; the first payload record of every
    /// segment, identical across all segments of one log.
    Metadata = 1,
    /// A serialized log entry.
    Entry = 2,
    /// A serialized hard state.
    State = 3,
    /// Chain commit: carries the previous epoch's terminal CRC and re-keys
    /// the chain.
    Crc = 4,
    /// A serialized snapshot pointer.
    Snapshot = 5,
}

impl TryFrom<i64> for RecordType {
    type Error = i64;

    fn try_from(value: i64) -> std::result::Result<Self, i64> {
        match value {
            1 => Ok(Self::Metadata),
            2 => Ok(Self::Entry),
            3 => Ok(Self::State),
            4 => Ok(Self::Crc),
            5 => Ok(Self::Snapshot),
            other => Err(other),
        }
    }
}

impl From<RecordType> for i64 {
    fn from(t: RecordType) -> i64 {
        t as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn record_type_roundtrip() {
        for t in [
            RecordType::Metadata,
            RecordType::Entry,
            RecordType::State,
            RecordType::Crc,
            RecordType::Snapshot,
        ] {
            assert_eq!(RecordType::try_from(i64::from(t)), Ok(t));
        }
        assert_eq!(RecordType::try_from(0), Err(0));
        assert_eq!(RecordType::try_from(6), Err(6));
    }

    #[test]
    fn validate_checks_stored_crc() {
        let rec = Record {
            record_type: RecordType::Entry.into(),
            crc: 0xDEAD_BEEF,
            data: vec![1, 2, 3],
        };
        assert!(rec.validate(0xDEAD_BEEF).is_ok());
        assert!(matches!(
            rec.validate(0xDEAD_BEF0),
            Err(WalError::CrcMismatch)
        ));
    }

    #[test]
    fn wire_roundtrip() {
        let rec = Record {
            record_type: RecordType::Snapshot.into(),
            crc: 42,
            data: vec![0x08, 0x00],
        };
        let bytes = rec.encode_to_vec();
        let back = Record::decode(bytes.as_slice()).unwrap();
        assert_eq!(back, rec);
    }
}
