//! Buffered record writer for the active segment.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use prost::Message;

use crate::error::Result;
use crate::record::{Record, RecordType};

/// Frames records onto the active segment file, carrying the running
/// CRC-32C chain.
///
/// Writes are buffered; [`Encoder::flush`] drains the buffer to the file.
/// The encoder never fsyncs, that is the log's responsibility.
#[derive(Debug)]
pub(crate) struct Encoder {
    out: BufWriter<File>,
    crc: u32,
}

impl Encoder {
    /// Wrap `file`, seeding the chain with the previous epoch's terminal
    /// CRC (0 for a brand-new log).
    pub(crate) fn new(file: File, prev_crc: u32) -> Self {
        Self {
            out: BufWriter::new(file),
            crc: prev_crc,
        }
    }

    /// Frame and buffer one ordinary record, advancing the chain through
    /// its payload.
    pub(crate) fn append(&mut self, rtype: RecordType, data: Vec<u8>) -> Result<()> {
        self.crc = crc32c::crc32c_append(self.crc, &data);
        let rec = Record {
            record_type: rtype.into(),
            crc: self.crc,
            data,
        };
        self.write_record(&rec)
    }

    /// Frame and buffer a chain-commit record.
    ///
    /// The record carries `prev_crc` verbatim and does not advance the
    /// running chain; its payload is empty.
    pub(crate) fn append_crc(&mut self, prev_crc: u32) -> Result<()> {
        let rec = Record {
            record_type: RecordType::Crc.into(),
            crc: prev_crc,
            data: Vec::new(),
        };
        self.write_record(&rec)
    }

    fn write_record(&mut self, rec: &Record) -> Result<()> {
        let body = rec.encode_to_vec();
        self.out.write_i64::<LittleEndian>(body.len() as i64)?;
        self.out.write_all(&body)?;
        Ok(())
    }

    /// Drain buffered frames to the file.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// The running chain value after the last appended record.
    pub(crate) fn crc(&self) -> u32 {
        self.crc
    }

    /// The segment file underneath the buffer.
    pub(crate) fn file(&self) -> &File {
        self.out.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn chain_advances_per_payload() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("seg")).unwrap();
        let mut enc = Encoder::new(file, 0);

        enc.append(RecordType::Metadata, b"meta".to_vec()).unwrap();
        let after_meta = enc.crc();
        assert_eq!(after_meta, crc32c::crc32c(b"meta"));

        enc.append(RecordType::Entry, b"entry".to_vec()).unwrap();
        assert_eq!(enc.crc(), crc32c::crc32c_append(after_meta, b"entry"));
    }

    #[test]
    fn crc_record_leaves_chain_alone() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("seg")).unwrap();
        let mut enc = Encoder::new(file, 77);

        enc.append_crc(77).unwrap();
        assert_eq!(enc.crc(), 77);
    }
}
