//! Streaming record reader over a chain of segment files.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use prost::Message;

use crate::error::{Result, WalError};
use crate::record::{Record, RecordType};

/// Decodes framed records from the concatenation of one or more segment
/// files, validating the running CRC-32C chain as it goes.
///
/// A record cut off mid-write at the end of the stream is a torn write and
/// fails the chain: the caller sees the same `CrcMismatch` a flipped byte
/// would produce, and decides what to do with the intact prefix. A
/// truncated length prefix surfaces as an I/O error.
#[derive(Debug)]
pub(crate) struct Decoder {
    files: Vec<BufReader<File>>,
    idx: usize,
    crc: u32,
}

impl Decoder {
    /// Read records from `files` in order, with the chain seeded at 0.
    pub(crate) fn new(files: Vec<File>) -> Self {
        Self {
            files: files.into_iter().map(BufReader::new).collect(),
            idx: 0,
            crc: 0,
        }
    }

    /// The next record, or `None` once the stream is cleanly exhausted.
    ///
    /// Ordinary records advance the chain through their payload and are
    /// validated against it immediately; chain-commit records are handed to
    /// the caller untouched for validation and re-keying.
    pub(crate) fn decode(&mut self) -> Result<Option<Record>> {
        let body = loop {
            let Some(reader) = self.files.get_mut(self.idx) else {
                return Ok(None);
            };
            if reader.fill_buf()?.is_empty() {
                self.idx += 1;
                continue;
            }
            let len = reader.read_i64::<LittleEndian>()?;
            if len < 0 {
                return Err(
                    io::Error::new(io::ErrorKind::InvalidData, "negative record length").into(),
                );
            }
            let mut body = vec![0u8; len as usize];
            match reader.read_exact(&mut body) {
                Ok(()) => break body,
                // Fewer bytes than the prefix promised: a torn write.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(WalError::CrcMismatch)
                }
                Err(e) => return Err(e.into()),
            }
        };

        let rec = Record::decode(body.as_slice())?;
        if rec.record_type != i64::from(RecordType::Crc) {
            self.crc = crc32c::crc32c_append(self.crc, &rec.data);
            rec.validate(self.crc)?;
        }
        Ok(Some(rec))
    }

    /// Re-seed the running chain, starting a new epoch.
    ///
    /// Invoked by replay after validating a chain-commit record.
    pub(crate) fn update_crc(&mut self, crc: u32) {
        self.crc = crc;
    }

    /// The current chain value; seeds the encoder when the log transitions
    /// to append mode.
    pub(crate) fn last_crc(&self) -> u32 {
        self.crc
    }
}
