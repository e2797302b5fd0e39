//! Intermediate grouped-event record and its spill-file I/O.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::event::Item;

/// Number of grouped records one sequential re-read buffers at a time.
/// The spill file is consumed by two model passes plus the encode pass,
/// so reads are amortized with a large fixed-size buffer.
pub const READ_BUFFER_RECORDS: usize = 1_000_000;

const READ_BUFFER_BYTES: usize = READ_BUFFER_RECORDS * GroupedEvent::ENCODED_LEN;
const WRITE_BUFFER_BYTES: usize = 1 << 20;

/// One event after grouping, ordered by entity id on disk.
///
/// `timestamp` is the tagged delta: the low 8 bits are the validity tag
/// (0 valid, nonzero invalid), the upper 24 bits the delta in seconds
/// from the previous valid timestamp of the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupedEvent {
    pub entity_id: u64,
    pub item_zero: u64,
    pub num_items: u32,
    pub timestamp: u32,
}

impl GroupedEvent {
    pub const ENCODED_LEN: usize = 24;
    /// Sentinel stored in place of a delta that does not fit 24 bits.
    pub const INVALID_TAG: u32 = 1;

    pub fn is_valid(&self) -> bool {
        self.timestamp & 0xff == 0
    }

    pub fn delta(&self) -> u32 {
        self.timestamp >> 8
    }

    /// The tagged delta reinterpreted as a field-0 item. Only meaningful
    /// for valid records.
    pub fn timestamp_item(&self) -> Item {
        Item(self.timestamp)
    }

    pub fn encode_into(&self, out: &mut [u8; Self::ENCODED_LEN]) {
        out[0..8].copy_from_slice(&self.entity_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.item_zero.to_le_bytes());
        out[16..20].copy_from_slice(&self.num_items.to_le_bytes());
        out[20..24].copy_from_slice(&self.timestamp.to_le_bytes());
    }

    pub fn decode(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        Self {
            entity_id: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            item_zero: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            num_items: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            timestamp: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
        }
    }
}

/// Buffered sequential writer for the grouped spill file.
#[derive(Debug)]
pub struct GroupedWriter {
    inner: BufWriter<File>,
}

impl GroupedWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
        })
    }

    pub fn append(&mut self, record: &GroupedEvent) -> io::Result<()> {
        let mut bytes = [0u8; GroupedEvent::ENCODED_LEN];
        record.encode_into(&mut bytes);
        self.inner.write_all(&bytes)
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Buffered sequential reader over the grouped spill file. Rewindable,
/// so the same handle serves every pass.
#[derive(Debug)]
pub struct GroupedReader {
    inner: BufReader<File>,
}

impl GroupedReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            inner: BufReader::with_capacity(READ_BUFFER_BYTES, file),
        })
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> io::Result<Option<GroupedEvent>> {
        let mut bytes = [0u8; GroupedEvent::ENCODED_LEN];
        match self.inner.read_exact(&mut bytes) {
            Ok(()) => Ok(Some(GroupedEvent::decode(&bytes))),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }
}
