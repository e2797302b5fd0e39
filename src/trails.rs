//! Trail file construction: a fixed-size TOC region and an append-only
//! bitstream region behind one seekable handle.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(not(unix))]
use std::io::{Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use log::info;

use crate::bits::BitBuffer;
use crate::edge::EdgeEncoder;
use crate::error::EncodeError;
use crate::event::Item;
use crate::grouped::GroupedReader;
use crate::model::huffman::Codemap;
use crate::model::{FieldStats, Gram, GramModel, GramScratch};

/// Bits reserved at the head of every trail: how many trailing bits of
/// the final byte are padding.
const RESIDUAL_BITS: u32 = 3;

/// A single entity's bitstream must stay below 2^32 bits.
const MAX_TRAIL_BITS: u64 = u32::MAX as u64;

/// Immutable entropy model shared read-only by every per-entity encode
/// step. Built once before the encode phase, never mutated during it.
#[derive(Debug)]
pub struct EncodeModel {
    pub grams: GramModel,
    pub codemap: Codemap,
    pub stats: FieldStats,
}

/// Trail output file. TOC slots are written at their fixed offsets
/// while bitstreams append past the reserved region; the single
/// handle relies on single-threaded callers.
#[derive(Debug)]
pub struct TrailFile {
    path: PathBuf,
    file: File,
    cursor: u64,
    num_entities: u64,
}

impl TrailFile {
    pub fn create(path: impl Into<PathBuf>, num_entities: u64) -> Result<Self, EncodeError> {
        let path = path.into();
        let toc_bytes = (num_entities + 1) * 4;
        if toc_bytes > u64::from(u32::MAX) {
            return Err(EncodeError::TrailFileTooLarge { offset: toc_bytes });
        }
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| EncodeError::Create {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file,
            cursor: toc_bytes,
            num_entities,
        })
    }

    /// Current end-of-bitstream offset; always fits a TOC slot.
    pub fn offset(&self) -> u32 {
        self.cursor as u32
    }

    pub fn write_toc_slot(&mut self, slot: u64, offset: u32) -> Result<(), EncodeError> {
        debug_assert!(slot <= self.num_entities);
        self.write_at(&offset.to_le_bytes(), slot * 4)?;
        Ok(())
    }

    /// Appends one entity's padded bitstream. Fails if the resulting
    /// offset no longer fits the u32 TOC.
    pub fn append_trail(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let next = advance_offset(self.cursor, bytes.len() as u64).ok_or(
            EncodeError::TrailFileTooLarge {
                offset: self.cursor + bytes.len() as u64,
            },
        )?;
        self.write_at(bytes, self.cursor)?;
        self.cursor = next;
        Ok(())
    }

    /// Writes the sentinel TOC slot and returns the final file size.
    pub fn finish(mut self) -> Result<u64, EncodeError> {
        let size = self.cursor;
        self.write_toc_slot(self.num_entities, size as u32)?;
        self.file.sync_all()?;
        Ok(size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_at(&mut self, payload: &[u8], offset: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.file.write_all_at(payload, offset)
        }
        #[cfg(not(unix))]
        {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(payload)
        }
    }
}

fn advance_offset(cursor: u64, len: u64) -> Option<u64> {
    let next = cursor.checked_add(len)?;
    (next <= u64::from(u32::MAX)).then_some(next)
}

/// Encodes every entity's trail from the grouped stream into `path`.
/// Entities appear in strictly increasing id order, one contiguous run
/// each; gaps (not expected from the grouper) still get monotonic TOC
/// slots. Returns the final trail file size in bytes.
pub fn encode_trails(
    items: &[Item],
    grouped: &mut GroupedReader,
    num_entities: u64,
    num_fields: usize,
    model: &EncodeModel,
    path: &Path,
) -> Result<u64, EncodeError> {
    let mut out = TrailFile::create(path, num_entities)?;
    let mut edge = EdgeEncoder::new(num_fields);
    let mut scratch = GramScratch::default();
    let mut grams: Vec<Gram> = Vec::new();
    let mut bits = BitBuffer::new();
    let mut next_slot: u64 = 0;

    let mut pending = grouped.next_record()?;
    while let Some(first) = pending.take() {
        let entity_id = first.entity_id;
        if entity_id < next_slot {
            return Err(EncodeError::GroupedStreamOrder {
                entity_id,
                expected: next_slot,
            });
        }
        if entity_id >= num_entities {
            return Err(EncodeError::EntityOutOfRange {
                entity_id,
                num_entities,
            });
        }
        while next_slot < entity_id {
            out.write_toc_slot(next_slot, out.offset())?;
            next_slot += 1;
        }
        out.write_toc_slot(entity_id, out.offset())?;
        next_slot = entity_id + 1;

        edge.reset();
        bits.clear();
        bits.write_bits(0, RESIDUAL_BITS);

        let mut record = first;
        loop {
            let encoded = edge.encode(items, &record);
            model.grams.choose_grams(&record, encoded, &mut scratch, &mut grams);
            model.codemap.encode_grams(&grams, &mut bits, &model.stats);
            if bits.len_bits() > MAX_TRAIL_BITS {
                return Err(EncodeError::TrailTooLong { entity_id });
            }
            match grouped.next_record()? {
                Some(next) if next.entity_id == entity_id => record = next,
                other => {
                    pending = other;
                    break;
                }
            }
        }

        let residual = bits.pad_to_byte();
        bits.patch_bits(0, u64::from(residual), RESIDUAL_BITS);
        out.append_trail(bits.as_bytes())?;
    }

    while next_slot < num_entities {
        out.write_toc_slot(next_slot, out.offset())?;
        next_slot += 1;
    }

    let size = out.finish()?;
    info!(
        "event=trail_encode_trails entities={} bytes={}",
        num_entities, size
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn offsets_stop_at_the_u32_ceiling() {
        assert_eq!(advance_offset(0, 16), Some(16));
        assert_eq!(
            advance_offset(u64::from(u32::MAX) - 1, 1),
            Some(u64::from(u32::MAX))
        );
        // one byte past 2^32 - 1 must refuse
        assert_eq!(advance_offset(u64::from(u32::MAX), 1), None);
    }

    #[test]
    fn append_past_ceiling_aborts_without_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trails.data");
        let mut out = TrailFile::create(&path, 1).unwrap();
        out.cursor = u64::from(u32::MAX);
        let err = out.append_trail(&[0xAA]).unwrap_err();
        assert!(matches!(err, EncodeError::TrailFileTooLarge { .. }));
        // nothing landed past the TOC region
        assert!(fs::metadata(&path).unwrap().len() <= 8);
    }

    #[test]
    fn toc_slots_and_appends_share_one_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trails.data");
        let mut out = TrailFile::create(&path, 2).unwrap();
        assert_eq!(out.offset(), 12);
        out.write_toc_slot(0, out.offset()).unwrap();
        out.append_trail(&[0xAB, 0xCD]).unwrap();
        out.write_toc_slot(1, out.offset()).unwrap();
        out.append_trail(&[0xEF]).unwrap();
        let size = out.finish().unwrap();
        assert_eq!(size, 15);

        let bytes = fs::read(&path).unwrap();
        let slot = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(slot(0), 12);
        assert_eq!(slot(1), 14);
        assert_eq!(slot(2), 15);
        assert_eq!(&bytes[12..], &[0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trails.data");
        fs::write(&path, b"stale").unwrap();
        let err = TrailFile::create(&path, 1).unwrap_err();
        assert!(matches!(err, EncodeError::Create { .. }));
    }
}
