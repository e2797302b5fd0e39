//! Orchestrates one encode run: range scan, grouped spill, model
//! build, trail encoding, codebook persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};

use crate::error::EncodeError;
use crate::event::{Event, Item};
use crate::grouped::{GroupedReader, GroupedWriter};
use crate::grouper;
use crate::layout::StoreLayout;
use crate::model::{self, huffman};
use crate::range;
use crate::trails::{self, EncodeModel};

/// Summary of one successful encode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    pub num_entities: u64,
    pub num_events: u64,
    pub min_timestamp: u32,
    pub max_timestamp: u32,
    pub max_timestamp_delta: u32,
    pub invalid_events: u64,
    pub trail_bytes: u64,
    pub codebook_bytes: u64,
}

/// Removes the grouped spill file when the run leaves scope, so error
/// returns clean up too. Best-effort only.
struct SpillGuard {
    path: PathBuf,
}

impl Drop for SpillGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(
                "event=trail_encode_spill_cleanup_failed path={:?} error={}",
                self.path, err
            );
        }
    }
}

/// Encodes the full event set into a trail store rooted at `root`.
///
/// `events` is taken by value: the array dominates memory and is
/// dropped as soon as the grouped spill file is durable. `items` is
/// the flat item stream addressed by each event's `item_range`.
/// `field_cardinalities` covers fields `1..`; field 0 is the
/// timestamp. Any error leaves the output directory in an undefined
/// state and callers must discard it.
pub fn encode(
    events: Vec<Event>,
    entity_pointers: &[u64],
    items: &[Item],
    field_cardinalities: &[u64],
    root: &Path,
) -> Result<EncodeSummary, EncodeError> {
    if events.is_empty() || entity_pointers.is_empty() {
        return Err(EncodeError::EmptyEvents);
    }

    let layout = StoreLayout::new(root);
    layout.ensure()?;
    let paths = layout.paths();
    let num_entities = entity_pointers.len() as u64;
    let num_events = events.len() as u64;
    let num_fields = field_cardinalities.len() + 1;

    let phase = Instant::now();
    let (min_timestamp, max_timestamp) = range::timestamp_range(&events);
    info!(
        "event=trail_encode_phase phase=timestamp_range elapsed_ms={} min={} max={}",
        phase.elapsed().as_millis(),
        min_timestamp,
        max_timestamp
    );

    let phase = Instant::now();
    let spill_path = layout.grouped_spill();
    let mut writer = GroupedWriter::create(&spill_path).map_err(|source| EncodeError::Create {
        path: spill_path.clone(),
        source,
    })?;
    let _spill = SpillGuard {
        path: spill_path.clone(),
    };
    let report = grouper::group_events(&mut writer, &events, entity_pointers, min_timestamp)?;
    writer.finish()?;
    info!(
        "event=trail_encode_phase phase=group_events elapsed_ms={} entities={} events={} invalid={}",
        phase.elapsed().as_millis(),
        num_entities,
        report.total_events,
        report.invalid_events
    );

    // the raw event array is not needed past the spill; freeing it here
    // keeps peak memory to one copy of the dataset
    drop(events);

    store_info(
        &paths.info,
        num_entities,
        num_events,
        min_timestamp,
        max_timestamp,
        report.max_timestamp_delta,
    )?;

    let mut grouped = GroupedReader::open(&spill_path)?;

    let phase = Instant::now();
    let unigrams = model::collect_unigrams(&mut grouped, items, num_fields)?;
    info!(
        "event=trail_encode_phase phase=collect_unigrams elapsed_ms={} symbols={}",
        phase.elapsed().as_millis(),
        unigrams.len()
    );

    let phase = Instant::now();
    grouped.rewind()?;
    let grams = model::make_grams(&mut grouped, items, num_fields, unigrams)?;
    let codemap = huffman::build_codemap(&grams);
    let stats = model::field_stats(field_cardinalities, report.max_timestamp_delta);
    let model = EncodeModel {
        grams,
        codemap,
        stats,
    };
    info!(
        "event=trail_encode_phase phase=build_model elapsed_ms={} codewords={}",
        phase.elapsed().as_millis(),
        model.codemap.len()
    );

    let phase = Instant::now();
    grouped.rewind()?;
    let trail_bytes = trails::encode_trails(
        items,
        &mut grouped,
        num_entities,
        num_fields,
        &model,
        &paths.trails,
    )?;
    info!(
        "event=trail_encode_phase phase=encode_trails elapsed_ms={} bytes={}",
        phase.elapsed().as_millis(),
        trail_bytes
    );

    let codebook = huffman::serialize_codebook(&model.codemap);
    fs::write(&paths.codebook, &codebook).map_err(|source| EncodeError::Create {
        path: paths.codebook.clone(),
        source,
    })?;

    info!(
        "event=trail_encode_done entities={} events={} trail_bytes={} codebook_bytes={}",
        num_entities,
        num_events,
        trail_bytes,
        codebook.len()
    );

    Ok(EncodeSummary {
        num_entities,
        num_events,
        min_timestamp,
        max_timestamp,
        max_timestamp_delta: report.max_timestamp_delta,
        invalid_events: report.invalid_events,
        trail_bytes,
        codebook_bytes: codebook.len() as u64,
    })
}

/// Single-line whitespace-separated metadata file.
fn store_info(
    path: &Path,
    num_entities: u64,
    num_events: u64,
    min_timestamp: u32,
    max_timestamp: u32,
    max_timestamp_delta: u32,
) -> Result<(), EncodeError> {
    let line = format!(
        "{num_entities} {num_events} {min_timestamp} {max_timestamp} {max_timestamp_delta}\n"
    );
    fs::write(path, line).map_err(|source| EncodeError::Create {
        path: path.to_path_buf(),
        source,
    })
}
