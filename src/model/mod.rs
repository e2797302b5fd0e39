//! Statistical model for trail encoding: unigram and bigram frequency
//! collection over the grouped stream, greedy gram covering, and the
//! per-field bit widths used by the literal escape encoding.

pub mod huffman;

use std::collections::HashMap;

use log::info;

use crate::edge::EdgeEncoder;
use crate::error::EncodeError;
use crate::event::Item;
use crate::grouped::{GroupedEvent, GroupedReader};

/// A gram packs one item (low half, unigram) or two (bigram).
pub type Gram = u64;

/// Bigram population cap; keeps every retained bigram inside the
/// codemap so bigrams never need the literal escape path.
const MAX_BIGRAMS: usize = 1 << 15;

/// A bigram candidate must recur at least this often, and both halves
/// must be at least this frequent as unigrams, to earn a codeword.
const GRAM_SUPPORT_FLOOR: u64 = 2;

pub fn unigram(item: Item) -> Gram {
    u64::from(item.0)
}

pub fn bigram(first: Item, second: Item) -> Gram {
    u64::from(first.0) | u64::from(second.0) << 32
}

pub fn is_bigram(gram: Gram) -> bool {
    gram >> 32 != 0
}

/// Unigram frequencies over the grouped stream. Pass 1 of the model
/// build; mirrors the encode transform exactly (per-entity edge
/// encoding, timestamp item first), so the counts match what the trail
/// encoder will emit.
pub fn collect_unigrams(
    grouped: &mut GroupedReader,
    items: &[Item],
    num_fields: usize,
) -> Result<HashMap<Gram, u64>, EncodeError> {
    let mut freqs: HashMap<Gram, u64> = HashMap::new();
    let mut edge = EdgeEncoder::new(num_fields);
    let mut current_entity = None;

    while let Some(record) = grouped.next_record()? {
        if current_entity != Some(record.entity_id) {
            edge.reset();
            current_entity = Some(record.entity_id);
        }
        if !record.is_valid() {
            continue;
        }
        *freqs.entry(unigram(record.timestamp_item())).or_insert(0) += 1;
        for &item in edge.encode(items, &record) {
            *freqs.entry(unigram(item)).or_insert(0) += 1;
        }
    }
    Ok(freqs)
}

/// Gram frequency model: the unigram counts from pass 1 plus the
/// bigrams retained by pass 2.
#[derive(Debug)]
pub struct GramModel {
    unigrams: HashMap<Gram, u64>,
    bigrams: HashMap<Gram, u64>,
}

/// Pass 2: counts bigram candidates formed by adjacent item pairs
/// within one event (both halves frequent unigrams), then retains the
/// recurring ones up to [`MAX_BIGRAMS`].
pub fn make_grams(
    grouped: &mut GroupedReader,
    items: &[Item],
    num_fields: usize,
    unigrams: HashMap<Gram, u64>,
) -> Result<GramModel, EncodeError> {
    let mut candidates: HashMap<Gram, u64> = HashMap::new();
    let mut edge = EdgeEncoder::new(num_fields);
    let mut event_items: Vec<Item> = Vec::new();
    let mut current_entity = None;

    let frequent =
        |item: Item| unigrams.get(&unigram(item)).copied().unwrap_or(0) >= GRAM_SUPPORT_FLOOR;

    while let Some(record) = grouped.next_record()? {
        if current_entity != Some(record.entity_id) {
            edge.reset();
            current_entity = Some(record.entity_id);
        }
        if !record.is_valid() {
            continue;
        }
        event_items.clear();
        event_items.push(record.timestamp_item());
        event_items.extend_from_slice(edge.encode(items, &record));
        for pair in event_items.windows(2) {
            if frequent(pair[0]) && frequent(pair[1]) {
                *candidates.entry(bigram(pair[0], pair[1])).or_insert(0) += 1;
            }
        }
    }

    let candidate_count = candidates.len();
    let mut retained: Vec<(Gram, u64)> = candidates
        .into_iter()
        .filter(|&(_, count)| count >= GRAM_SUPPORT_FLOOR)
        .collect();
    retained.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    retained.truncate(MAX_BIGRAMS);

    info!(
        "event=trail_model_grams candidates={} retained={} unigrams={}",
        candidate_count,
        retained.len(),
        unigrams.len()
    );

    Ok(GramModel {
        unigrams,
        bigrams: retained.into_iter().collect(),
    })
}

impl GramModel {
    /// Greedy left-to-right cover of one event's items (timestamp item
    /// first, then the edge-encoded set) with retained bigrams,
    /// unigrams otherwise. Invalid records yield no grams.
    pub fn choose_grams(
        &self,
        record: &GroupedEvent,
        encoded: &[Item],
        scratch: &mut GramScratch,
        out: &mut Vec<Gram>,
    ) {
        out.clear();
        if !record.is_valid() {
            return;
        }
        scratch.items.clear();
        scratch.items.push(record.timestamp_item());
        scratch.items.extend_from_slice(encoded);

        let mut i = 0;
        while i < scratch.items.len() {
            if i + 1 < scratch.items.len() {
                let pair = bigram(scratch.items[i], scratch.items[i + 1]);
                if self.bigrams.contains_key(&pair) {
                    out.push(pair);
                    i += 2;
                    continue;
                }
            }
            out.push(unigram(scratch.items[i]));
            i += 1;
        }
    }

    /// Symbols eligible for codewords, with frequencies. Bigram counts
    /// come first so the codemap cap can never evict them.
    pub fn frequencies(&self) -> impl Iterator<Item = (Gram, u64)> + '_ {
        self.bigrams
            .iter()
            .chain(self.unigrams.iter())
            .map(|(&gram, &count)| (gram, count))
    }

    pub fn num_bigrams(&self) -> usize {
        self.bigrams.len()
    }
}

/// Reused per-event scratch for gram covering.
#[derive(Debug, Default)]
pub struct GramScratch {
    items: Vec<Item>,
}

/// Bit widths for the literal escape encoding: field-id width from the
/// field count, per-field value width from the field's cardinality,
/// timestamp width from the largest delta observed while grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStats {
    field_id_bits: u32,
    value_bits: Vec<u32>,
}

pub fn field_stats(field_cardinalities: &[u64], max_timestamp_delta: u32) -> FieldStats {
    let num_fields = field_cardinalities.len() + 1;
    let mut value_bits = Vec::with_capacity(num_fields);
    value_bits.push(bits_needed(u64::from(max_timestamp_delta)));
    for &cardinality in field_cardinalities {
        value_bits.push(bits_needed(cardinality));
    }
    FieldStats {
        field_id_bits: bits_needed(num_fields as u64 - 1),
        value_bits,
    }
}

impl FieldStats {
    pub fn field_id_bits(&self) -> u32 {
        self.field_id_bits
    }

    pub fn value_bits(&self, field: u8) -> u32 {
        self.value_bits[field as usize]
    }
}

fn bits_needed(max_value: u64) -> u32 {
    (64 - max_value.leading_zeros()).max(1)
}
