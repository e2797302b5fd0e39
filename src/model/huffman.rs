//! Canonical Huffman code over the gram alphabet, plus the on-disk
//! codebook blob.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use log::info;

use super::{is_bigram, FieldStats, Gram, GramModel};
use crate::bits::BitBuffer;
use crate::event::Item;

/// Upper bound on codemapped symbols; everything else escapes to the
/// literal encoding.
pub const CODEBOOK_MAX_SYMBOLS: usize = 1 << 16;

/// Codeword lengths are bounded so a code always fits one u32.
const MAX_CODE_LENGTH: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codeword {
    /// Bit-reversed canonical code, so LSB-first emission puts the
    /// canonical bit order on the wire.
    pub bits: u32,
    pub length: u8,
}

#[derive(Debug, Default)]
pub struct Codemap {
    codes: HashMap<Gram, Codeword>,
}

/// Builds the canonical code over the most frequent grams. Every
/// retained bigram gets a codeword (the bigram population is capped
/// below [`CODEBOOK_MAX_SYMBOLS`]); unigrams fill the remaining
/// population by frequency.
pub fn build_codemap(model: &GramModel) -> Codemap {
    let (bigrams, mut unigrams): (Vec<_>, Vec<_>) =
        model.frequencies().partition(|&(gram, _)| is_bigram(gram));
    unigrams.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    unigrams.truncate(CODEBOOK_MAX_SYMBOLS - bigrams.len());

    let mut symbols = bigrams;
    symbols.extend(unigrams);
    if symbols.is_empty() {
        return Codemap::default();
    }

    let mut freqs: Vec<u64> = symbols.iter().map(|&(_, count)| count).collect();
    let lengths = loop {
        let lengths = code_lengths(&freqs);
        if lengths.iter().all(|&len| len <= MAX_CODE_LENGTH) {
            break lengths;
        }
        // flatten the distribution until the deepest leaf fits
        for freq in &mut freqs {
            *freq = (*freq >> 1).max(1);
        }
    };

    let mut order: Vec<usize> = (0..symbols.len()).collect();
    order.sort_unstable_by_key(|&i| (lengths[i], symbols[i].0));

    let mut codes = HashMap::with_capacity(symbols.len());
    let mut code: u64 = 0;
    let mut prev_len: u32 = 0;
    for &i in &order {
        let len = lengths[i];
        code <<= len - prev_len;
        codes.insert(
            symbols[i].0,
            Codeword {
                bits: reverse_low_bits(code as u32, len),
                length: len as u8,
            },
        );
        code += 1;
        prev_len = len;
    }

    info!("event=trail_model_codemap symbols={}", codes.len());
    Codemap { codes }
}

impl Codemap {
    pub fn get(&self, gram: Gram) -> Option<Codeword> {
        self.codes.get(&gram).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Emits each gram: flag bit 1 followed by its codeword, or flag
    /// bit 0 followed by the literal (field id, value) encoding. Only
    /// unigrams can take the literal path.
    pub fn encode_grams(&self, grams: &[Gram], out: &mut BitBuffer, stats: &FieldStats) {
        for &gram in grams {
            match self.codes.get(&gram) {
                Some(code) => {
                    out.write_bits(1, 1);
                    out.write_bits(u64::from(code.bits), u32::from(code.length));
                }
                None => {
                    debug_assert!(!is_bigram(gram));
                    let item = Item(gram as u32);
                    out.write_bits(0, 1);
                    out.write_bits(u64::from(item.field()), stats.field_id_bits());
                    out.write_bits(u64::from(item.value()), stats.value_bits(item.field()));
                }
            }
        }
    }
}

/// Self-contained codebook blob: LE entry count, then one
/// (symbol u64, code u32, length u8) record per codeword, sorted by
/// symbol. Opaque to the rest of the pipeline.
pub fn serialize_codebook(codemap: &Codemap) -> Vec<u8> {
    let mut entries: Vec<(&Gram, &Codeword)> = codemap.codes.iter().collect();
    entries.sort_unstable_by_key(|(&symbol, _)| symbol);

    let mut out = Vec::with_capacity(4 + entries.len() * 13);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (&symbol, code) in entries {
        out.extend_from_slice(&symbol.to_le_bytes());
        out.extend_from_slice(&code.bits.to_le_bytes());
        out.push(code.length);
    }
    out
}

/// Huffman code lengths by heap merge; ties break on insertion order
/// so the result is deterministic.
fn code_lengths(freqs: &[u64]) -> Vec<u32> {
    let n = freqs.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1];
    }

    let total = 2 * n - 1;
    let mut parents = vec![usize::MAX; total];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = freqs
        .iter()
        .enumerate()
        .map(|(i, &freq)| Reverse((freq, i)))
        .collect();

    let mut next = n;
    while heap.len() > 1 {
        let Reverse((first_freq, first)) = heap.pop().unwrap();
        let Reverse((second_freq, second)) = heap.pop().unwrap();
        parents[first] = next;
        parents[second] = next;
        heap.push(Reverse((first_freq + second_freq, next)));
        next += 1;
    }

    // parents are always created after their children, so a reverse
    // sweep sees every parent depth before its children
    let mut depths = vec![0u32; total];
    for i in (0..total - 1).rev() {
        depths[i] = depths[parents[i]] + 1;
    }
    depths.truncate(n);
    depths
}

fn reverse_low_bits(code: u32, length: u32) -> u32 {
    code.reverse_bits() >> (32 - length)
}
