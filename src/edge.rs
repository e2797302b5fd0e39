//! Edge encoding: emit only the (field,value) pairs that changed since
//! the entity's previous event.

use crate::event::Item;
use crate::grouped::GroupedEvent;

/// Per-entity edge encoder. Owns the last-seen-item-per-field table and
/// a reused output buffer; neither shrinks within an encode run.
#[derive(Debug)]
pub struct EdgeEncoder {
    last_seen: Vec<Item>,
    encoded: Vec<Item>,
}

impl EdgeEncoder {
    pub fn new(num_fields: usize) -> Self {
        Self {
            last_seen: vec![Item(0); num_fields],
            encoded: Vec::new(),
        }
    }

    /// Clears the last-seen table. Must run between entities; this is
    /// what limits an entity's state to its own trail.
    pub fn reset(&mut self) {
        self.last_seen.fill(Item(0));
    }

    /// Edge-encodes one event's items. Invalid records emit nothing and
    /// leave the table unchanged.
    pub fn encode(&mut self, items: &[Item], record: &GroupedEvent) -> &[Item] {
        self.encoded.clear();
        if !record.is_valid() {
            return &self.encoded;
        }
        let start = record.item_zero as usize;
        let end = start + record.num_items as usize;
        for &item in &items[start..end] {
            let field = item.field() as usize;
            if self.last_seen[field] != item {
                self.last_seen[field] = item;
                self.encoded.push(item);
            }
        }
        &self.encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(item_zero: u64, num_items: u32, timestamp: u32) -> GroupedEvent {
        GroupedEvent {
            entity_id: 0,
            item_zero,
            num_items,
            timestamp,
        }
    }

    #[test]
    fn drops_unchanged_fields() {
        let items = vec![
            Item::new(1, 1),
            Item::new(1, 1),
            Item::new(1, 2),
        ];
        let mut edge = EdgeEncoder::new(2);
        assert_eq!(edge.encode(&items, &record(0, 1, 0)), &[Item::new(1, 1)]);
        assert_eq!(edge.encode(&items, &record(1, 1, 0)), &[] as &[Item]);
        assert_eq!(edge.encode(&items, &record(2, 1, 0)), &[Item::new(1, 2)]);
    }

    #[test]
    fn invalid_records_leave_table_untouched() {
        let items = vec![Item::new(1, 5), Item::new(1, 5)];
        let mut edge = EdgeEncoder::new(2);
        assert_eq!(
            edge.encode(&items, &record(0, 1, GroupedEvent::INVALID_TAG)),
            &[] as &[Item]
        );
        // first valid sighting still counts as a change
        assert_eq!(edge.encode(&items, &record(1, 1, 0)), &[Item::new(1, 5)]);
    }

    #[test]
    fn reset_isolates_entities() {
        let items = vec![Item::new(1, 3)];
        let mut edge = EdgeEncoder::new(2);
        let first = edge.encode(&items, &record(0, 1, 0)).to_vec();
        edge.reset();
        let second = edge.encode(&items, &record(0, 1, 0)).to_vec();
        assert_eq!(first, second);
        assert_eq!(second, vec![Item::new(1, 3)]);
    }
}
