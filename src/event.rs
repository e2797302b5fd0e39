//! Input data model for one encode run.

/// A packed (field, value) pair. The field id lives in the low 8 bits,
/// the value id in the upper 24. Field 0 is reserved for timestamps:
/// a delta-encoded timestamp `d` packed as `d << 8` is a field-0 item,
/// which lets deltas share the gram alphabet with ordinary items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Item(pub u32);

impl Item {
    pub const TIMESTAMP_FIELD: u8 = 0;

    pub fn new(field: u8, value: u32) -> Self {
        Item(u32::from(field) | (value << 8))
    }

    pub fn field(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    pub fn value(self) -> u32 {
        self.0 >> 8
    }
}

/// One timestamped event. Events of the same entity form a
/// reverse-ordered singly-linked chain embedded in the flat event
/// array: `prev_event_idx` is a 1-based index of the temporally
/// earlier event, 0 ends the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u32,
    /// First index of this event's items in the flat item array.
    pub item_zero: u64,
    pub num_items: u32,
    pub prev_event_idx: u64,
}

impl Event {
    pub fn item_range(&self) -> std::ops::Range<usize> {
        let start = self.item_zero as usize;
        start..start + self.num_items as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_packs_field_and_value() {
        let item = Item::new(3, 77);
        assert_eq!(item.field(), 3);
        assert_eq!(item.value(), 77);
    }

    #[test]
    fn timestamp_delta_forms_field_zero_item() {
        let delta: u32 = 400;
        let item = Item(delta << 8);
        assert_eq!(item.field(), Item::TIMESTAMP_FIELD);
        assert_eq!(item.value(), delta);
    }
}
