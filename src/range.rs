//! Global timestamp range scan.

use crate::event::Event;

/// Minimum and maximum timestamp over the full event array. The
/// orchestrator rejects empty input before calling this.
pub fn timestamp_range(events: &[Event]) -> (u32, u32) {
    let mut min = u32::MAX;
    let mut max = 0;
    for event in events {
        min = min.min(event.timestamp);
        max = max.max(event.timestamp);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(timestamp: u32) -> Event {
        Event {
            timestamp,
            item_zero: 0,
            num_items: 0,
            prev_event_idx: 0,
        }
    }

    #[test]
    fn finds_min_and_max() {
        let events = vec![event_at(500), event_at(100), event_at(250)];
        assert_eq!(timestamp_range(&events), (100, 500));
    }

    #[test]
    fn single_event_collapses_range() {
        assert_eq!(timestamp_range(&[event_at(42)]), (42, 42));
    }
}
