//! Entity grouping: backlink walk, per-entity time sort, timestamp
//! delta encoding with validity tagging, spill to the grouped stream.

use log::warn;

use crate::error::EncodeError;
use crate::event::Event;
use crate::grouped::{GroupedEvent, GroupedWriter};

/// Largest encodable gap between consecutive timestamps (~194 days).
/// Input is expected to be partitioned by time, so larger gaps almost
/// always mean a corrupted timestamp.
pub const MAX_TIMESTAMP_DELTA: u32 = (1 << 24) - 1;

/// Hard gate on the share of invalid-tagged records across the whole
/// run. Above this the data cannot be trusted.
pub const MAX_INVALID_RATIO: f64 = 0.005;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingReport {
    pub max_timestamp_delta: u32,
    pub invalid_events: u64,
    pub total_events: u64,
}

/// Spills one contiguous run of delta-encoded records per entity, in
/// increasing entity-id order. Fails if the invalid ratio exceeds
/// [`MAX_INVALID_RATIO`] after all entities are processed.
pub fn group_events(
    out: &mut GroupedWriter,
    events: &[Event],
    entity_pointers: &[u64],
    base_timestamp: u32,
) -> Result<GroupingReport, EncodeError> {
    let mut report = GroupingReport::default();
    let mut run: Vec<GroupedEvent> = Vec::new();

    for (entity_id, &head) in entity_pointers.iter().enumerate() {
        run.clear();
        let mut cursor = head as usize;
        loop {
            let event = &events[cursor];
            run.push(GroupedEvent {
                entity_id: entity_id as u64,
                item_zero: event.item_zero,
                num_items: event.num_items,
                timestamp: event.timestamp,
            });
            if event.prev_event_idx == 0 {
                break;
            }
            cursor = (event.prev_event_idx - 1) as usize;
        }

        run.sort_unstable_by_key(|record| record.timestamp);

        // The reference only advances past valid records, so a corrupted
        // timestamp does not poison the deltas that follow it.
        let mut reference = base_timestamp;
        for record in &mut run {
            let absolute = record.timestamp;
            let delta = absolute - reference;
            if delta <= MAX_TIMESTAMP_DELTA {
                report.max_timestamp_delta = report.max_timestamp_delta.max(delta);
                record.timestamp = delta << 8;
                reference = absolute;
            } else {
                record.timestamp = GroupedEvent::INVALID_TAG;
                report.invalid_events += 1;
            }
        }

        report.total_events += run.len() as u64;
        for record in &run {
            out.append(record)?;
        }
    }

    if report.total_events > 0 {
        let ratio = report.invalid_events as f64 / report.total_events as f64;
        if ratio > MAX_INVALID_RATIO {
            warn!(
                "event=trail_group_gate invalid={} total={} base_timestamp={}",
                report.invalid_events, report.total_events, base_timestamp
            );
            return Err(EncodeError::CorruptTimestamps {
                invalid: report.invalid_events,
                total: report.total_events,
            });
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouped::GroupedReader;
    use tempfile::tempdir;

    fn chain(timestamps: &[u32]) -> (Vec<Event>, Vec<u64>) {
        let mut events = Vec::new();
        let mut prev = 0u64;
        for &timestamp in timestamps {
            events.push(Event {
                timestamp,
                item_zero: 0,
                num_items: 0,
                prev_event_idx: prev,
            });
            prev = events.len() as u64;
        }
        let head = vec![events.len() as u64 - 1];
        (events, head)
    }

    fn group_to_records(
        events: &[Event],
        pointers: &[u64],
        base: u32,
    ) -> (Result<GroupingReport, EncodeError>, Vec<GroupedEvent>) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grouped");
        let mut writer = GroupedWriter::create(&path).unwrap();
        let result = group_events(&mut writer, events, pointers, base);
        writer.finish().unwrap();
        let mut reader = GroupedReader::open(&path).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        (result, records)
    }

    #[test]
    fn delta_encodes_sorted_run() {
        let (events, pointers) = chain(&[100, 100, 500]);
        let (result, records) = group_to_records(&events, &pointers, 100);
        let report = result.unwrap();
        let deltas: Vec<u32> = records.iter().map(GroupedEvent::delta).collect();
        assert_eq!(deltas, vec![0, 0, 400]);
        assert!(records.iter().all(GroupedEvent::is_valid));
        assert_eq!(report.max_timestamp_delta, 400);
        assert_eq!(report.total_events, 3);
    }

    #[test]
    fn oversized_delta_is_tagged() {
        // the spill is written before the whole-run gate fires, so the
        // tagged records can still be inspected alongside the error
        let corrupt = 100 + (1 << 25);
        let (events, pointers) = chain(&[100, corrupt, 700]);
        let (result, records) = group_to_records(&events, &pointers, 100);
        assert!(matches!(
            result,
            Err(EncodeError::CorruptTimestamps {
                invalid: 1,
                total: 3
            })
        ));
        assert_eq!(records[0].delta(), 0);
        assert_eq!(records[1].delta(), 600);
        assert!(!records[2].is_valid());
        assert_eq!(records[2].timestamp, GroupedEvent::INVALID_TAG);
    }

    #[test]
    fn invalid_records_do_not_advance_the_reference() {
        // two spikes 20s apart: if the first advanced the reference,
        // the second would come out as a small valid delta
        let spike = 100 + (1 << 25);
        let (events, pointers) = chain(&[100, spike, spike + 20]);
        let (result, records) = group_to_records(&events, &pointers, 100);
        assert!(result.is_err());
        assert!(records[0].is_valid());
        assert!(!records[1].is_valid());
        assert!(!records[2].is_valid());
    }

    #[test]
    fn gate_trips_above_half_percent() {
        let (events, pointers) = chain(&[100, 100 + (1 << 24)]);
        let (result, _) = group_to_records(&events, &pointers, 100);
        match result {
            Err(EncodeError::CorruptTimestamps { invalid, total }) => {
                assert_eq!(invalid, 1);
                assert_eq!(total, 2);
            }
            other => panic!("expected corrupt-timestamp gate, got {other:?}"),
        }
    }

    #[test]
    fn gate_admits_exactly_half_percent() {
        let mut timestamps = vec![100u32; 199];
        timestamps.push(100 + (1 << 24));
        let (events, pointers) = chain(&timestamps);
        let (result, records) = group_to_records(&events, &pointers, 100);
        let report = result.unwrap();
        assert_eq!(report.invalid_events, 1);
        assert_eq!(report.total_events, 200);
        assert_eq!(records.len(), 200);
    }

    #[test]
    fn entities_spill_in_id_order() {
        // two entities interleaved in the event array
        let events = vec![
            Event {
                timestamp: 10,
                item_zero: 0,
                num_items: 0,
                prev_event_idx: 0,
            },
            Event {
                timestamp: 20,
                item_zero: 0,
                num_items: 0,
                prev_event_idx: 0,
            },
            Event {
                timestamp: 30,
                item_zero: 0,
                num_items: 0,
                prev_event_idx: 1,
            },
        ];
        let pointers = vec![2, 1];
        let (result, records) = group_to_records(&events, &pointers, 10);
        result.unwrap();
        let ids: Vec<u64> = records.iter().map(|record| record.entity_id).collect();
        assert_eq!(ids, vec![0, 0, 1]);
        assert_eq!(records[0].delta(), 0);
        assert_eq!(records[1].delta(), 20);
        assert_eq!(records[2].delta(), 10);
    }
}
