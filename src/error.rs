//! Structured errors for the encode pipeline. Internal components
//! return results; only the caller of the orchestrator decides whether
//! to halt the run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not create {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no events to encode")]
    EmptyEvents,
    #[error("too many invalid timestamps: {invalid} of {total} records")]
    CorruptTimestamps { invalid: u64, total: u64 },
    #[error("trail file would reach {offset} bytes, past the 4 GiB offset ceiling")]
    TrailFileTooLarge { offset: u64 },
    #[error("trail bitstream for entity {entity_id} exceeds the per-entity bit ceiling")]
    TrailTooLong { entity_id: u64 },
    #[error("grouped stream out of order: entity {entity_id} after slot {expected}")]
    GroupedStreamOrder { entity_id: u64, expected: u64 },
    #[error("grouped stream names entity {entity_id}, but only {num_entities} entities were declared")]
    EntityOutOfRange { entity_id: u64, num_entities: u64 },
}
