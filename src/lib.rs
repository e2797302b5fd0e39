//! Write path of an immutable, columnar event-trail store.
//!
//! Given a flat array of timestamped per-entity events and a flattened
//! (field,value) item stream, [`encode`] produces per-entity
//! delta-encoded, entropy-coded trails addressable through a table of
//! offsets, plus the shared codebook needed to decode them. The
//! pipeline is single-threaded and disk-backed: events are grouped to
//! an intermediate spill file, the entropy model is built in two
//! passes over it, and the trails are written in a final pass.

pub mod bits;
pub mod edge;
pub mod encode;
pub mod error;
pub mod event;
pub mod grouped;
pub mod grouper;
pub mod layout;
pub mod model;
pub mod range;
pub mod trails;

pub use encode::{encode, EncodeSummary};
pub use error::EncodeError;
pub use event::{Event, Item};
pub use grouped::GroupedEvent;
pub use grouper::{GroupingReport, MAX_INVALID_RATIO, MAX_TIMESTAMP_DELTA};
pub use layout::{StoreLayout, StorePaths};
pub use trails::EncodeModel;
