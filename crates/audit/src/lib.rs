//! Audit stream vocabulary and the change-event aggregator.
//!
//! Every committed mutation of an order (or one of its child rows) appends
//! one `AuditLogEntry` per touched row. `timeline` folds that raw stream back
//! into a short list of user-facing events.

pub mod entry;
pub mod model;
pub mod timeline;

pub use entry::{AuditAction, AuditLogEntry, FieldMap};
pub use model::AuditModel;
pub use timeline::{
    ChangeKind, DEFAULT_GROUP_GAP_MILLIS, FieldChange, ItemChanges, TimelineEvent,
    TimelineOptions, build_timeline,
};
