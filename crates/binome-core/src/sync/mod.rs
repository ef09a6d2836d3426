//! Reconciliation of the local replica with the remote tables.
//!
//! [`plan`] decides which remote rows to create, update or delete;
//! [`SyncEngine`] lists, plans and applies one cycle at a time, and
//! [`SyncScheduler`] debounces local mutations into cycles.

mod engine;
mod plan;
mod record;
mod scheduler;

pub use engine::{CollectionReport, SyncEngine, SyncReport, SyncScope, TableNames};
pub use plan::{
    plan, plan_indexed, plan_replace_all, DeleteReason, MatchKind, PlannedDelete, PlannedUpdate,
    SyncPlan, UpdatePolicy,
};
pub use record::{
    fields_diverge, normalize_key, SyncRecord, SyncStrategy, LOCAL_ID_FIELD, OWNER_FIELD,
    ZONE_ID_FIELD,
};
pub use scheduler::{SyncScheduler, DEFAULT_DEBOUNCE};
