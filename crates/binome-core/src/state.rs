//! Shared sync state types.

/// Sync state published by the reconciliation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No remote table configured, or nothing attempted yet
    Offline,
    Syncing,
    Synced,
    /// The last cycle was aborted
    Error,
}
