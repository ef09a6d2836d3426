//! Reconciliation planning.
//!
//! A plan is always computed fresh from the current local records and the
//! current remote rows, never from a stored diff, so recomputing after a
//! partial failure is safe.
//!
//! Indexed matching, per local record in replica order:
//! 1. the first unclaimed remote row whose embedded local id equals the
//!    record id;
//! 2. otherwise the first unclaimed remote row without a local id whose
//!    fallback key equals the record's (remote list order breaks ties).
//!
//! A claimed row is never reused. Matched rows are updated, unmatched
//! records are created. Unclaimed remote rows are deleted when their local
//! id is unknown locally, when another row already claimed the same local
//! id, or, for rows without a local id, when no local record shares their
//! fallback key.

use std::collections::{HashMap, HashSet};

use super::record::{fields_diverge, remote_fallback_key, remote_local_id, SyncRecord, SyncStrategy};
use crate::gateway::RemoteRecord;

/// When a matched remote row is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Only rows whose mirrored fields differ from the local record
    #[default]
    Divergent,
    /// Every matched row, even when nothing changed
    Always,
}

/// How a local record found its remote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    LocalId,
    /// Adopted through the natural key; the update writes the local id
    Fallback,
}

/// Why a remote row is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    /// No local record corresponds to the row anymore
    Orphaned,
    /// Another row already mirrors the same local record
    Duplicate,
    /// Part of a full-table replacement
    Replaced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate<R> {
    pub remote_id: String,
    pub matched_by: MatchKind,
    pub record: R,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub remote_id: String,
    /// Local id embedded in the row, if it had one
    pub local_id: Option<String>,
    pub reason: DeleteReason,
}

/// Remote mutations that bring a table in line with the local replica.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan<R> {
    pub to_create: Vec<R>,
    pub to_update: Vec<PlannedUpdate<R>>,
    pub to_delete: Vec<PlannedDelete>,
}

impl<R> Default for SyncPlan<R> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<R> SyncPlan<R> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Total number of remote mutations.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Compute the plan for `R` using its configured strategy.
///
/// `now_ms` stamps records created without a creation timestamp.
pub fn plan<R: SyncRecord>(
    local: &[R],
    remote: &[RemoteRecord],
    policy: UpdatePolicy,
    now_ms: i64,
) -> SyncPlan<R> {
    match R::STRATEGY {
        SyncStrategy::Indexed => plan_indexed(local, remote, policy, now_ms),
        SyncStrategy::ReplaceAll => plan_replace_all(local, remote, now_ms),
    }
}

/// Match by embedded local id, then by fallback key.
pub fn plan_indexed<R: SyncRecord>(
    local: &[R],
    remote: &[RemoteRecord],
    policy: UpdatePolicy,
    now_ms: i64,
) -> SyncPlan<R> {
    let mut by_local_id: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut by_fallback_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, row) in remote.iter().enumerate() {
        if let Some(local_id) = remote_local_id(row) {
            by_local_id.entry(local_id).or_default().push(index);
        } else if let Some(key) = remote_fallback_key::<R>(row) {
            by_fallback_key.entry(key).or_default().push(index);
        }
    }

    let mut claimed = vec![false; remote.len()];
    let mut plan = SyncPlan::default();

    for record in local {
        let by_id = by_local_id
            .get(record.record_id())
            .and_then(|candidates| first_unclaimed(candidates, &claimed))
            .map(|index| (index, MatchKind::LocalId));
        let matched = by_id.or_else(|| {
            record
                .fallback_key()
                .and_then(|key| by_fallback_key.get(&key))
                .and_then(|candidates| first_unclaimed(candidates, &claimed))
                .map(|index| (index, MatchKind::Fallback))
        });

        let Some((index, matched_by)) = matched else {
            plan.to_create.push(with_created_at(record, now_ms));
            continue;
        };
        claimed[index] = true;

        let row = &remote[index];
        let needs_update = match (policy, matched_by) {
            (UpdatePolicy::Always, _) | (_, MatchKind::Fallback) => true,
            (UpdatePolicy::Divergent, MatchKind::LocalId) => {
                fields_diverge(&record.remote_fields(), &row.fields)
            }
        };
        if needs_update {
            plan.to_update.push(PlannedUpdate {
                remote_id: row.id.clone(),
                matched_by,
                record: record.clone(),
            });
        }
    }

    let local_ids: HashSet<&str> = local.iter().map(|record| record.record_id()).collect();
    let local_keys: HashSet<String> = local.iter().filter_map(SyncRecord::fallback_key).collect();

    for (index, row) in remote.iter().enumerate() {
        if claimed[index] {
            continue;
        }
        let local_id = remote_local_id(row);
        let reason = match local_id {
            Some(id) if local_ids.contains(id) => Some(DeleteReason::Duplicate),
            Some(_) => Some(DeleteReason::Orphaned),
            None => match remote_fallback_key::<R>(row) {
                Some(key) if local_keys.contains(&key) => None,
                _ => Some(DeleteReason::Orphaned),
            },
        };
        if let Some(reason) = reason {
            plan.to_delete.push(PlannedDelete {
                remote_id: row.id.clone(),
                local_id: local_id.map(str::to_string),
                reason,
            });
        }
    }

    plan
}

/// Replace the whole remote table with the local records.
///
/// When the remote rows already mirror the local records one-to-one the
/// plan is empty; otherwise every row is deleted and every record created.
pub fn plan_replace_all<R: SyncRecord>(
    local: &[R],
    remote: &[RemoteRecord],
    now_ms: i64,
) -> SyncPlan<R> {
    if mirrors_exactly(local, remote) {
        return SyncPlan::default();
    }

    SyncPlan {
        to_create: local
            .iter()
            .map(|record| with_created_at(record, now_ms))
            .collect(),
        to_update: Vec::new(),
        to_delete: remote
            .iter()
            .map(|row| PlannedDelete {
                remote_id: row.id.clone(),
                local_id: None,
                reason: DeleteReason::Replaced,
            })
            .collect(),
    }
}

fn mirrors_exactly<R: SyncRecord>(local: &[R], remote: &[RemoteRecord]) -> bool {
    if local.len() != remote.len() {
        return false;
    }
    let mut claimed = vec![false; remote.len()];
    local.iter().all(|record| {
        let fields = record.remote_fields();
        let found = remote
            .iter()
            .enumerate()
            .find(|(index, row)| !claimed[*index] && !fields_diverge(&fields, &row.fields))
            .map(|(index, _)| index);
        found.is_some_and(|index| {
            claimed[index] = true;
            true
        })
    })
}

fn first_unclaimed(candidates: &[usize], claimed: &[bool]) -> Option<usize> {
    candidates.iter().copied().find(|index| !claimed[*index])
}

fn with_created_at<R: SyncRecord>(record: &R, now_ms: i64) -> R {
    let mut record = record.clone();
    if record.created_at().is_none() {
        record.set_created_at(now_ms);
    }
    record
}
