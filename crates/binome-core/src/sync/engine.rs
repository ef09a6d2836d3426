//! Reconciliation cycles against the remote tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::plan::{plan, SyncPlan, UpdatePolicy};
use super::record::{SyncRecord, LOCAL_ID_FIELD, OWNER_FIELD};
use crate::error::{Error, Result};
use crate::gateway::{FieldFilter, RemoteRecord, RemoteTable};
use crate::models::{Distribution, Zone};
use crate::state::SyncState;
use crate::store::{KvStore, LocalReplica};
use crate::util::unix_millis_now;

/// Remote table names, one per entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub distributions: String,
    pub zones: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            distributions: "distributions".to_string(),
            zones: "zones".to_string(),
        }
    }
}

/// Which part of the remote data this device reconciles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncScope {
    /// Every distribution, and the zone table
    #[default]
    Everything,
    /// Only distributions owned by one team. Zones are left untouched.
    Team { owner_id: String },
}

impl SyncScope {
    fn distribution_filter(&self) -> Option<FieldFilter> {
        match self {
            Self::Everything => None,
            Self::Team { owner_id } => Some(
                FieldFilter::equals(OWNER_FIELD, owner_id.as_str()).or_unclaimed(LOCAL_ID_FIELD),
            ),
        }
    }

    fn includes(&self, distribution: &Distribution) -> bool {
        match self {
            Self::Everything => true,
            Self::Team { owner_id } => distribution.owner_id == *owner_id,
        }
    }

    const fn syncs_zones(&self) -> bool {
        matches!(self, Self::Everything)
    }
}

/// Outcome of applying one collection's plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Remote calls that failed and will be retried next cycle
    pub failed: usize,
}

impl CollectionReport {
    /// Remote mutations that succeeded.
    pub const fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Outcome of a full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub distributions: CollectionReport,
    pub zones: CollectionReport,
}

impl SyncReport {
    pub const fn failed(&self) -> usize {
        self.distributions.failed + self.zones.failed
    }

    /// Whether every planned mutation went through.
    pub const fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// Brings the remote tables in line with the local replica.
///
/// The engine owns no data. Each cycle lists the remote rows, plans against
/// the current replica and applies the plan; nothing is carried between
/// cycles except the published [`SyncState`].
pub struct SyncEngine<S: KvStore, G: RemoteTable> {
    replica: LocalReplica<S>,
    gateway: Arc<G>,
    tables: TableNames,
    policy: UpdatePolicy,
    scope: SyncScope,
    state: watch::Sender<SyncState>,
    last_error: Mutex<Option<String>>,
}

impl<S: KvStore, G: RemoteTable> SyncEngine<S, G> {
    pub fn new(replica: LocalReplica<S>, gateway: Arc<G>) -> Self {
        let (state, _) = watch::channel(SyncState::Offline);
        Self {
            replica,
            gateway,
            tables: TableNames::default(),
            policy: UpdatePolicy::default(),
            scope: SyncScope::default(),
            state,
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: SyncScope) -> Self {
        self.scope = scope;
        self
    }

    pub const fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub const fn scope(&self) -> &SyncScope {
        &self.scope
    }

    /// Current sync state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Follow sync state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// User-visible message of the last aborted cycle, cleared by a
    /// successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .map(|message| message.clone())
            .unwrap_or_default()
    }

    /// Compute, without applying, the distribution plan of the next cycle.
    pub async fn plan_distributions(&self) -> Result<SyncPlan<Distribution>> {
        let rows = self.list_distributions().await?;
        let local = self.local_distributions()?;
        Ok(self.distribution_plan(&local, &rows, unix_millis_now()))
    }

    /// Compute, without applying, the zone plan of the next cycle.
    pub async fn plan_zones(&self) -> Result<SyncPlan<Zone>> {
        if !self.scope.syncs_zones() {
            return Ok(SyncPlan::default());
        }
        let rows = self.list(&self.tables.zones, None).await?;
        let local = self.replica.load::<Zone>()?;
        Ok(plan(&local, &rows, self.policy, unix_millis_now()))
    }

    /// Run one reconciliation cycle.
    ///
    /// Fails only when a remote snapshot or the replica cannot be read; in
    /// that case nothing was written anywhere. Individual remote failures
    /// are counted in the report instead.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        self.state.send_replace(SyncState::Syncing);

        match self.reconcile().await {
            Ok(report) => {
                self.set_last_error(None);
                self.state.send_replace(SyncState::Synced);
                tracing::info!(
                    "Sync cycle done: distributions +{} ~{} -{}, zones +{} ~{} -{}, {} failed",
                    report.distributions.created,
                    report.distributions.updated,
                    report.distributions.deleted,
                    report.zones.created,
                    report.zones.updated,
                    report.zones.deleted,
                    report.failed()
                );
                Ok(report)
            }
            Err(error) => {
                tracing::error!("Sync cycle aborted: {error}");
                self.set_last_error(Some(error.to_string()));
                self.state.send_replace(SyncState::Error);
                Err(error)
            }
        }
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        // Snapshot every table before writing anything.
        let distribution_rows = self.list_distributions().await?;
        let zone_rows = if self.scope.syncs_zones() {
            Some(self.list(&self.tables.zones, None).await?)
        } else {
            None
        };

        let now = unix_millis_now();
        let mut report = SyncReport::default();

        let distributions = self.local_distributions()?;
        let distribution_plan = self.distribution_plan(&distributions, &distribution_rows, now);
        report.distributions = self
            .apply(&self.tables.distributions, &distribution_plan)
            .await;
        self.persist_created_at(&distribution_plan)?;

        if let Some(zone_rows) = zone_rows {
            let zones = self.replica.load::<Zone>()?;
            let zone_plan = plan(&zones, &zone_rows, self.policy, now);
            report.zones = self.apply(&self.tables.zones, &zone_plan).await;
            self.persist_created_at(&zone_plan)?;
        }

        Ok(report)
    }

    /// Plan distributions, leaving unclaimed legacy rows alone unless a
    /// local record adopts them. Under a team scope they may belong to
    /// another team.
    fn distribution_plan(
        &self,
        local: &[Distribution],
        rows: &[RemoteRecord],
        now: i64,
    ) -> SyncPlan<Distribution> {
        let mut plan = plan(local, rows, self.policy, now);
        if let Some(filter) = self.scope.distribution_filter() {
            plan.to_delete.retain(|delete| {
                !rows
                    .iter()
                    .any(|row| row.id == delete.remote_id && !filter.owns(row))
            });
        }
        plan
    }

    async fn list_distributions(&self) -> Result<Vec<RemoteRecord>> {
        let filter = self.scope.distribution_filter();
        self.list(&self.tables.distributions, filter.as_ref()).await
    }

    async fn list(&self, table: &str, filter: Option<&FieldFilter>) -> Result<Vec<RemoteRecord>> {
        let rows = self
            .gateway
            .list(table, filter)
            .await
            .map_err(|error| Error::SyncAborted(format!("cannot list {table}: {error}")))?;
        tracing::debug!("Listed {} remote rows from {table}", rows.len());
        Ok(rows)
    }

    fn local_distributions(&self) -> Result<Vec<Distribution>> {
        let mut records = self.replica.load::<Distribution>()?;
        records.retain(|record| self.scope.includes(record));
        Ok(records)
    }

    /// Apply a plan record by record, deletes first.
    async fn apply<R: SyncRecord>(&self, table: &str, plan: &SyncPlan<R>) -> CollectionReport {
        let mut report = CollectionReport::default();

        for delete in &plan.to_delete {
            tracing::debug!(
                "Deleting {table}/{} ({:?})",
                delete.remote_id,
                delete.reason
            );
            match self.gateway.delete(table, &delete.remote_id).await {
                Ok(()) => report.deleted += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!("Failed to delete {table}/{}: {error}", delete.remote_id);
                }
            }
        }

        for update in &plan.to_update {
            tracing::debug!(
                "Updating {table}/{} from {} ({:?})",
                update.remote_id,
                update.record.record_id(),
                update.matched_by
            );
            let fields = update.record.remote_fields();
            match self.gateway.update(table, &update.remote_id, &fields).await {
                Ok(_) => report.updated += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!("Failed to update {table}/{}: {error}", update.remote_id);
                }
            }
        }

        for record in &plan.to_create {
            tracing::debug!("Creating {table} row for {}", record.record_id());
            match self.gateway.create(table, &record.remote_fields()).await {
                Ok(_) => report.created += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Failed to create {table} row for {}: {error}",
                        record.record_id()
                    );
                }
            }
        }

        report
    }

    /// Keep creation timestamps assigned during planning.
    ///
    /// Reloads the collection so edits made while the cycle ran survive.
    fn persist_created_at<R: SyncRecord>(&self, plan: &SyncPlan<R>) -> Result<()> {
        let stamped: HashMap<String, i64> = plan
            .to_create
            .iter()
            .filter_map(|record| {
                record
                    .created_at()
                    .map(|created_at| (record.record_id().to_string(), created_at))
            })
            .collect();

        self.replica.modify::<R, _>(|records| {
            for record in records.iter_mut() {
                if record.created_at().is_some() {
                    continue;
                }
                let stamp = stamped.get(record.record_id()).copied();
                if let Some(created_at) = stamp {
                    record.set_created_at(created_at);
                }
            }
            Ok(())
        })
    }

    fn set_last_error(&self, message: Option<String>) {
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = message;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryTable, Operation};
    use crate::geometry::{LatLng, Shape};
    use crate::models::VisitStatus;
    use crate::store::MemoryKvStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        replica: LocalReplica<MemoryKvStore>,
        remote: Arc<MemoryTable>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                replica: LocalReplica::new(MemoryKvStore::new()),
                remote: Arc::new(MemoryTable::new()),
            }
        }

        fn engine(&self) -> SyncEngine<MemoryKvStore, MemoryTable> {
            SyncEngine::new(self.replica.clone(), Arc::clone(&self.remote))
        }

        fn distributions(&self) -> Vec<Distribution> {
            self.replica.load().unwrap()
        }

        fn save_distributions(&self, records: &[Distribution]) {
            self.replica.save(records).unwrap();
        }

        fn remote_local_ids(&self) -> Vec<String> {
            self.remote
                .rows("distributions")
                .iter()
                .filter_map(|row| row.text_field(LOCAL_ID_FIELD).map(str::to_string))
                .collect()
        }
    }

    fn visit(address: &str, owner: &str) -> Distribution {
        Distribution::new(address, LatLng::new(48.85, 2.35), owner, VisitStatus::Done)
    }

    fn circle_zone(name: &str) -> Zone {
        Zone::new(
            name,
            Shape::Circle {
                center: LatLng::new(48.85, 2.35),
                radius_meters: 300.0,
            },
        )
    }

    #[tokio::test]
    async fn second_cycle_is_a_no_op() {
        let harness = Harness::new();
        harness.save_distributions(&[visit("1 rue A", "team-1"), visit("2 rue B", "team-1")]);
        harness.replica.save(&[circle_zone("North")]).unwrap();
        let engine = harness.engine();

        let first = engine.run_cycle().await.unwrap();
        assert_eq!(first.distributions.created, 2);
        assert_eq!(first.zones.created, 1);

        let second = engine.run_cycle().await.unwrap();
        assert_eq!(second, SyncReport::default());
        assert!(engine.plan_distributions().await.unwrap().is_empty());
        assert!(engine.plan_zones().await.unwrap().is_empty());
        assert_eq!(harness.remote.call_count(Operation::Create), 3);
    }

    #[tokio::test]
    async fn local_edits_and_deletes_reach_the_remote() {
        let harness = Harness::new();
        let kept = visit("1 rue A", "team-1");
        let dropped = visit("2 rue B", "team-1");
        harness.save_distributions(&[kept.clone(), dropped]);
        let engine = harness.engine();
        engine.run_cycle().await.unwrap();

        let mut edited = kept;
        edited.notes = "gave twice".to_string();
        edited.touch();
        harness.save_distributions(&[edited.clone()]);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.distributions.updated, 1);
        assert_eq!(report.distributions.deleted, 1);

        let rows = harness.remote.rows("distributions");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["notes"], "gave twice");
        assert_eq!(harness.remote_local_ids(), vec![edited.id.to_string()]);
    }

    #[tokio::test]
    async fn deletes_are_sent_before_creates() {
        let harness = Harness::new();
        harness
            .remote
            .seed("distributions", json!({ LOCAL_ID_FIELD: "gone" }).as_object().cloned().unwrap());
        harness.save_distributions(&[visit("1 rue A", "team-1")]);

        harness.engine().run_cycle().await.unwrap();

        let operations: Vec<Operation> = harness
            .remote
            .calls()
            .into_iter()
            .map(|(operation, _)| operation)
            .filter(|operation| *operation != Operation::List)
            .collect();
        assert_eq!(operations, vec![Operation::Delete, Operation::Create]);
    }

    #[tokio::test]
    async fn legacy_row_is_adopted_instead_of_duplicated() {
        let harness = Harness::new();
        harness.remote.seed(
            "distributions",
            json!({ "address": "1 RUE A", "status": "retry" })
                .as_object()
                .cloned()
                .unwrap(),
        );
        let record = visit("1 rue A", "team-1");
        harness.save_distributions(&[record.clone()]);

        let report = harness.engine().run_cycle().await.unwrap();
        assert_eq!(report.distributions.updated, 1);
        assert_eq!(report.distributions.created, 0);
        assert_eq!(harness.remote_local_ids(), vec![record.id.to_string()]);
    }

    #[tokio::test]
    async fn unreachable_remote_aborts_without_side_effects() {
        let harness = Harness::new();
        let mut record = visit("1 rue A", "team-1");
        record.created_at = None;
        harness.save_distributions(&[record.clone()]);
        harness.remote.set_unavailable(true);
        let engine = harness.engine();
        let mut state = engine.subscribe();

        let error = engine.run_cycle().await.unwrap_err();
        assert!(matches!(error, Error::SyncAborted(_)));
        assert_eq!(engine.state(), SyncState::Error);
        assert!(*state.borrow_and_update() == SyncState::Error);
        assert!(engine.last_error().is_some_and(|message| message.contains("distributions")));
        assert_eq!(harness.remote.call_count(Operation::Create), 0);
        assert_eq!(harness.distributions(), vec![record]);

        harness.remote.set_unavailable(false);
        engine.run_cycle().await.unwrap();
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.last_error(), None);
    }

    #[tokio::test]
    async fn failed_calls_are_counted_and_retried_next_cycle() {
        let harness = Harness::new();
        harness.save_distributions(&[visit("1 rue A", "team-1"), visit("2 rue B", "team-1")]);
        harness.remote.fail_next(Operation::Create, 1);
        let engine = harness.engine();

        let first = engine.run_cycle().await.unwrap();
        assert_eq!(first.distributions.created, 1);
        assert_eq!(first.distributions.failed, 1);
        assert!(!first.is_clean());

        let second = engine.run_cycle().await.unwrap();
        assert_eq!(second.distributions.created, 1);
        assert!(second.is_clean());
        assert_eq!(harness.remote.rows("distributions").len(), 2);
    }

    #[tokio::test]
    async fn creation_time_is_kept_locally() {
        let harness = Harness::new();
        let mut record = visit("1 rue A", "team-1");
        record.created_at = None;
        harness.save_distributions(&[record]);
        let engine = harness.engine();

        engine.run_cycle().await.unwrap();
        let stored = harness.distributions();
        let created_at = stored[0].created_at.unwrap();
        assert_eq!(harness.remote.rows("distributions")[0].fields["createdAt"], created_at);
        assert!(engine.plan_distributions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn team_scope_leaves_other_teams_and_zones_alone() {
        let harness = Harness::new();
        let foreign = visit("9 rue Z", "team-2");
        harness.remote.seed("distributions", foreign.remote_fields());
        harness.remote.seed("zones", circle_zone("Elsewhere").remote_fields());
        harness.save_distributions(&[visit("1 rue A", "team-1"), foreign]);

        let engine = harness.engine().with_scope(SyncScope::Team {
            owner_id: "team-1".to_string(),
        });
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.distributions.created, 1);
        assert_eq!(report.distributions.deleted, 0);
        assert_eq!(report.zones, CollectionReport::default());
        assert_eq!(harness.remote.rows("distributions").len(), 2);
        assert_eq!(harness.remote.rows("zones").len(), 1);
    }

    #[tokio::test]
    async fn team_scope_adopts_unowned_legacy_rows() {
        let harness = Harness::new();
        let legacy = |address: &str| {
            json!({ "address": address, "status": "done" })
                .as_object()
                .cloned()
                .unwrap()
        };
        let adopted_id = harness.remote.seed("distributions", legacy("X"));
        let unrelated_id = harness.remote.seed("distributions", legacy("Y"));
        let record = visit("X", "team-1");
        harness.save_distributions(&[record.clone()]);

        let engine = harness.engine().with_scope(SyncScope::Team {
            owner_id: "team-1".to_string(),
        });
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.distributions.updated, 1);
        assert_eq!(report.distributions.created, 0);
        assert_eq!(report.distributions.deleted, 0);
        let rows = harness.remote.rows("distributions");
        assert_eq!(rows.len(), 2);
        let adopted = rows.iter().find(|row| row.id == adopted_id).unwrap();
        assert_eq!(adopted.text_field(LOCAL_ID_FIELD), Some(record.id.as_str()));
        assert_eq!(adopted.text_field(OWNER_FIELD), Some("team-1"));
        assert!(rows.iter().any(|row| row.id == unrelated_id));
        assert!(engine.plan_distributions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changed_zones_are_replaced() {
        let harness = Harness::new();
        let mut north = circle_zone("North");
        harness.replica.save(&[north.clone(), circle_zone("South")]).unwrap();
        let engine = harness.engine();
        engine.run_cycle().await.unwrap();

        north.color = "#ff0000".to_string();
        north.touch();
        harness.replica.save(&[north]).unwrap();

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.zones.deleted, 2);
        assert_eq!(report.zones.created, 1);
        let rows = harness.remote.rows("zones");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["color"], "#ff0000");
    }

    #[tokio::test]
    async fn custom_table_names_are_used() {
        let harness = Harness::new();
        harness.save_distributions(&[visit("1 rue A", "team-1")]);
        let engine = harness.engine().with_tables(TableNames {
            distributions: "Visits".to_string(),
            zones: "Areas".to_string(),
        });

        engine.run_cycle().await.unwrap();
        assert_eq!(harness.remote.rows("Visits").len(), 1);
        assert!(harness.remote.rows("distributions").is_empty());
    }

    #[tokio::test]
    async fn always_policy_rewrites_matched_rows() {
        let harness = Harness::new();
        harness.save_distributions(&[visit("1 rue A", "team-1")]);
        let engine = harness.engine().with_policy(UpdatePolicy::Always);
        engine.run_cycle().await.unwrap();

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.distributions.updated, 1);
        assert_eq!(harness.remote.rows("distributions").len(), 1);
    }
}
