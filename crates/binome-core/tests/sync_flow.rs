//! End-to-end flows: local mutations, debounced cycles and filtered reads.

use std::sync::Arc;
use std::time::Duration;

use binome_core::access::{distributions_in_zone, visible_distributions, zones_for_point};
use binome_core::auth::{Credentials, KvSessionStore, SessionManager};
use binome_core::gateway::{MemoryTable, Operation};
use binome_core::store::{DistributionEdit, FieldStore, LocalReplica, SqliteKvStore};
use binome_core::sync::{SyncEngine, SyncScheduler, LOCAL_ID_FIELD};
use binome_core::{Distribution, LatLng, Shape, SyncState, VisitStatus, Zone};
use pretty_assertions::assert_eq;
use tokio::time::sleep;

struct Device {
    store: FieldStore<SqliteKvStore>,
    engine: Arc<SyncEngine<SqliteKvStore, MemoryTable>>,
    scheduler: SyncScheduler,
    remote: Arc<MemoryTable>,
    _dir: tempfile::TempDir,
}

fn device() -> Device {
    let dir = tempfile::tempdir().unwrap();
    let kv = SqliteKvStore::open(dir.path().join("replica.db")).unwrap();
    let replica = LocalReplica::new(kv);
    let remote = Arc::new(MemoryTable::new());
    let engine = Arc::new(SyncEngine::new(replica.clone(), Arc::clone(&remote)));
    let scheduler = SyncScheduler::for_engine(Arc::clone(&engine), Duration::from_secs(2));
    let store = FieldStore::new(replica).with_scheduler(scheduler.clone());
    Device {
        store,
        engine,
        scheduler,
        remote,
        _dir: dir,
    }
}

fn visit(address: &str, owner: &str, lat: f64, lng: f64) -> Distribution {
    Distribution::new(address, LatLng::new(lat, lng), owner, VisitStatus::Done)
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_reaches_remote_in_one_cycle() {
    let device = device();

    let first = device
        .store
        .create_distribution(visit("1 rue A", "team-1", 1.0, 1.0))
        .unwrap();
    sleep(Duration::from_millis(400)).await;
    device
        .store
        .create_distribution(visit("2 rue B", "team-1", 2.0, 2.0))
        .unwrap();
    sleep(Duration::from_millis(400)).await;
    device
        .store
        .update_distribution(
            &first.id,
            DistributionEdit {
                amount: Some(20.0),
                ..DistributionEdit::default()
            },
        )
        .unwrap();

    device.scheduler.flush().await;

    assert_eq!(device.scheduler.cycles_run(), 1);
    assert_eq!(device.remote.call_count(Operation::Create), 2);
    assert_eq!(device.remote.call_count(Operation::Update), 0);
    assert_eq!(device.engine.state(), SyncState::Synced);

    let rows = device.remote.rows("distributions");
    let synced_first = rows
        .iter()
        .find(|row| row.text_field(LOCAL_ID_FIELD) == Some(first.id.as_str()))
        .unwrap();
    assert_eq!(synced_first.fields["amount"], 20.0);
}

#[tokio::test(start_paused = true)]
async fn local_delete_propagates_and_next_cycle_is_empty() {
    let device = device();
    let kept = device
        .store
        .create_distribution(visit("1 rue A", "team-1", 1.0, 1.0))
        .unwrap();
    let dropped = device
        .store
        .create_distribution(visit("2 rue B", "team-1", 2.0, 2.0))
        .unwrap();
    device.scheduler.flush().await;
    assert_eq!(device.remote.rows("distributions").len(), 2);

    device.store.delete_distribution(&dropped.id).unwrap();
    device.scheduler.flush().await;

    let rows = device.remote.rows("distributions");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text_field(LOCAL_ID_FIELD), Some(kept.id.as_str()));

    assert!(device.engine.plan_distributions().await.unwrap().is_empty());
    assert!(device.engine.plan_zones().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn outage_is_reported_and_recovered_on_next_mutation() {
    let device = device();
    device.remote.set_unavailable(true);
    let record = device
        .store
        .create_distribution(visit("1 rue A", "team-1", 1.0, 1.0))
        .unwrap();
    device.scheduler.flush().await;

    assert_eq!(device.engine.state(), SyncState::Error);
    assert!(device.engine.last_error().is_some());
    assert_eq!(device.store.distributions().unwrap(), vec![record.clone()]);

    device.remote.set_unavailable(false);
    device
        .store
        .update_distribution(
            &record.id,
            DistributionEdit {
                notes: Some("second try".to_string()),
                ..DistributionEdit::default()
            },
        )
        .unwrap();
    device.scheduler.flush().await;

    assert_eq!(device.engine.state(), SyncState::Synced);
    assert_eq!(device.remote.rows("distributions").len(), 1);
}

#[test]
fn team_member_reads_only_their_own_data() {
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(SqliteKvStore::open(dir.path().join("replica.db")).unwrap());
    let store = FieldStore::new(LocalReplica::from_shared(Arc::clone(&kv)));
    let sessions = SessionManager::new(KvSessionStore::new(kv));

    let north = store
        .create_zone(Zone::new(
            "North",
            Shape::Rectangle {
                south_west: LatLng::new(10.0, 0.0),
                north_east: LatLng::new(20.0, 10.0),
            },
        ))
        .unwrap();
    store
        .create_zone(Zone::new(
            "South",
            Shape::Rectangle {
                south_west: LatLng::new(0.0, 0.0),
                north_east: LatLng::new(10.0, 10.0),
            },
        ))
        .unwrap();
    let mine = store
        .create_distribution(visit("1 rue A", "team-1", 15.0, 5.0))
        .unwrap();
    store
        .create_distribution(visit("2 rue B", "team-2", 15.0, 6.0))
        .unwrap();

    sessions
        .login(Credentials {
            user_id: "team-1".to_string(),
            assigned_zone: Some("North".to_string()),
            ..Credentials::default()
        })
        .unwrap();
    let session = sessions.restore().unwrap().unwrap();

    let distributions = store.distributions().unwrap();
    let zones = store.zones().unwrap();

    let visible: Vec<&Distribution> = visible_distributions(&session, &distributions);
    assert_eq!(visible, vec![&mine]);

    let here: Vec<&str> = zones_for_point(&session, LatLng::new(15.0, 5.0), &zones)
        .into_iter()
        .map(|zone| zone.name.as_str())
        .collect();
    assert_eq!(here, vec!["North"]);
    assert!(zones_for_point(&session, LatLng::new(5.0, 5.0), &zones).is_empty());

    assert_eq!(
        distributions_in_zone(&session, &north, &distributions),
        vec![&mine]
    );
}
