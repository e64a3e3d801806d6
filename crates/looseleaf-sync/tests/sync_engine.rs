//! End-to-end engine scenarios against an in-process fake remote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use looseleaf_core::{Folder, Note, OwnerId, Record, SyncState};
use looseleaf_sync::{
    ChangeEvent, ChangeFeed, Error, LocalStore, RemoteCollection, Result, SyncEngine,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Fake remote: HashMaps behind a handle, with broadcast-backed change feeds
// and call counters for asserting on network traffic.
// ---------------------------------------------------------------------------

struct Counters {
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl Counters {
    fn new() -> Self {
        Self {
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

struct FakeRemoteInner {
    notes: Mutex<HashMap<Uuid, Note>>,
    folders: Mutex<HashMap<Uuid, Folder>>,
    note_calls: Counters,
    folder_calls: Counters,
    offline: AtomicBool,
    note_feed: broadcast::Sender<ChangeEvent<Note>>,
    folder_feed: broadcast::Sender<ChangeEvent<Folder>>,
}

#[derive(Clone)]
struct FakeRemote(Arc<FakeRemoteInner>);

impl FakeRemote {
    fn new() -> Self {
        Self(Arc::new(FakeRemoteInner {
            notes: Mutex::new(HashMap::new()),
            folders: Mutex::new(HashMap::new()),
            note_calls: Counters::new(),
            folder_calls: Counters::new(),
            offline: AtomicBool::new(false),
            note_feed: broadcast::channel(64).0,
            folder_feed: broadcast::channel(64).0,
        }))
    }

    fn set_offline(&self, offline: bool) {
        self.0.offline.store(offline, Ordering::SeqCst);
    }

    fn fail_if_offline(&self) -> Result<()> {
        if self.0.offline.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("offline".to_string()));
        }
        Ok(())
    }

    fn seed_note(&self, note: Note) {
        self.0.notes.lock().unwrap().insert(note.record_id(), note);
    }

    fn remote_note(&self, id: Uuid) -> Option<Note> {
        self.0.notes.lock().unwrap().get(&id).cloned()
    }

    fn note_inserts(&self) -> usize {
        self.0.note_calls.inserts.load(Ordering::SeqCst)
    }

    fn note_updates(&self) -> usize {
        self.0.note_calls.updates.load(Ordering::SeqCst)
    }

    fn note_deletes(&self) -> usize {
        self.0.note_calls.deletes.load(Ordering::SeqCst)
    }

    fn push_note_event(&self, event: ChangeEvent<Note>) {
        let _ = self.0.note_feed.send(event);
    }
}

fn feed_from_broadcast<T: Record>(mut source: broadcast::Receiver<ChangeEvent<T>>) -> ChangeFeed<T>
where
    ChangeEvent<T>: Clone,
{
    let (tx, rx) = mpsc::channel(16);
    let task = tokio::spawn(async move {
        loop {
            match source.recv().await {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    ChangeFeed::with_transport(rx, task)
}

#[async_trait]
impl RemoteCollection<Note> for FakeRemote {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Note>> {
        self.fail_if_offline()?;
        Ok(self
            .0
            .notes
            .lock()
            .unwrap()
            .values()
            .filter(|note| note.owner == *owner)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &Note) -> Result<()> {
        self.fail_if_offline()?;
        self.0.note_calls.inserts.fetch_add(1, Ordering::SeqCst);
        self.0
            .notes
            .lock()
            .unwrap()
            .insert(record.record_id(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &Note) -> Result<()> {
        self.fail_if_offline()?;
        self.0.note_calls.updates.fetch_add(1, Ordering::SeqCst);
        self.0
            .notes
            .lock()
            .unwrap()
            .insert(record.record_id(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.fail_if_offline()?;
        self.0.note_calls.deletes.fetch_add(1, Ordering::SeqCst);
        self.0.notes.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn subscribe(&self, _owner: &OwnerId) -> Result<ChangeFeed<Note>> {
        self.fail_if_offline()?;
        Ok(feed_from_broadcast(self.0.note_feed.subscribe()))
    }
}

#[async_trait]
impl RemoteCollection<Folder> for FakeRemote {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Folder>> {
        self.fail_if_offline()?;
        Ok(self
            .0
            .folders
            .lock()
            .unwrap()
            .values()
            .filter(|folder| folder.owner == *owner)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &Folder) -> Result<()> {
        self.fail_if_offline()?;
        self.0.folder_calls.inserts.fetch_add(1, Ordering::SeqCst);
        self.0
            .folders
            .lock()
            .unwrap()
            .insert(record.record_id(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &Folder) -> Result<()> {
        self.fail_if_offline()?;
        self.0.folder_calls.updates.fetch_add(1, Ordering::SeqCst);
        self.0
            .folders
            .lock()
            .unwrap()
            .insert(record.record_id(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.fail_if_offline()?;
        self.0.folder_calls.deletes.fetch_add(1, Ordering::SeqCst);
        self.0.folders.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn subscribe(&self, _owner: &OwnerId) -> Result<ChangeFeed<Folder>> {
        self.fail_if_offline()?;
        Ok(feed_from_broadcast(self.0.folder_feed.subscribe()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn owner() -> OwnerId {
    OwnerId::new("user-1")
}

fn setup() -> (SyncEngine<FakeRemote>, FakeRemote, LocalStore) {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();
    let remote = FakeRemote::new();
    let engine = SyncEngine::new(store.clone(), remote.clone()).unwrap();
    (engine, remote, store)
}

/// Poll until `condition` holds; panics after two seconds.
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn note_with_stamp(title: &str, owner: &OwnerId, updated_at: i64) -> Note {
    let mut note = Note::new(title, "");
    note.owner = owner.clone();
    note.updated_at = updated_at;
    note
}

// ---------------------------------------------------------------------------
// Reconciliation scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn offline_create_then_enable_uploads_with_rewritten_owner() {
    let (engine, remote, _store) = setup();

    let note = engine.create_note("A", "written offline", None).await.unwrap();
    assert!(note.owner.is_local());
    assert_eq!(remote.note_inserts(), 0);

    engine.on_owner_changed(Some(owner())).await.unwrap();

    assert_eq!(remote.note_inserts(), 1);
    let uploaded = remote.remote_note(note.record_id()).unwrap();
    assert_eq!(uploaded.owner, owner());
    assert_eq!(engine.notes()[0].owner, owner());
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_local_edit_beats_stale_remote_copy() {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();

    let local = note_with_stamp("edited on this device", &owner(), 5_000);
    store.put(&local).await.unwrap();

    let mut stale = local.clone();
    stale.title = "older remote copy".to_string();
    stale.updated_at = 2_000;

    let remote = FakeRemote::new();
    remote.seed_note(stale);

    let engine = SyncEngine::new(store, remote.clone()).unwrap();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    assert_eq!(engine.notes()[0].title, "edited on this device");
    assert_eq!(remote.note_updates(), 1);
    assert_eq!(
        remote.remote_note(local.record_id()).unwrap().title,
        "edited on this device"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_copy_wins_without_any_upload() {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();

    let local = note_with_stamp("stale local", &owner(), 2_000);
    store.put(&local).await.unwrap();

    let mut fresh = local.clone();
    fresh.title = "fresher remote".to_string();
    fresh.updated_at = 5_000;

    let remote = FakeRemote::new();
    remote.seed_note(fresh);

    let engine = SyncEngine::new(store.clone(), remote.clone()).unwrap();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    assert_eq!(engine.notes()[0].title, "fresher remote");
    assert_eq!(remote.note_updates(), 0);
    assert_eq!(remote.note_inserts(), 0);

    // The unified result is persisted back to the local store
    let cached: Note = store.get(local.record_id()).unwrap().unwrap();
    assert_eq!(cached.title, "fresher remote");
}

#[tokio::test(flavor = "multi_thread")]
async fn equal_timestamps_resolve_to_the_remote_copy() {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();

    let local = note_with_stamp("local at tie", &owner(), 3_000);
    store.put(&local).await.unwrap();

    let mut tied = local.clone();
    tied.title = "remote at tie".to_string();

    let remote = FakeRemote::new();
    remote.seed_note(tied);

    let engine = SyncEngine::new(store, remote.clone()).unwrap();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    assert_eq!(engine.notes()[0].title, "remote at tie");
    assert_eq!(remote.note_updates(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn locally_trashed_note_pushes_its_deletion() {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();

    let mut trashed = note_with_stamp("deleted here", &owner(), 6_000);
    trashed.deleted_at = Some(6_000);
    store.put(&trashed).await.unwrap();

    let mut remote_copy = trashed.clone();
    remote_copy.deleted_at = None;
    remote_copy.updated_at = 4_000;

    let remote = FakeRemote::new();
    remote.seed_note(remote_copy);

    let engine = SyncEngine::new(store, remote.clone()).unwrap();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    assert!(engine.notes().is_empty());
    assert_eq!(engine.trashed_notes().len(), 1);
    assert!(remote.remote_note(trashed.record_id()).unwrap().is_deleted());
}

// ---------------------------------------------------------------------------
// Change feed scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn feed_delete_removes_record_without_extra_network_calls() {
    init_logging();
    let store = LocalStore::open_in_memory().unwrap();
    let remote = FakeRemote::new();
    let seeded = note_with_stamp("on both devices", &owner(), 1_000);
    remote.seed_note(seeded.clone());

    let engine = SyncEngine::new(store.clone(), remote.clone()).unwrap();
    engine.on_owner_changed(Some(owner())).await.unwrap();
    assert_eq!(engine.notes().len(), 1);

    remote.push_note_event(ChangeEvent::Delete(seeded.record_id()));

    let probe = engine.clone();
    wait_until("feed delete to apply", move || probe.notes().is_empty()).await;
    assert!(store.get::<Note>(seeded.record_id()).unwrap().is_none());
    assert_eq!(remote.note_deletes(), 0);
    assert_eq!(remote.note_updates(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn feed_insert_and_update_land_in_view_and_store() {
    let (engine, remote, store) = setup();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    let incoming = note_with_stamp("typed elsewhere", &owner(), 2_000);
    remote.push_note_event(ChangeEvent::Insert(incoming.clone()));

    let probe = engine.clone();
    wait_until("feed insert to apply", move || probe.notes().len() == 1).await;

    let mut edited = incoming.clone();
    edited.title = "revised elsewhere".to_string();
    edited.updated_at = 3_000;
    remote.push_note_event(ChangeEvent::Update(edited));

    let probe = engine.clone();
    wait_until("feed update to apply", move || {
        probe.notes()[0].title == "revised elsewhere"
    })
    .await;

    let cached: Note = store.get(incoming.record_id()).unwrap().unwrap();
    assert_eq!(cached.title, "revised elsewhere");
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_of_own_write_is_tolerated() {
    let (engine, remote, _store) = setup();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    let note = engine.create_note("mine", "", None).await.unwrap();
    let probe = remote.clone();
    wait_until("remote insert to land", move || probe.note_inserts() == 1).await;

    // The feed echoes the session's own insert
    remote.push_note_event(ChangeEvent::Insert(note.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.notes().len(), 1);
    assert_eq!(engine.notes()[0], note);
}

// ---------------------------------------------------------------------------
// Mutations while subscribed
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn subscribed_mutations_reach_the_remote_store() {
    let (engine, remote, _store) = setup();
    engine.on_owner_changed(Some(owner())).await.unwrap();

    let note = engine.create_note("draft", "", None).await.unwrap();
    assert_eq!(note.owner, owner());
    let probe = remote.clone();
    wait_until("create to reach remote", move || probe.note_inserts() == 1).await;

    let mut edited = note.clone();
    edited.body = "now with content".to_string();
    engine.update_note(edited).await.unwrap();
    let probe = remote.clone();
    wait_until("update to reach remote", move || probe.note_updates() == 1).await;

    engine.purge_note(note.id).await.unwrap();
    let probe = remote.clone();
    wait_until("purge to reach remote", move || probe.note_deletes() == 1).await;
    assert!(remote.remote_note(note.record_id()).is_none());
    assert!(engine.note(note.id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn update_advances_the_timestamp_monotonically() {
    let (engine, _remote, _store) = setup();

    let note = engine.create_note("v1", "", None).await.unwrap();
    let mut edited = note.clone();
    edited.title = "v2".to_string();
    let updated = engine.update_note(edited).await.unwrap();

    assert!(updated.updated_at > note.updated_at);
    assert_eq!(updated.created_at, note.created_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn updating_an_unknown_note_is_not_found() {
    let (engine, _remote, _store) = setup();

    let ghost = Note::new("never created", "");
    assert!(matches!(
        engine.update_note(ghost).await,
        Err(Error::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Folder cascade
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn folder_soft_delete_cascades_and_restore_is_exact() {
    let (engine, _remote, _store) = setup();

    let folder = engine.create_folder("Work").await.unwrap();
    let in_a = engine
        .create_note("in folder a", "", Some(folder.id))
        .await
        .unwrap();
    let in_b = engine
        .create_note("in folder b", "", Some(folder.id))
        .await
        .unwrap();
    let loose = engine.create_note("outside", "", None).await.unwrap();

    // One contained note was already trashed on its own
    let independent = engine
        .create_note("independently deleted", "", Some(folder.id))
        .await
        .unwrap();
    engine.soft_delete_note(independent.id).await.unwrap();

    engine.soft_delete_folder(folder.id).await.unwrap();

    assert!(engine.folders().is_empty());
    let trashed: Vec<_> = engine.trashed_notes();
    assert_eq!(trashed.len(), 3);
    for note in &trashed {
        if note.id != loose.id {
            assert_eq!(note.folder, Some(folder.id), "cascade must not move notes");
        }
    }
    assert_eq!(engine.notes().len(), 1); // only the loose note survives

    engine.restore_folder(folder.id).await.unwrap();

    let active: Vec<_> = engine.notes();
    let active_ids: Vec<_> = active.iter().map(|n| n.id).collect();
    assert!(active_ids.contains(&in_a.id));
    assert!(active_ids.contains(&in_b.id));
    assert!(active_ids.contains(&loose.id));
    // The independently trashed note stays in the trash
    assert_eq!(engine.trashed_notes().len(), 1);
    assert_eq!(engine.trashed_notes()[0].id, independent.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn note_soft_delete_and_restore_roundtrip() {
    let (engine, _remote, _store) = setup();

    let note = engine.create_note("keepsake", "", None).await.unwrap();
    let trashed = engine.soft_delete_note(note.id).await.unwrap();
    assert!(trashed.is_deleted());
    assert!(trashed.updated_at > note.updated_at);
    assert!(engine.notes().is_empty());

    let restored = engine.restore_note(note.id).await.unwrap();
    assert!(!restored.is_deleted());
    assert!(restored.updated_at > trashed.updated_at);
    assert_eq!(engine.notes().len(), 1);
}

// ---------------------------------------------------------------------------
// Engine lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn state_machine_transitions() {
    let (engine, _remote, _store) = setup();
    assert_eq!(engine.state(), SyncState::Disabled);

    // Enabling without an authenticated owner stays disabled
    engine.enable_sync().await.unwrap();
    assert_eq!(engine.state(), SyncState::Disabled);

    engine.on_owner_changed(Some(owner())).await.unwrap();
    assert_eq!(engine.state(), SyncState::Subscribed);
    assert!(!engine.is_syncing());

    // A second enable is coalesced, not an error
    engine.enable_sync().await.unwrap();
    assert_eq!(engine.state(), SyncState::Subscribed);

    engine.disable_sync();
    assert_eq!(engine.state(), SyncState::Disabled);

    engine.resync().await.unwrap();
    assert_eq!(engine.state(), SyncState::Subscribed);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_remote_degrades_to_disabled_keeping_local_data() {
    let (engine, remote, _store) = setup();
    engine.create_note("safe and local", "", None).await.unwrap();

    remote.set_offline(true);
    let result = engine.on_owner_changed(Some(owner())).await;
    assert!(matches!(result, Err(Error::RemoteUnavailable(_))));
    assert_eq!(engine.state(), SyncState::Disabled);
    assert_eq!(engine.notes().len(), 1);

    // Connectivity returns; re-enabling reconciles normally
    remote.set_offline(false);
    engine.enable_sync().await.unwrap();
    assert_eq!(engine.state(), SyncState::Subscribed);
    assert_eq!(remote.note_inserts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_out_clears_the_local_cache() {
    let (engine, _remote, store) = setup();
    engine.on_owner_changed(Some(owner())).await.unwrap();
    engine.create_note("private", "", None).await.unwrap();
    engine.create_folder("Personal").await.unwrap();

    engine.on_owner_changed(None).await.unwrap();

    assert_eq!(engine.state(), SyncState::Disabled);
    assert!(engine.current_owner().is_local());
    assert!(engine.notes().is_empty());
    assert!(engine.folders().is_empty());
    assert!(store.get_all::<Note>().unwrap().is_empty());
    assert!(store.get_all::<Folder>().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn view_revision_ticks_on_every_visible_change() {
    let (engine, _remote, _store) = setup();
    let mut revision = engine.subscribe_view();
    let before = *revision.borrow_and_update();

    engine.create_note("tick", "", None).await.unwrap();

    revision.changed().await.unwrap();
    assert!(*revision.borrow() > before);
}

#[tokio::test(flavor = "multi_thread")]
async fn search_covers_active_notes_only() {
    let (engine, _remote, _store) = setup();

    let hit = engine
        .create_note("Quarterly planning", "objectives", None)
        .await
        .unwrap();
    let trashed = engine
        .create_note("Quarterly budget", "numbers", None)
        .await
        .unwrap();
    engine.soft_delete_note(trashed.id).await.unwrap();

    let results = engine.search_notes("quarterly", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, hit.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_rehydrates_from_the_store_on_startup() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("looseleaf.db");

    let note = {
        let store = LocalStore::open(&path).unwrap();
        let engine = SyncEngine::new(store, FakeRemote::new()).unwrap();
        engine.create_note("survives restart", "", None).await.unwrap()
    };

    let store = LocalStore::open(&path).unwrap();
    let engine = SyncEngine::new(store, FakeRemote::new()).unwrap();
    assert_eq!(engine.notes().len(), 1);
    assert_eq!(engine.notes()[0].id, note.id);
}
