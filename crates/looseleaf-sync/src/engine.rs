//! Sync engine orchestration.
//!
//! The [`SyncEngine`] is the sole writer over the in-memory view and the
//! local store. UI layers read view snapshots, call the mutation entry
//! points, and observe `Disabled → Reconciling → Subscribed` through
//! [`SyncEngine::state`]. Enabling sync runs one reconciliation pass per
//! record kind against the remote store, then opens the change feeds;
//! disabling is a cancellation point that closes them again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use looseleaf_core::util::next_timestamp;
use looseleaf_core::{merge, Folder, FolderId, Note, NoteId, OwnerId, Record, RecordKind, SyncState};

use crate::error::{Error, Result};
use crate::remote::{ChangeEvent, ChangeFeed, RemoteCollection, RemoteStore};
use crate::store::LocalStore;

const FEED_RESUBSCRIBE_BASE: Duration = Duration::from_secs(1);
const FEED_RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

/// The reconciled in-memory record set, one map per kind.
#[derive(Default)]
struct Views {
    notes: HashMap<Uuid, Note>,
    folders: HashMap<Uuid, Folder>,
}

/// Access to a kind's slot in [`Views`], so engine internals are written
/// once per operation instead of once per kind.
trait Viewed: Record {
    fn map(views: &Views) -> &HashMap<Uuid, Self>;
    fn map_mut(views: &mut Views) -> &mut HashMap<Uuid, Self>;
}

impl Viewed for Note {
    fn map(views: &Views) -> &HashMap<Uuid, Self> {
        &views.notes
    }

    fn map_mut(views: &mut Views) -> &mut HashMap<Uuid, Self> {
        &mut views.notes
    }
}

impl Viewed for Folder {
    fn map(views: &Views) -> &HashMap<Uuid, Self> {
        &views.folders
    }

    fn map_mut(views: &mut Views) -> &mut HashMap<Uuid, Self> {
        &mut views.folders
    }
}

struct Lifecycle {
    state: SyncState,
    feed_tasks: Vec<JoinHandle<()>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: SyncState::Disabled,
            feed_tasks: Vec::new(),
        }
    }
}

struct Shared {
    views: RwLock<Views>,
    lifecycle: Mutex<Lifecycle>,
    owner: RwLock<OwnerId>,
    /// Bumped on every disable; stale passes and feed tasks check it and
    /// discard their results.
    epoch: AtomicU64,
    revision: watch::Sender<u64>,
    /// Serializes mutation entry points and the persist phase of a
    /// reconciliation pass.
    write_gate: AsyncMutex<()>,
}

#[derive(Clone, Copy)]
enum WriteKind {
    Insert,
    Update,
}

enum RemoteWrite<T> {
    Insert(T),
    Update(T),
    Delete(Uuid),
}

/// Orchestrates the local store, the remote store, and the in-memory view.
pub struct SyncEngine<R: RemoteStore> {
    local: LocalStore,
    remote: Arc<R>,
    shared: Arc<Shared>,
}

impl<R: RemoteStore> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: Arc::clone(&self.remote),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Create an engine over an opened store, hydrating the view from it.
    ///
    /// Starts `Disabled` with the local-only owner; the authentication
    /// collaborator drives everything else through
    /// [`SyncEngine::on_owner_changed`].
    pub fn new(local: LocalStore, remote: R) -> Result<Self> {
        let notes: Vec<Note> = local.get_all()?;
        let folders: Vec<Folder> = local.get_all()?;
        let views = Views {
            notes: notes.into_iter().map(|n| (n.record_id(), n)).collect(),
            folders: folders.into_iter().map(|f| (f.record_id(), f)).collect(),
        };

        let (revision, _) = watch::channel(0);
        Ok(Self {
            local,
            remote: Arc::new(remote),
            shared: Arc::new(Shared {
                views: RwLock::new(views),
                lifecycle: Mutex::new(Lifecycle::default()),
                owner: RwLock::new(OwnerId::local()),
                epoch: AtomicU64::new(0),
                revision,
                write_gate: AsyncMutex::new(()),
            }),
        })
    }

    // -----------------------------------------------------------------
    // Observation surface
    // -----------------------------------------------------------------

    pub fn state(&self) -> SyncState {
        self.lifecycle_lock().state
    }

    /// Whether a reconciliation pass is in flight.
    pub fn is_syncing(&self) -> bool {
        self.state().is_syncing()
    }

    pub fn current_owner(&self) -> OwnerId {
        self.shared
            .owner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Revision signal that ticks whenever the view changes.
    ///
    /// Readers re-fetch snapshots on each tick; the value itself carries no
    /// meaning beyond "something changed".
    pub fn subscribe_view(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Active notes, pinned first, then newest first.
    pub fn notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = {
            let views = self.views_read();
            views
                .notes
                .values()
                .filter(|note| !note.is_deleted())
                .cloned()
                .collect()
        };
        notes.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
        });
        notes
    }

    /// Soft-deleted notes, newest first.
    pub fn trashed_notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = {
            let views = self.views_read();
            views
                .notes
                .values()
                .filter(|note| note.is_deleted())
                .cloned()
                .collect()
        };
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.views_read().notes.get(&id.as_uuid()).cloned()
    }

    /// Active folders, by name.
    pub fn folders(&self) -> Vec<Folder> {
        let mut folders: Vec<Folder> = {
            let views = self.views_read();
            views
                .folders
                .values()
                .filter(|folder| !folder.is_deleted())
                .cloned()
                .collect()
        };
        folders.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
        });
        folders
    }

    /// Soft-deleted folders, newest first.
    pub fn trashed_folders(&self) -> Vec<Folder> {
        let mut folders: Vec<Folder> = {
            let views = self.views_read();
            views
                .folders
                .values()
                .filter(|folder| folder.is_deleted())
                .cloned()
                .collect()
        };
        folders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        folders
    }

    pub fn folder(&self, id: FolderId) -> Option<Folder> {
        self.views_read().folders.get(&id.as_uuid()).cloned()
    }

    /// Full-text search over active notes, best hits first.
    pub fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        let ids = self.local.search(RecordKind::Note, query, limit)?;
        let views = self.views_read();
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                views
                    .notes
                    .get(&id)
                    .filter(|note| !note.is_deleted())
                    .cloned()
            })
            .collect())
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Enable sync for the current owner: run a full reconciliation pass,
    /// then open the change feeds.
    ///
    /// Requires an authenticated owner; with the local sentinel this logs
    /// and stays `Disabled`. A second enable while a pass is running is
    /// coalesced, since the eventual feed subscription catches up anyway.
    pub async fn enable_sync(&self) -> Result<()> {
        let owner = self.current_owner();
        if owner.is_local() {
            tracing::warn!("Sync requires an authenticated owner; staying disabled");
            return Ok(());
        }

        let epoch = {
            let mut lifecycle = self.lifecycle_lock();
            if lifecycle.state != SyncState::Disabled {
                tracing::debug!(state = ?lifecycle.state, "Coalescing enable request");
                return Ok(());
            }
            lifecycle.state = SyncState::Reconciling;
            self.epoch()
        };
        tracing::info!(%owner, "Starting reconciliation pass");

        let (notes_pass, folders_pass) = tokio::join!(
            self.reconcile_kind::<Note>(&owner, epoch),
            self.reconcile_kind::<Folder>(&owner, epoch),
        );

        if let Err(error) = notes_pass.and(folders_pass) {
            self.revert_to_disabled(epoch);
            tracing::warn!(%error, "Reconciliation failed; sync disabled until re-enabled");
            return Err(error);
        }

        if self.epoch() != epoch {
            // Disabled mid-pass; everything after the bump was discarded.
            return Ok(());
        }

        let notes_feed = <R as RemoteCollection<Note>>::subscribe(&*self.remote, &owner).await;
        let folders_feed = <R as RemoteCollection<Folder>>::subscribe(&*self.remote, &owner).await;
        match (notes_feed, folders_feed) {
            (Ok(notes_feed), Ok(folders_feed)) => {
                let mut lifecycle = self.lifecycle_lock();
                if lifecycle.state != SyncState::Reconciling || self.epoch() != epoch {
                    // Disabled while subscribing; dropping the feeds closes them.
                    return Ok(());
                }
                lifecycle
                    .feed_tasks
                    .push(self.spawn_feed_task(notes_feed, epoch));
                lifecycle
                    .feed_tasks
                    .push(self.spawn_feed_task(folders_feed, epoch));
                lifecycle.state = SyncState::Subscribed;
                tracing::info!(%owner, "Initial reconciliation complete; change feeds open");
                Ok(())
            }
            _ => {
                self.revert_to_disabled(epoch);
                let error = Error::FeedDropped("could not open change feeds".to_string());
                tracing::warn!(%error, "Sync disabled until re-enabled");
                Err(error)
            }
        }
    }

    /// Disable sync, closing the change feeds.
    ///
    /// This is a cancellation point: an in-flight reconciliation pass stops
    /// issuing remote calls and discards any results that land afterwards.
    pub fn disable_sync(&self) {
        let mut lifecycle = self.lifecycle_lock();
        if lifecycle.state == SyncState::Disabled {
            return;
        }
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        for task in lifecycle.feed_tasks.drain(..) {
            task.abort();
        }
        lifecycle.state = SyncState::Disabled;
        tracing::info!("Sync disabled; change feeds closed");
    }

    /// Force a full re-merge: equivalent to disable followed by enable.
    pub async fn resync(&self) -> Result<()> {
        self.disable_sync();
        self.enable_sync().await
    }

    /// React to an authentication transition.
    ///
    /// `Some(owner)` enables sync and reconciles for that owner; `None`
    /// disables sync and clears the local cache back to an empty local-only
    /// state (account switch / logout).
    pub async fn on_owner_changed(&self, owner: Option<OwnerId>) -> Result<()> {
        match owner {
            Some(owner) => {
                self.disable_sync();
                *self
                    .shared
                    .owner
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = owner;
                self.enable_sync().await
            }
            None => {
                self.disable_sync();
                *self
                    .shared
                    .owner
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = OwnerId::local();

                let _gate = self.shared.write_gate.lock().await;
                self.local.clear_all()?;
                *self.views_write() = Views::default();
                self.bump_revision();
                tracing::info!("Owner signed out; local cache cleared");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Note mutations
    // -----------------------------------------------------------------

    pub async fn create_note(
        &self,
        title: impl Into<String> + Send,
        body: impl Into<String> + Send,
        folder: Option<FolderId>,
    ) -> Result<Note> {
        let _gate = self.shared.write_gate.lock().await;
        let mut note = Note::new(title, body);
        note.owner = self.current_owner();
        note.folder = folder;
        Ok(self.commit(note, WriteKind::Insert).await)
    }

    /// Persist an edited note. The stored copy's identity fields (owner,
    /// `created_at`, trash state) are preserved; `updated_at` advances.
    pub async fn update_note(&self, note: Note) -> Result<Note> {
        let _gate = self.shared.write_gate.lock().await;
        let current: Note = self
            .view_get(note.record_id())
            .ok_or_else(|| Error::NotFound(note.id.to_string()))?;

        let mut updated = note;
        updated.owner = current.owner;
        updated.created_at = current.created_at;
        updated.deleted_at = current.deleted_at;
        updated.updated_at = next_timestamp(current.updated_at.max(updated.updated_at));
        Ok(self.commit(updated, WriteKind::Update).await)
    }

    pub async fn soft_delete_note(&self, id: NoteId) -> Result<Note> {
        let _gate = self.shared.write_gate.lock().await;
        let mut note: Note = self
            .view_get(id.as_uuid())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if note.is_deleted() {
            return Ok(note);
        }

        let stamp = next_timestamp(note.updated_at);
        note.deleted_at = Some(stamp);
        note.updated_at = stamp;
        Ok(self.commit(note, WriteKind::Update).await)
    }

    pub async fn restore_note(&self, id: NoteId) -> Result<Note> {
        let _gate = self.shared.write_gate.lock().await;
        let mut note: Note = self
            .view_get(id.as_uuid())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !note.is_deleted() {
            return Ok(note);
        }

        note.deleted_at = None;
        note.updated_at = next_timestamp(note.updated_at);
        Ok(self.commit(note, WriteKind::Update).await)
    }

    /// Permanently delete a note from both replicas. Irreversible.
    pub async fn purge_note(&self, id: NoteId) -> Result<()> {
        let _gate = self.shared.write_gate.lock().await;
        self.purge::<Note>(id.as_uuid()).await
    }

    // -----------------------------------------------------------------
    // Folder mutations
    // -----------------------------------------------------------------

    pub async fn create_folder(&self, name: impl Into<String> + Send) -> Result<Folder> {
        let _gate = self.shared.write_gate.lock().await;
        let mut folder = Folder::new(name);
        folder.owner = self.current_owner();
        Ok(self.commit(folder, WriteKind::Insert).await)
    }

    /// Persist an edited folder, recomputing its display path.
    pub async fn update_folder(&self, folder: Folder) -> Result<Folder> {
        let _gate = self.shared.write_gate.lock().await;
        let current: Folder = self
            .view_get(folder.record_id())
            .ok_or_else(|| Error::NotFound(folder.id.to_string()))?;

        let mut updated = folder;
        updated.owner = current.owner;
        updated.created_at = current.created_at;
        updated.deleted_at = current.deleted_at;
        updated.path = Folder::derive_path(&updated.name);
        updated.updated_at = next_timestamp(current.updated_at.max(updated.updated_at));
        Ok(self.commit(updated, WriteKind::Update).await)
    }

    /// Soft-delete a folder and cascade to its contained active notes.
    ///
    /// Cascaded notes take the folder's deletion instant as their own
    /// `deleted_at`, which is what lets a later restore pick out exactly
    /// this cascade.
    pub async fn soft_delete_folder(&self, id: FolderId) -> Result<Folder> {
        let _gate = self.shared.write_gate.lock().await;
        let mut folder: Folder = self
            .view_get(id.as_uuid())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if folder.is_deleted() {
            return Ok(folder);
        }

        let stamp = next_timestamp(folder.updated_at);
        folder.deleted_at = Some(stamp);
        folder.updated_at = stamp;
        let folder = self.commit(folder, WriteKind::Update).await;

        let contained: Vec<Note> = {
            let views = self.views_read();
            views
                .notes
                .values()
                .filter(|note| note.folder == Some(id) && !note.is_deleted())
                .cloned()
                .collect()
        };
        for mut note in contained {
            note.deleted_at = Some(stamp);
            note.updated_at = next_timestamp(note.updated_at);
            self.commit(note, WriteKind::Update).await;
        }

        Ok(folder)
    }

    /// Restore a folder and exactly the notes its deletion cascaded to.
    pub async fn restore_folder(&self, id: FolderId) -> Result<Folder> {
        let _gate = self.shared.write_gate.lock().await;
        let mut folder: Folder = self
            .view_get(id.as_uuid())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let Some(stamp) = folder.deleted_at else {
            return Ok(folder);
        };

        folder.deleted_at = None;
        folder.updated_at = next_timestamp(folder.updated_at);
        let folder = self.commit(folder, WriteKind::Update).await;

        let cascaded: Vec<Note> = {
            let views = self.views_read();
            views
                .notes
                .values()
                .filter(|note| note.folder == Some(id) && note.deleted_at == Some(stamp))
                .cloned()
                .collect()
        };
        for mut note in cascaded {
            note.deleted_at = None;
            note.updated_at = next_timestamp(note.updated_at);
            self.commit(note, WriteKind::Update).await;
        }

        Ok(folder)
    }

    /// Permanently delete a folder from both replicas. Contained notes keep
    /// their folder reference and their own trash state.
    pub async fn purge_folder(&self, id: FolderId) -> Result<()> {
        let _gate = self.shared.write_gate.lock().await;
        self.purge::<Folder>(id.as_uuid()).await
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    fn lifecycle_lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.shared
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn views_read(&self) -> RwLockReadGuard<'_, Views> {
        self.shared
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn views_write(&self) -> RwLockWriteGuard<'_, Views> {
        self.shared
            .views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self) {
        self.shared.revision.send_modify(|revision| *revision += 1);
    }

    fn view_get<T: Viewed>(&self, id: Uuid) -> Option<T> {
        T::map(&self.views_read()).get(&id).cloned()
    }

    fn revert_to_disabled(&self, epoch: u64) {
        let mut lifecycle = self.lifecycle_lock();
        if lifecycle.state == SyncState::Reconciling && self.epoch() == epoch {
            lifecycle.state = SyncState::Disabled;
        }
    }

    /// One reconciliation pass for one kind.
    ///
    /// Only the merge-and-persist step holds the write gate; the slow
    /// remote calls run outside it so edits are never blocked on the
    /// network. Uploads that fail are logged and retried by the next pass.
    async fn reconcile_kind<T>(&self, owner: &OwnerId, epoch: u64) -> Result<()>
    where
        T: Viewed,
        R: RemoteCollection<T>,
    {
        let remote_records = <R as RemoteCollection<T>>::list(&*self.remote, owner).await?;
        if self.epoch() != epoch {
            return Ok(());
        }

        let outcome = {
            let _gate = self.shared.write_gate.lock().await;
            if self.epoch() != epoch {
                return Ok(());
            }
            let local_records = self.local.get_all::<T>()?;
            let outcome = merge(local_records, remote_records, owner);
            for record in &outcome.unified {
                self.local.put(record).await?;
            }
            *T::map_mut(&mut self.views_write()) = outcome
                .unified
                .iter()
                .map(|record| (record.record_id(), record.clone()))
                .collect();
            outcome
        };
        self.bump_revision();
        tracing::debug!(
            kind = %T::KIND,
            unified = outcome.unified.len(),
            uploads = outcome.to_upload.len(),
            pushes = outcome.to_push.len(),
            "Merged local and remote snapshots"
        );

        for record in &outcome.to_upload {
            if self.epoch() != epoch {
                return Ok(());
            }
            if let Err(error) = <R as RemoteCollection<T>>::insert(&*self.remote, record).await {
                tracing::warn!(kind = %T::KIND, id = %record.record_id(), %error, "Upload failed; next pass will retry");
            }
        }
        for record in &outcome.to_push {
            if self.epoch() != epoch {
                return Ok(());
            }
            if let Err(error) = <R as RemoteCollection<T>>::update(&*self.remote, record).await {
                tracing::warn!(kind = %T::KIND, id = %record.record_id(), %error, "Push failed; next pass will retry");
            }
        }
        Ok(())
    }

    /// Drive one kind's change feed until cancelled, resubscribing with
    /// backoff if the feed drops.
    fn spawn_feed_task<T>(&self, feed: ChangeFeed<T>, epoch: u64) -> JoinHandle<()>
    where
        T: Viewed,
        R: RemoteCollection<T>,
    {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut feed = feed;
            loop {
                if engine.epoch() != epoch {
                    return;
                }
                match feed.next().await {
                    Some(event) => {
                        if engine.epoch() != epoch {
                            return;
                        }
                        engine.apply_feed_event(event).await;
                    }
                    None => {
                        let error = Error::FeedDropped(T::KIND.to_string());
                        tracing::warn!(%error, "Resubscribing to change feed");
                        let owner = engine.current_owner();
                        let mut delay = FEED_RESUBSCRIBE_BASE;
                        loop {
                            tokio::time::sleep(delay).await;
                            if engine.epoch() != epoch {
                                return;
                            }
                            match <R as RemoteCollection<T>>::subscribe(&*engine.remote, &owner)
                                .await
                            {
                                Ok(fresh) => {
                                    tracing::info!(kind = %T::KIND, "Change feed reopened");
                                    feed = fresh;
                                    break;
                                }
                                Err(error) => {
                                    tracing::warn!(kind = %T::KIND, %error, "Resubscribe failed; backing off");
                                    delay = (delay * 2).min(FEED_RESUBSCRIBE_MAX);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Fold one feed event into the store and the view.
    ///
    /// No conflict check: the feed is the authoritative post-merge remote
    /// state for that id.
    async fn apply_feed_event<T: Viewed>(&self, event: ChangeEvent<T>) {
        match event {
            ChangeEvent::Insert(record) | ChangeEvent::Update(record) => {
                if let Err(error) = self.local.put(&record).await {
                    tracing::error!(kind = %T::KIND, %error, "Failed to persist feed event");
                }
                T::map_mut(&mut self.views_write()).insert(record.record_id(), record);
            }
            ChangeEvent::Delete(id) => {
                if let Err(error) = self.local.delete::<T>(id).await {
                    tracing::error!(kind = %T::KIND, %id, %error, "Failed to apply feed deletion");
                }
                T::map_mut(&mut self.views_write()).remove(&id);
            }
        }
        self.bump_revision();
    }

    /// Shared tail of every mutation entry point: durable-first local
    /// writes, synchronous view update, then the asynchronous remote write.
    ///
    /// Local persistence failures are logged, never surfaced — an edit in
    /// flight must not observe a storage exception.
    async fn commit<T>(&self, record: T, kind: WriteKind) -> T
    where
        T: Viewed,
        R: RemoteCollection<T>,
    {
        if let Err(error) = self.local.put_sync(&record) {
            tracing::error!(kind = %T::KIND, %error, "Autosave write failed");
        }
        if let Err(error) = self.local.put(&record).await {
            tracing::error!(kind = %T::KIND, %error, "Durable write failed");
        }

        T::map_mut(&mut self.views_write()).insert(record.record_id(), record.clone());
        self.bump_revision();

        match kind {
            WriteKind::Insert => self.push_remote(RemoteWrite::Insert(record.clone())),
            WriteKind::Update => self.push_remote(RemoteWrite::Update(record.clone())),
        }
        record
    }

    async fn purge<T>(&self, id: Uuid) -> Result<()>
    where
        T: Viewed,
        R: RemoteCollection<T>,
    {
        self.local.delete::<T>(id).await?;
        T::map_mut(&mut self.views_write()).remove(&id);
        self.bump_revision();
        self.push_remote::<T>(RemoteWrite::Delete(id));
        Ok(())
    }

    /// Fire-and-forget remote write while `Subscribed`; failures are logged
    /// and healed by the next reconciliation pass.
    fn push_remote<T>(&self, write: RemoteWrite<T>)
    where
        T: Viewed,
        R: RemoteCollection<T>,
    {
        if self.state() != SyncState::Subscribed {
            return;
        }
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            let result = match &write {
                RemoteWrite::Insert(record) => {
                    <R as RemoteCollection<T>>::insert(&*remote, record).await
                }
                RemoteWrite::Update(record) => {
                    <R as RemoteCollection<T>>::update(&*remote, record).await
                }
                RemoteWrite::Delete(id) => <R as RemoteCollection<T>>::delete(&*remote, *id).await,
            };
            if let Err(error) = result {
                tracing::warn!(kind = %T::KIND, %error, "Remote write failed; next reconciliation pass will retry");
            }
        });
    }
}
