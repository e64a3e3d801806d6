//! Remote authoritative store client.
//!
//! [`RemoteCollection`] is the per-kind query/command surface plus the live
//! change feed subscription; [`RemoteStore`] bundles it for both record
//! kinds. Every failure is a [`crate::Error::RemoteUnavailable`]: the engine
//! treats the remote as temporarily gone, never as a data-loss event.

mod http;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use looseleaf_core::{Folder, Note, OwnerId, Record};

use crate::error::Result;

pub use http::HttpRemote;

/// One mutation observed on the remote store, pushed by another session.
///
/// Exhaustive by construction; there is no "unknown event type" case for
/// call sites to mishandle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent<T> {
    Insert(T),
    Update(T),
    Delete(Uuid),
}

/// A live subscription delivering [`ChangeEvent`]s in the order the remote
/// store committed them.
///
/// Dropping or closing the feed tears down the underlying transport task,
/// so a subscription can never outlive the engine state that opened it.
pub struct ChangeFeed<T> {
    events: mpsc::Receiver<ChangeEvent<T>>,
    transport: Option<JoinHandle<()>>,
}

impl<T> ChangeFeed<T> {
    /// A feed over a plain channel (fakes and in-process remotes).
    #[must_use]
    pub fn new(events: mpsc::Receiver<ChangeEvent<T>>) -> Self {
        Self {
            events,
            transport: None,
        }
    }

    /// A feed whose events are produced by a background transport task.
    #[must_use]
    pub fn with_transport(events: mpsc::Receiver<ChangeEvent<T>>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            transport: Some(task),
        }
    }

    /// Next event, or `None` once the feed has dropped.
    pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
        self.events.recv().await
    }

    /// Explicitly close the subscription.
    pub fn close(&mut self) {
        self.events.close();
        if let Some(task) = self.transport.take() {
            task.abort();
        }
    }
}

impl<T> Drop for ChangeFeed<T> {
    fn drop(&mut self) {
        if let Some(task) = self.transport.take() {
            task.abort();
        }
    }
}

/// Query/command interface over one record kind of the authoritative store.
#[async_trait]
pub trait RemoteCollection<T: Record>: Send + Sync {
    /// Every record of this kind owned by `owner`.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<T>>;

    /// Insert a record the remote store has never seen.
    async fn insert(&self, record: &T) -> Result<()>;

    /// Replace the remote copy of an existing record.
    async fn update(&self, record: &T) -> Result<()>;

    /// Permanently delete by id.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Open a live feed of changes made by other sessions of `owner`.
    ///
    /// The feed may echo this session's own writes; the engine tolerates
    /// either behavior.
    async fn subscribe(&self, owner: &OwnerId) -> Result<ChangeFeed<T>>;
}

/// The full remote surface the sync engine needs: both record kinds.
pub trait RemoteStore:
    RemoteCollection<Note> + RemoteCollection<Folder> + Send + Sync + 'static
{
}

impl<R> RemoteStore for R where
    R: RemoteCollection<Note> + RemoteCollection<Folder> + Send + Sync + 'static
{
}
