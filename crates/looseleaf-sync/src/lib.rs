//! looseleaf-sync - Sync engine for Looseleaf
//!
//! This crate keeps the always-writable local cache eventually consistent
//! with the remote authoritative store. It contains the durable
//! [`LocalStore`], the [`RemoteStore`] client trait with its HTTP
//! implementation and change feed, and the [`SyncEngine`] that orchestrates
//! reconciliation, live updates, and the mutation entry points the UI layer
//! calls.

pub mod engine;
pub mod error;
pub mod remote;
pub mod store;

pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use remote::{ChangeEvent, ChangeFeed, HttpRemote, RemoteCollection, RemoteStore};
pub use store::LocalStore;
