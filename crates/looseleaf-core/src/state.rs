//! Shared cross-platform state types.

/// Sync engine lifecycle state observed by all clients.
///
/// `Disabled → Reconciling → Subscribed`, back to `Disabled` on any
/// disable. Re-enabling always re-enters `Reconciling` from scratch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No network I/O; mutations go only to the local store.
    Disabled,
    /// A full merge pass against the remote store is in flight.
    Reconciling,
    /// Initial reconciliation done; live change feeds are open.
    Subscribed,
}

impl SyncState {
    /// Whether a reconciliation pass is currently running.
    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Reconciling)
    }
}
