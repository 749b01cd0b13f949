//! Link status and patch-state projection
//!
//! [`PatchState`] is a pure derivation over the link status and the last boot
//! acknowledgement; it is never set directly. Consumers read the current value
//! synchronously and observe changes through a watch channel, which publishes
//! only on change — this is what makes reconnection event-driven rather than
//! timer-driven.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// Wireless link lifecycle state. Written only by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    None,
    Bonding,
    Bonded,
    Discovering,
    Discovered,
    NotifyEnabling,
    Ready,
    Disconnected,
    AdapterOff,
}

/// Link state plus the flags that travel with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub bonded: bool,
    pub adapter_enabled: bool,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::None,
            bonded: false,
            adapter_enabled: true,
        }
    }
}

/// Host-derived connectivity/boot status of the paired patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// No link and the patch has never acknowledged boot
    DisconnectedNotBooted,
    /// The patch is known alive but the link is down; drives reconnection
    DisconnectedBooted,
    /// Link ready and boot confirmed; dosing commands are allowed
    ConnectedBooted,
    /// Nothing observed yet
    Unknown,
}

/// Derive the patch state from link status and the boot acknowledgement
pub fn project(status: &LinkStatus, boot_acknowledged: bool) -> PatchState {
    if status.state == LinkState::Ready && boot_acknowledged {
        PatchState::ConnectedBooted
    } else if boot_acknowledged {
        PatchState::DisconnectedBooted
    } else {
        PatchState::DisconnectedNotBooted
    }
}

/// Holds the link status and publishes the derived patch state.
///
/// Link state and flags are written only by the connection manager; the boot
/// acknowledgement is recorded by the command dispatcher on each confirmed
/// status response.
pub struct StateProjection {
    status: RwLock<LinkStatus>,
    boot_acknowledged: AtomicBool,
    patch_tx: watch::Sender<PatchState>,
}

impl StateProjection {
    pub fn new() -> Self {
        let (patch_tx, _) = watch::channel(PatchState::Unknown);
        Self {
            status: RwLock::new(LinkStatus::default()),
            boot_acknowledged: AtomicBool::new(false),
            patch_tx,
        }
    }

    /// Current patch state, readable synchronously
    pub fn patch_state(&self) -> PatchState {
        *self.patch_tx.borrow()
    }

    /// Subscribe to patch state changes (published on change only)
    pub fn subscribe(&self) -> watch::Receiver<PatchState> {
        self.patch_tx.subscribe()
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.status.read()
    }

    pub fn is_adapter_enabled(&self) -> bool {
        self.status.read().adapter_enabled
    }

    pub fn set_link_state(&self, state: LinkState) {
        {
            let mut status = self.status.write();
            if status.state == state {
                return;
            }
            debug!(from = ?status.state, to = ?state, "link state");
            status.state = state;
        }
        self.republish();
    }

    pub fn set_bonded(&self, bonded: bool) {
        self.status.write().bonded = bonded;
        self.republish();
    }

    /// Adapter power toggles override the link state: off forces `AdapterOff`,
    /// on clears it back to `None` so a fresh sequence can run.
    pub fn set_adapter_enabled(&self, enabled: bool) {
        {
            let mut status = self.status.write();
            status.adapter_enabled = enabled;
            if !enabled {
                status.state = LinkState::AdapterOff;
            } else if status.state == LinkState::AdapterOff {
                status.state = LinkState::None;
            }
        }
        self.republish();
    }

    /// Record that a status query confirmed the patch is booted
    pub fn acknowledge_boot(&self) {
        self.boot_acknowledged.store(true, Ordering::SeqCst);
        self.republish();
    }

    /// Forget the boot acknowledgement (patch reinitialized or replaced)
    pub fn clear_boot_acknowledgement(&self) {
        self.boot_acknowledged.store(false, Ordering::SeqCst);
        self.republish();
    }

    pub fn boot_acknowledged(&self) -> bool {
        self.boot_acknowledged.load(Ordering::SeqCst)
    }

    fn republish(&self) {
        let next = project(&self.status.read(), self.boot_acknowledged());
        self.patch_tx.send_if_modified(|current| {
            if *current != next {
                debug!(from = ?current, to = ?next, "patch state");
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

impl Default for StateProjection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LinkState::Ready, true, PatchState::ConnectedBooted)]
    #[case(LinkState::Ready, false, PatchState::DisconnectedNotBooted)]
    #[case(LinkState::Disconnected, true, PatchState::DisconnectedBooted)]
    #[case(LinkState::Disconnected, false, PatchState::DisconnectedNotBooted)]
    #[case(LinkState::None, true, PatchState::DisconnectedBooted)]
    #[case(LinkState::AdapterOff, true, PatchState::DisconnectedBooted)]
    #[case(LinkState::Discovering, false, PatchState::DisconnectedNotBooted)]
    fn projection_table(
        #[case] state: LinkState,
        #[case] booted: bool,
        #[case] expected: PatchState,
    ) {
        let status = LinkStatus {
            state,
            ..Default::default()
        };
        assert_eq!(project(&status, booted), expected);
    }

    #[test]
    fn publishes_only_on_change() {
        let projection = StateProjection::new();
        let mut rx = projection.subscribe();
        assert_eq!(*rx.borrow_and_update(), PatchState::Unknown);

        projection.set_link_state(LinkState::Ready);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PatchState::DisconnectedNotBooted);

        // Same derived value again: no publication
        projection.set_link_state(LinkState::Disconnected);
        assert!(!rx.has_changed().unwrap());

        projection.acknowledge_boot();
        assert_eq!(*rx.borrow_and_update(), PatchState::DisconnectedBooted);
    }

    #[test]
    fn adapter_off_forces_link_state() {
        let projection = StateProjection::new();
        projection.set_link_state(LinkState::Ready);
        projection.set_adapter_enabled(false);
        assert_eq!(projection.link_status().state, LinkState::AdapterOff);
        assert!(!projection.is_adapter_enabled());

        projection.set_adapter_enabled(true);
        assert_eq!(projection.link_status().state, LinkState::None);
    }
}
