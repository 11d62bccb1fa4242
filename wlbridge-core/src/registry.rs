//! Peer registry: the set of peer addresses whose traffic is forwarded, tagged by where each
//! peer was discovered.
//!
//! The registry is read on every captured frame and written only when a peer is discovered
//! locally or the remote endpoint sends its canonical list, so it sits behind an `RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mac::HardwareAddress;

/// Where a peer was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Seen on-air by this radio. Never evicted by a remote merge.
    Local,
    /// Announced by the remote endpoint.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    pub address: HardwareAddress,
    pub origin: Origin,
}

/// What a [`PeerRegistry::merge_remote`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: Vec<HardwareAddress>,
    pub removed: Vec<HardwareAddress>,
}

impl MergeOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<HardwareAddress, Origin>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<HardwareAddress, Origin>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<HardwareAddress, Origin>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `address` is a forwarding target, regardless of origin.
    pub fn is_member(&self, address: &HardwareAddress) -> bool {
        self.read().contains_key(address)
    }

    pub fn origin(&self, address: &HardwareAddress) -> Option<Origin> {
        self.read().get(address).copied()
    }

    /// Insert `address` as a local discovery unless it is already present (with any origin).
    /// Returns whether it was already present; callers gate one-shot side effects on `false`.
    pub fn register_local(&self, address: HardwareAddress) -> bool {
        if self.is_member(&address) {
            return true;
        }
        let mut peers = self.write();
        if peers.contains_key(&address) {
            return true;
        }
        peers.insert(address, Origin::Local);
        false
    }

    /// Apply the remote endpoint's full canonical peer list.
    ///
    /// Remote entries missing from `addresses` are removed; addresses not yet known are added as
    /// Remote. Local entries are never removed, even when `addresses` omits them.
    pub fn merge_remote(&self, addresses: &[HardwareAddress]) -> MergeOutcome {
        let canonical: HashSet<&HardwareAddress> = addresses.iter().collect();
        let mut outcome = MergeOutcome::default();
        let mut peers = self.write();

        peers.retain(|address, origin| {
            let keep = *origin == Origin::Local || canonical.contains(address);
            if !keep {
                outcome.removed.push(*address);
            }
            keep
        });
        for address in addresses {
            if !peers.contains_key(address) {
                peers.insert(*address, Origin::Remote);
                outcome.added.push(*address);
            }
        }
        drop(peers);

        for address in &outcome.removed {
            tracing::debug!(peer = %address, "de-registering remote peer");
        }
        for address in &outcome.added {
            tracing::debug!(peer = %address, "registering remote peer");
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of all entries, sorted by address.
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        let mut out: Vec<PeerEntry> = self
            .read()
            .iter()
            .map(|(address, origin)| PeerEntry {
                address: *address,
                origin: *origin,
            })
            .collect();
        out.sort_by_key(|e| e.address);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> HardwareAddress {
        HardwareAddress::new([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn register_local_is_idempotent() {
        let reg = PeerRegistry::new();
        assert!(!reg.register_local(addr(1)));
        for _ in 0..5 {
            assert!(reg.register_local(addr(1)));
        }
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.origin(&addr(1)), Some(Origin::Local));
    }

    #[test]
    fn register_local_keeps_remote_origin() {
        let reg = PeerRegistry::new();
        reg.merge_remote(&[addr(1)]);
        assert!(reg.register_local(addr(1)));
        assert_eq!(reg.origin(&addr(1)), Some(Origin::Remote));
    }

    #[test]
    fn merge_adds_and_removes_remote_entries() {
        let reg = PeerRegistry::new();
        let first = reg.merge_remote(&[addr(1), addr(2)]);
        assert_eq!(first.added, vec![addr(1), addr(2)]);
        assert!(first.removed.is_empty());

        let second = reg.merge_remote(&[addr(2), addr(3)]);
        assert_eq!(second.added, vec![addr(3)]);
        assert_eq!(second.removed, vec![addr(1)]);
        assert!(!reg.is_member(&addr(1)));
        assert!(reg.is_member(&addr(2)));
        assert!(reg.is_member(&addr(3)));

        assert!(reg.merge_remote(&[addr(2), addr(3)]).is_unchanged());
    }

    #[test]
    fn empty_merge_purges_remote_only() {
        let reg = PeerRegistry::new();
        reg.register_local(addr(1));
        reg.merge_remote(&[addr(2), addr(3)]);
        assert_eq!(reg.len(), 3);

        let outcome = reg.merge_remote(&[]);
        assert_eq!(outcome.removed.len(), 2);
        assert_eq!(
            reg.snapshot(),
            vec![PeerEntry {
                address: addr(1),
                origin: Origin::Local
            }]
        );
    }

    #[test]
    fn merge_does_not_retag_local_entries() {
        let reg = PeerRegistry::new();
        reg.register_local(addr(1));
        let outcome = reg.merge_remote(&[addr(1)]);
        assert!(outcome.is_unchanged());
        assert_eq!(reg.origin(&addr(1)), Some(Origin::Local));
    }

    #[test]
    fn concurrent_registration_reports_one_winner() {
        use std::sync::Arc;

        let reg = Arc::new(PeerRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || !reg.register_local(addr(9)))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(winners, 1);
    }
}
