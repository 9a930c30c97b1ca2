//! In-memory lease table. Exclusively owned by the DHCP engine (§3 Ownership):
//! nothing outside this module ever holds a write handle to it. Nothing here
//! touches disk — a restart loses lease state by design (§1 Non-goals).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// How long an OFFER holds its IP before a confirming REQUEST is required.
pub const OFFER_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Offered,
    Bound,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub expires_at: u64,
    pub state: LeaseState,
}

/// Keyed by MAC so "does this MAC already have a lease" is a single lookup;
/// a secondary index keeps IP -> MAC in sync so at most one lease per IP
/// holds (§3 invariant) without a linear scan on every allocation.
pub struct LeaseStore {
    by_mac: HashMap<String, Lease>,
    ip_to_mac: HashMap<Ipv4Addr, String>,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl LeaseStore {
    pub fn new() -> Self {
        Self {
            by_mac: HashMap::new(),
            ip_to_mac: HashMap::new(),
        }
    }

    pub fn get_by_mac(&self, mac: &str) -> Option<&Lease> {
        self.by_mac.get(mac)
    }

    pub fn get_by_ip(&self, ip: Ipv4Addr) -> Option<&Lease> {
        self.ip_to_mac.get(&ip).and_then(|mac| self.by_mac.get(mac))
    }

    fn is_live(lease: &Lease, at: u64) -> bool {
        lease.state != LeaseState::Expired && lease.expires_at > at
    }

    /// Whether `ip` is held by a live lease for a MAC other than `mac`.
    fn ip_in_use_by_other(&self, ip: Ipv4Addr, mac: &str, at: u64) -> bool {
        match self.get_by_ip(ip) {
            Some(lease) if lease.mac != mac => Self::is_live(lease, at),
            _ => false,
        }
    }

    fn insert(&mut self, lease: Lease) {
        if let Some(old) = self.by_mac.get(&lease.mac) {
            if old.ip != lease.ip {
                self.ip_to_mac.remove(&old.ip);
            }
        }
        self.ip_to_mac.insert(lease.ip, lease.mac.clone());
        self.by_mac.insert(lease.mac.clone(), lease);
    }

    /// Allocate an IP for `mac` on DISCOVER (§4.B):
    /// 1. Reuse an existing lease's IP if this MAC already has one.
    /// 2. Otherwise scan the pool from `start` for `count` addresses, picking
    ///    the first whose lease is expired or absent (lowest IP wins ties,
    ///    which a forward scan already guarantees).
    /// 3. Record the choice in `Offered` state with a short timeout.
    ///
    /// Returns `None` (pool exhausted) when the caller must drop the DISCOVER
    /// silently rather than reply.
    pub fn allocate(&mut self, mac: &str, start: Ipv4Addr, count: u32) -> Option<Ipv4Addr> {
        let at = now();

        if let Some(existing) = self.by_mac.get(mac) {
            if Self::is_live(existing, at) {
                let ip = existing.ip;
                self.insert(Lease {
                    mac: mac.to_string(),
                    ip,
                    expires_at: at + OFFER_TIMEOUT_SECS,
                    state: LeaseState::Offered,
                });
                return Some(ip);
            }
        }

        let start_u32 = u32::from(start);
        for offset in 0..count {
            let ip = Ipv4Addr::from(start_u32.wrapping_add(offset));
            if !self.ip_in_use_by_other(ip, mac, at) {
                self.insert(Lease {
                    mac: mac.to_string(),
                    ip,
                    expires_at: at + OFFER_TIMEOUT_SECS,
                    state: LeaseState::Offered,
                });
                return Some(ip);
            }
        }

        None
    }

    /// Promote an outstanding offer to `Bound` on a confirming REQUEST.
    /// Returns `false` if there is no matching offer/binding for this
    /// `(mac, ip)` pair — the caller should NAK.
    pub fn confirm(&mut self, mac: &str, ip: Ipv4Addr, lease_time_secs: u64) -> bool {
        let at = now();
        match self.by_mac.get(mac) {
            Some(lease) if lease.ip == ip && Self::is_live(lease, at) => {
                self.insert(Lease {
                    mac: mac.to_string(),
                    ip,
                    expires_at: at + lease_time_secs,
                    state: LeaseState::Bound,
                });
                true
            }
            _ => false,
        }
    }

    /// RELEASE/DECLINE: mark the lease expired immediately so the IP is
    /// eligible for reallocation right away instead of waiting out its timer.
    pub fn expire(&mut self, mac: &str) {
        if let Some(lease) = self.by_mac.get_mut(mac) {
            lease.state = LeaseState::Expired;
        }
    }

    /// Reap leases whose `expires_at` has passed. Runs on the 1-second tick
    /// (§5); returns the number reaped for logging.
    pub fn reap_expired(&mut self) -> usize {
        let at = now();
        let expired: Vec<String> = self
            .by_mac
            .iter()
            .filter(|(_, l)| l.expires_at <= at)
            .map(|(mac, _)| mac.clone())
            .collect();
        for mac in &expired {
            if let Some(lease) = self.by_mac.remove(mac) {
                self.ip_to_mac.remove(&lease.ip);
            }
        }
        expired.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Lease> {
        self.by_mac.values()
    }
}

impl Default for LeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 2)
    }

    #[test]
    fn allocates_lowest_free_ip_first() {
        let mut store = LeaseStore::new();
        let ip = store.allocate("aa:bb:cc:dd:ee:01", start(), 3).unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn reuses_existing_lease_for_same_mac() {
        let mut store = LeaseStore::new();
        let first = store.allocate("aa:bb:cc:dd:ee:01", start(), 3).unwrap();
        let second = store.allocate("aa:bb:cc:dd:ee:01", start(), 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn exhausts_pool_after_lease_count_distinct_macs() {
        let mut store = LeaseStore::new();
        for i in 0..3u8 {
            let mac = format!("aa:bb:cc:dd:ee:{:02x}", i);
            let ip = store.allocate(&mac, start(), 3).unwrap();
            store.confirm(&mac, ip, 3600);
        }
        let fourth = store.allocate("aa:bb:cc:dd:ee:ff", start(), 3);
        assert!(fourth.is_none());
    }

    #[test]
    fn confirm_requires_a_matching_outstanding_offer() {
        let mut store = LeaseStore::new();
        assert!(!store.confirm("aa:bb:cc:dd:ee:01", start(), 3600));
        let ip = store.allocate("aa:bb:cc:dd:ee:01", start(), 3).unwrap();
        assert!(store.confirm("aa:bb:cc:dd:ee:01", ip, 3600));
    }

    #[test]
    fn expire_frees_the_ip_for_reallocation() {
        let mut store = LeaseStore::new();
        let ip = store.allocate("aa:bb:cc:dd:ee:01", start(), 1).unwrap();
        store.confirm("aa:bb:cc:dd:ee:01", ip, 3600);
        store.expire("aa:bb:cc:dd:ee:01");
        let reused = store.allocate("aa:bb:cc:dd:ee:02", start(), 1).unwrap();
        assert_eq!(reused, ip);
    }
}
