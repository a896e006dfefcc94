//! Gateway registry.
//!
//! Tracks the gateways heard from via ADVERTISE broadcasts or GWINFO
//! discovery responses. Each entry carries the gateway's advertised
//! lifetime; an entry whose lifetime elapses without a fresh beacon is
//! expired and the removal reported to the host.

use heapless::Vec;

pub(crate) struct GatewayInfo {
    pub id: u8,
    pub seen_at: u64,
    pub duration_ms: u64,
}

/// Result of tracking a gateway sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracked {
    /// First time this gateway id was heard from.
    New,
    /// An existing entry was refreshed in place.
    Refreshed,
    /// The registry is at capacity; the sighting was dropped.
    Full,
}

pub(crate) struct GatewayRegistry<const N: usize> {
    entries: Vec<GatewayInfo, N>,
}

impl<const N: usize> GatewayRegistry<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records a gateway sighting with the given lifetime.
    pub fn track(&mut self, id: u8, duration_ms: u64, now: u64) -> Tracked {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.seen_at = now;
            entry.duration_ms = duration_ms;
            return Tracked::Refreshed;
        }
        let entry = GatewayInfo {
            id,
            seen_at: now,
            duration_ms,
        };
        match self.entries.push(entry) {
            Ok(()) => Tracked::New,
            Err(_) => Tracked::Full,
        }
    }

    /// Removes every entry whose lifetime has elapsed, returning their ids.
    pub fn expire_stale(&mut self, now: u64) -> Vec<u8, N> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if now >= e.seen_at + e.duration_ms {
                let _ = expired.push(e.id);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Absolute time of the earliest pending expiry.
    pub fn next_expiry(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.seen_at + e.duration_ms).min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The gateway the client converses with: the first one tracked.
    pub fn first_id(&self) -> Option<u8> {
        self.entries.first().map(|e| e.id)
    }

    pub fn discard(&mut self, id: u8) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
