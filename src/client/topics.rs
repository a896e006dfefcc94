//! Topic registration cache.
//!
//! MQTT-SN replaces topic names with small numeric ids negotiated through
//! REGISTER/REGACK. This cache remembers the negotiated mapping so repeat
//! publishes skip the registration round trip. It is bounded: when full,
//! the least recently used entry is evicted, except that entries pinned by
//! an in-flight operation are never evicted.

use heapless::String;

/// Longest topic name the engine stores or registers.
pub const MAX_TOPIC_LEN: usize = 128;

struct RegEntry {
    name: String<MAX_TOPIC_LEN>,
    topic_id: u16,
    used_at: u64,
    locked: bool,
}

/// Bounded name-to-id cache with lock-aware LRU eviction.
pub(crate) struct TopicCache<const N: usize> {
    slots: [Option<RegEntry>; N],
}

impl<const N: usize> TopicCache<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
        }
    }

    /// Looks up the id for a topic name, refreshing its recency stamp.
    pub fn lookup(&mut self, name: &str, now: u64) -> Option<u16> {
        let entry = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.name.as_str() == name)?;
        entry.used_at = now;
        Some(entry.topic_id)
    }

    /// Resolves a topic id back to its name, without touching recency.
    pub fn lookup_name(&self, topic_id: u16) -> Option<&str> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.topic_id == topic_id)
            .map(|e| e.name.as_str())
    }

    /// Stores or refreshes a name-to-id mapping.
    ///
    /// A refresh ORs the lock flag so a pinned entry stays pinned. Returns
    /// `false` when the name does not fit or every slot is locked.
    pub fn register(&mut self, name: &str, topic_id: u16, locked: bool, now: u64) -> bool {
        if let Some(entry) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.name.as_str() == name)
        {
            entry.topic_id = topic_id;
            entry.used_at = now;
            entry.locked |= locked;
            return true;
        }
        let mut owned: String<MAX_TOPIC_LEN> = String::new();
        if owned.push_str(name).is_err() {
            return false;
        }
        let entry = RegEntry {
            name: owned,
            topic_id,
            used_at: now,
            locked,
        };
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(entry);
            return true;
        }
        // full: evict the stalest unlocked entry, never a locked one
        let victim = self
            .slots
            .iter_mut()
            .filter(|s| s.as_ref().is_some_and(|e| !e.locked))
            .min_by_key(|s| s.as_ref().map(|e| e.used_at));
        match victim {
            Some(slot) => {
                *slot = Some(entry);
                true
            }
            None => false,
        }
    }

    /// Forgets the entry for an id the gateway reported as invalid.
    pub fn drop_id(&mut self, topic_id: u16) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|e| e.topic_id == topic_id) {
                *slot = None;
            }
        }
    }

    /// Pins or unpins the entry holding `topic_id`.
    pub fn set_locked(&mut self, topic_id: u16, locked: bool) {
        for entry in self.slots.iter_mut().flatten() {
            if entry.topic_id == topic_id {
                entry.locked = locked;
            }
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
