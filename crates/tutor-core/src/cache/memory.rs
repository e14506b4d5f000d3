//! In-memory LRU tier with a byte budget.

use indexmap::IndexMap;

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    size_bytes: usize,
    expires_at: f64,
}

/// Result of a memory-tier lookup.
#[derive(Debug, PartialEq)]
pub enum MemoryLookup {
    Hit(String),
    /// Present but past its expiry; the entry has been removed.
    Expired,
    Miss,
}

/// Insertion order doubles as recency order: the front is the least
/// recently used entry.
#[derive(Debug)]
pub struct MemoryTier {
    entries: IndexMap<String, MemoryEntry>,
    max_bytes: usize,
    current_bytes: usize,
}

/// Size estimate of one entry: serialized value plus key.
pub fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

impl MemoryTier {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max_bytes,
            current_bytes: 0,
        }
    }

    pub fn get(&mut self, key: &str, now: f64) -> MemoryLookup {
        let Some(entry) = self.entries.shift_remove(key) else {
            return MemoryLookup::Miss;
        };
        if entry.expires_at <= now {
            self.current_bytes -= entry.size_bytes;
            return MemoryLookup::Expired;
        }
        let value = entry.value.clone();
        self.entries.insert(key.to_string(), entry);
        MemoryLookup::Hit(value)
    }

    /// Insert or replace `key`, evicting least recently used entries until
    /// the budget holds. Returns the number of evictions, or `None` when the
    /// entry alone exceeds the whole budget and was not stored.
    pub fn insert(&mut self, key: &str, value: String, expires_at: f64) -> Option<usize> {
        let size_bytes = entry_size(key, &value);
        self.remove(key);
        if size_bytes > self.max_bytes {
            return None;
        }
        let mut evicted = 0;
        while self.current_bytes + size_bytes > self.max_bytes {
            let Some((_, old)) = self.entries.shift_remove_index(0) else {
                break;
            };
            self.current_bytes -= old.size_bytes;
            evicted += 1;
        }
        self.current_bytes += size_bytes;
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                size_bytes,
                expires_at,
            },
        );
        Some(evicted)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.shift_remove(key) {
            Some(old) => {
                self.current_bytes -= old.size_bytes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    pub fn purge_expired(&mut self, now: f64) -> usize {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                freed += entry.size_bytes;
            }
            live
        });
        self.current_bytes -= freed;
        before - self.entries.len()
    }

    /// Live entries whose key starts with `prefix`.
    pub fn count_live(&self, prefix: &str, now: f64) -> usize {
        self.entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_miss_and_expiry() {
        let mut tier = MemoryTier::new(1024);
        assert_eq!(tier.insert("a", "1".into(), 10.0), Some(0));
        assert_eq!(tier.get("a", 5.0), MemoryLookup::Hit("1".into()));
        assert_eq!(tier.get("b", 5.0), MemoryLookup::Miss);
        assert_eq!(tier.get("a", 10.0), MemoryLookup::Expired);
        assert_eq!(tier.get("a", 10.0), MemoryLookup::Miss);
        assert_eq!(tier.current_bytes(), 0);
    }

    #[test]
    fn test_lru_eviction_order() {
        // each entry: 1 byte key + 9 byte value
        let mut tier = MemoryTier::new(30);
        tier.insert("a", "x".repeat(9), 100.0);
        tier.insert("b", "x".repeat(9), 100.0);
        tier.insert("c", "x".repeat(9), 100.0);
        // touch "a" so "b" becomes least recent
        assert!(matches!(tier.get("a", 0.0), MemoryLookup::Hit(_)));
        assert_eq!(tier.insert("d", "x".repeat(9), 100.0), Some(1));
        assert_eq!(tier.get("b", 0.0), MemoryLookup::Miss);
        assert!(matches!(tier.get("a", 0.0), MemoryLookup::Hit(_)));
        assert_eq!(tier.current_bytes(), 30);
    }

    #[test]
    fn test_oversized_entry_is_skipped() {
        let mut tier = MemoryTier::new(8);
        tier.insert("a", "1".into(), 100.0);
        assert_eq!(tier.insert("big", "x".repeat(64), 100.0), None);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_replace_keeps_accounting() {
        let mut tier = MemoryTier::new(100);
        tier.insert("k", "12345".into(), 100.0);
        tier.insert("k", "12".into(), 100.0);
        assert_eq!(tier.current_bytes(), 3);
        assert!(tier.remove("k"));
        assert_eq!(tier.current_bytes(), 0);
    }

    #[test]
    fn test_purge_and_count_live() {
        let mut tier = MemoryTier::new(1024);
        tier.insert("session:1", "{}".into(), 5.0);
        tier.insert("session:2", "{}".into(), 50.0);
        tier.insert("resource:x", "{}".into(), 50.0);
        assert_eq!(tier.count_live("session:", 10.0), 1);
        assert_eq!(tier.purge_expired(10.0), 1);
        assert_eq!(tier.len(), 2);
        tier.clear();
        assert!(tier.is_empty());
        assert_eq!(tier.current_bytes(), 0);
    }
}
