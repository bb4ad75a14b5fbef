/// Fixed-capacity cache with strict least-recently-used eviction.
///
/// Entries live in a slab threaded by a doubly-linked recency list; a hash
/// map finds the slot for a key. `get` and `put` are O(1).
///
/// Eviction contract: when `put` inserts a new key into a full cache, the
/// entry whose last `get` or `put` is oldest is removed. Reads refresh
/// recency; a `put` on a present key refreshes recency and replaces the value.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    map: std::collections::HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LruCache {
            capacity,
            map: std::collections::HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a clone of the value for `key` and marks it most recent.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let slot = *self.map.get(key)?;
        self.move_to_front(slot);
        Some(self.nodes[slot].value.clone())
    }

    /// Inserts or replaces `key`, evicting the least recent entry when full.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(&slot) = self.map.get(&key) {
            self.nodes[slot].value = value;
            self.move_to_front(slot);
            return;
        }

        let slot = if self.map.len() >= self.capacity {
            // Reuse the tail slot for the new entry.
            let Some(slot) = self.tail else {
                return;
            };
            self.unlink(slot);
            let old = std::mem::replace(
                &mut self.nodes[slot],
                Node { key: key.clone(), value, prev: None, next: None },
            );
            self.map.remove(&old.key);
            slot
        } else {
            self.nodes.push(Node { key: key.clone(), value, prev: None, next: None });
            self.nodes.len() - 1
        };

        self.map.insert(key, slot);
        self.push_front(slot);
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            keys.push(self.nodes[slot].key.clone());
            cursor = self.nodes[slot].next;
        }
        keys
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}
