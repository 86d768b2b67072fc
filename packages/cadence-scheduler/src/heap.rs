use slotmap::{Key, SecondaryMap};

/// Binary min-heap of `(value, key)` pairs with at most one entry per key.
///
/// Each key's slot in the backing array is tracked in a [`SecondaryMap`] and
/// kept current on every swap, so lookups, replacement and removal by key
/// never search the heap.
#[derive(Debug, Clone)]
pub struct IndexedHeap<K: Key, V: Ord> {
    entries: Vec<(V, K)>,
    positions: SecondaryMap<K, usize>,
}

impl<K: Key, V: Ord> IndexedHeap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            positions: SecondaryMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.positions.contains_key(key)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.positions.get(key).map(|&pos| &self.entries[pos].0)
    }

    pub fn peek(&self) -> Option<(K, &V)> {
        self.entries.first().map(|(value, key)| (*key, value))
    }

    pub fn peek_key(&self) -> Option<K> {
        self.entries.first().map(|(_, key)| *key)
    }

    /// Inserts `key`, or replaces its value if already present.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&pos) = self.positions.get(key) {
            self.entries[pos].0 = value;
            self.restore(pos);
            return;
        }
        let pos = self.entries.len();
        self.entries.push((value, key));
        self.positions.insert(key, pos);
        self.sift_up(pos);
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        let pos = self.positions.remove(key)?;
        let last = self.entries.len() - 1;
        if pos != last {
            self.entries.swap(pos, last);
            self.positions[self.entries[pos].1] = pos;
        }
        let (value, _) = self.entries.pop()?;
        if pos < self.entries.len() {
            self.restore(pos);
        }
        Some(value)
    }

    pub fn pop(&mut self) -> Option<(K, V)> {
        let key = self.peek_key()?;
        self.remove(key).map(|value| (key, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.entries.iter().map(|(value, key)| (*key, value))
    }

    fn restore(&mut self, pos: usize) {
        let pos = self.sift_up(pos);
        self.sift_down(pos);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos].0 >= self.entries[parent].0 {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.entries[right].0 < self.entries[left].0 {
                right
            } else {
                left
            };
            if self.entries[child].0 >= self.entries[pos].0 {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions[self.entries[a].1] = a;
        self.positions[self.entries[b].1] = b;
    }
}

impl<K: Key, V: Ord> Default for IndexedHeap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
