/// An indexed min-priority queue over the ids `0..N`, for tiny fixed `N`.
///
/// Entries live in a flat array sorted by key, so every mutation is a short
/// shift. An entry whose key equals existing keys is placed after them.
#[derive(Debug, Clone)]
pub struct SmallPriorityQueue<const N: usize> {
    keys: [i64; N],
    ids: [usize; N],
    // id -> position in `keys`/`ids`
    index: [Option<usize>; N],
    len: usize,
}

impl<const N: usize> SmallPriorityQueue<N> {
    pub fn new() -> Self {
        Self {
            keys: [0; N],
            ids: [0; N],
            index: [None; N],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: usize) -> bool {
        id < N && self.index[id].is_some()
    }

    pub fn min_id(&self) -> Option<usize> {
        (self.len > 0).then(|| self.ids[0])
    }

    pub fn min_key(&self) -> Option<i64> {
        (self.len > 0).then(|| self.keys[0])
    }

    pub fn key_of(&self, id: usize) -> Option<i64> {
        self.index.get(id).copied().flatten().map(|pos| self.keys[pos])
    }

    pub fn insert(&mut self, id: usize, key: i64) {
        debug_assert!(id < N, "id {id} out of range");
        debug_assert!(!self.contains(id), "id {id} already queued");

        let pos = self.keys[..self.len].partition_point(|&k| k <= key);
        for i in (pos..self.len).rev() {
            self.keys[i + 1] = self.keys[i];
            self.ids[i + 1] = self.ids[i];
            self.index[self.ids[i + 1]] = Some(i + 1);
        }
        self.keys[pos] = key;
        self.ids[pos] = id;
        self.index[id] = Some(pos);
        self.len += 1;
    }

    /// Removes `id`, returning its key if it was queued.
    pub fn erase(&mut self, id: usize) -> Option<i64> {
        let pos = self.index.get_mut(id)?.take()?;
        let key = self.keys[pos];
        for i in pos + 1..self.len {
            self.keys[i - 1] = self.keys[i];
            self.ids[i - 1] = self.ids[i];
            self.index[self.ids[i - 1]] = Some(i - 1);
        }
        self.len -= 1;
        Some(key)
    }

    pub fn change_key(&mut self, id: usize, key: i64) {
        if self.erase(id).is_some() {
            self.insert(id, key);
        } else {
            debug_assert!(false, "change_key on absent id {id}");
        }
    }

    pub fn change_min_key(&mut self, key: i64) {
        if let Some(id) = self.min_id() {
            self.change_key(id, key);
        }
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.ids[..self.len]
            .iter()
            .copied()
            .zip(self.keys[..self.len].iter().copied())
    }
}

impl<const N: usize> Default for SmallPriorityQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_min_at_front() {
        let mut q = SmallPriorityQueue::<4>::new();
        q.insert(2, 10);
        q.insert(0, 30);
        q.insert(3, 5);
        assert_eq!(q.min_id(), Some(3));
        assert_eq!(q.min_key(), Some(5));
        assert_eq!(q.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![3, 2, 0]);
    }

    #[test]
    fn erase_and_reinsert() {
        let mut q = SmallPriorityQueue::<4>::new();
        q.insert(1, 1);
        q.insert(2, 2);
        q.insert(3, 3);
        assert_eq!(q.erase(1), Some(1));
        assert_eq!(q.erase(1), None);
        assert!(!q.contains(1));
        assert_eq!(q.min_id(), Some(2));
        assert_eq!(q.key_of(3), Some(3));
        q.insert(1, 100);
        assert_eq!(q.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut q = SmallPriorityQueue::<4>::new();
        q.insert(0, 7);
        q.insert(1, 7);
        assert_eq!(q.min_id(), Some(0));
        q.change_min_key(7);
        assert_eq!(q.min_id(), Some(1));
    }

    #[test]
    fn change_min_key_moves_entry_back() {
        let mut q = SmallPriorityQueue::<3>::new();
        q.insert(0, 0);
        q.insert(1, 8);
        q.change_min_key(9);
        assert_eq!(q.min_id(), Some(1));
        assert_eq!(q.key_of(0), Some(9));
        q.erase(0);
        q.erase(1);
        assert!(q.is_empty());
        assert_eq!(q.min_id(), None);
    }
}
