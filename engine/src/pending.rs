/// Items staged in memory because they matched neither a cluster nor
/// another staged item.
///
/// Insertion order is preserved so that ties in best-match scans resolve to
/// the earliest staged item. Nothing here is persisted: a staged item stays
/// unassigned in the store and is fetched again by the next run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSet {
    entries: Vec<(i64, Vec<f32>)>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an item, replacing any previous embedding for the same id.
    pub fn insert(&mut self, item_id: i64, embedding: Vec<f32>) {
        match self.entries.iter_mut().find(|(id, _)| *id == item_id) {
            Some(entry) => entry.1 = embedding,
            None => self.entries.push((item_id, embedding)),
        }
    }

    pub fn remove(&mut self, item_id: i64) -> Option<Vec<f32>> {
        let pos = self.entries.iter().position(|(id, _)| *id == item_id)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, item_id: i64) -> bool {
        self.entries.iter().any(|(id, _)| *id == item_id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(i64) -> bool) {
        self.entries.retain(|(id, _)| keep(*id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f32])> {
        self.entries.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    pub fn ids(&self) -> Vec<i64> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut p = PendingSet::new();
        p.insert(3, vec![1.0]);
        p.insert(1, vec![2.0]);
        p.insert(3, vec![9.0]);
        assert_eq!(p.ids(), vec![3, 1]);
        assert_eq!(p.iter().next().unwrap().1, &[9.0]);
    }

    #[test]
    fn test_remove_and_retain() {
        let mut p = PendingSet::new();
        p.insert(1, vec![1.0]);
        p.insert(2, vec![2.0]);
        p.insert(3, vec![3.0]);

        assert_eq!(p.remove(2), Some(vec![2.0]));
        assert_eq!(p.remove(2), None);
        p.retain(|id| id != 1);
        assert_eq!(p.ids(), vec![3]);
        assert!(p.contains(3));
        assert_eq!(p.len(), 1);
    }
}
