//! Embedded ordered byte store with prefix iteration and atomic batches.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use crate::error::{Error, Result};

/// Handle to the embedded ordered key-value store.
///
/// Cheap to clone; clones share the same underlying database. Opening
/// the store is expected at process startup and failure there is fatal
/// to the embedding process.
#[derive(Clone)]
pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a throwaway in-memory store.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Read a value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    /// Write a value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Delete a key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    /// Iterate every entry whose key starts with `prefix`, in key order.
    pub fn iter_prefix(
        &self,
        prefix: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix)
            .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Error::from))
    }

    /// Iterate entries under `prefix` starting at `start` (inclusive), in
    /// key order.
    pub fn seek(
        &self,
        prefix: &[u8],
        start: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {
        let upper = match prefix_upper_bound(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        self.db
            .range((Bound::Included(start.to_vec()), upper))
            .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Error::from))
    }

    /// Start an atomic write batch.
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Flush dirty buffers to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// The exclusive upper bound of a prefix scan: the prefix with its last
/// non-0xff byte incremented. `None` when no upper bound exists.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// A buffered set of writes committed atomically.
///
/// The pending set is inspectable and individual operations can be
/// cancelled before commit; the scanner uses this to drop index entries
/// for outputs that are produced and spent within the same window.
#[derive(Default)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch {
    /// Buffer a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.insert(key, Some(value));
    }

    /// Buffer a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.insert(key, None);
    }

    /// The value a pending put would write for `key`, if any.
    pub fn pending(&self, key: &[u8]) -> Option<&Vec<u8>> {
        match self.ops.get(key) {
            Some(Some(value)) => Some(value),
            _ => None,
        }
    }

    /// Drop a buffered operation entirely.
    pub fn cancel(&mut self, key: &[u8]) {
        self.ops.remove(key);
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commit every buffered operation atomically and flush.
    pub fn commit(self, store: &KvStore) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (key, op) in self.ops {
            match op {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        store.db.apply_batch(batch)?;
        store.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> KvStore {
        KvStore::open_temporary().unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let store = open();
        store.put(b"k1", b"v1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
    }

    #[test]
    fn test_prefix_iteration_is_ordered() {
        let store = open();
        store.put(b"A\x02", b"2").unwrap();
        store.put(b"A\x01", b"1").unwrap();
        store.put(b"B\x00", b"x").unwrap();
        store.put(b"A\x03", b"3").unwrap();

        let keys: Vec<Vec<u8>> = store
            .iter_prefix(b"A")
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"A\x01".to_vec(), b"A\x02".to_vec(), b"A\x03".to_vec()]);
    }

    #[test]
    fn test_seek_starts_mid_range_and_respects_prefix() {
        let store = open();
        for i in 0u8..6 {
            store.put(&[b'P', i], &[i]).unwrap();
        }
        store.put(b"Q\x00", b"other").unwrap();

        let keys: Vec<Vec<u8>> = store
            .seek(b"P", &[b'P', 3])
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![vec![b'P', 3], vec![b'P', 4], vec![b'P', 5]]);
    }

    #[test]
    fn test_batch_commit_is_atomic_and_visible() {
        let store = open();
        store.put(b"stale", b"old").unwrap();

        let mut batch = store.batch();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"stale".to_vec());
        batch.commit(&store).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"stale").unwrap(), None);
    }

    #[test]
    fn test_batch_pending_and_cancel() {
        let store = open();
        let mut batch = store.batch();
        batch.put(b"k".to_vec(), b"v".to_vec());
        assert_eq!(batch.pending(b"k"), Some(&b"v".to_vec()));

        batch.cancel(b"k");
        assert_eq!(batch.pending(b"k"), None);
        batch.commit(&store).unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_prefix_upper_bound_handles_0xff_tails() {
        assert_eq!(prefix_upper_bound(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x61, 0xff]), Some(vec![0x62]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }

    #[test]
    fn test_reopen_sees_flushed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        {
            let store = KvStore::open(&path).unwrap();
            let mut batch = store.batch();
            batch.put(b"k".to_vec(), b"v".to_vec());
            batch.commit(&store).unwrap();
        }
        let store = KvStore::open(&path).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
