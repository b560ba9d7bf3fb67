use std::fs;
use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Str, U64};
use heed::{Database, Env, EnvOpenOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::range::KeyRange;
use relay_conn::OrderDirection;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Nodes stored as JSON under big-endian `u64` keys, so LMDB's byte order
/// is the numeric key order.
pub struct HeedStore {
    env: Env,
    nodes: Database<U64<BigEndian>, Str>,
}

impl HeedStore {
    /// Opens or creates an LMDB environment at the given path.
    ///
    /// # Arguments
    /// * `path` - Directory path for the LMDB environment
    /// * `map_size` - Maximum size of the database in bytes (default: 1GB)
    pub fn open<P: AsRef<Path>>(path: P, map_size: Option<usize>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size.unwrap_or(1024 * 1024 * 1024))
                .max_dbs(1)
                .open(path)
        }?;

        let mut wtxn = env.write_txn()?;
        let nodes: Database<U64<BigEndian>, Str> =
            env.create_database(&mut wtxn, Some("nodes"))?;
        wtxn.commit()?;

        Ok(Self { env, nodes })
    }

    pub fn put<N: Serialize>(&self, key: u64, node: &N) -> Result<(), StoreError> {
        self.put_all([(key, node)])
    }

    /// Writes every `(key, node)` pair in a single transaction.
    pub fn put_all<'a, N, I>(&self, entries: I) -> Result<(), StoreError>
    where
        N: Serialize + 'a,
        I: IntoIterator<Item = (u64, &'a N)>,
    {
        let mut wtxn = self.env.write_txn()?;
        for (key, node) in entries {
            let json = serde_json::to_string(node)?;
            self.nodes.put(&mut wtxn, &key, &json)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    pub fn get<N: DeserializeOwned>(&self, key: u64) -> Result<Option<N>, StoreError> {
        let rtxn = self.env.read_txn()?;
        match self.nodes.get(&rtxn, &key)? {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    /// Returns whether the key was present.
    pub fn delete(&self, key: u64) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.nodes.delete(&mut wtxn, &key)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    /// Walks the window of `range` in its direction, stopping after `cap`
    /// entries when given. Returns the number of entries visited.
    pub(crate) fn scan<F>(
        &self,
        range: &KeyRange,
        cap: Option<usize>,
        mut visit: F,
    ) -> Result<usize, StoreError>
    where
        F: FnMut(u64, &str) -> Result<(), StoreError>,
    {
        if range.is_empty() {
            return Ok(0);
        }
        let take = match (range.limit(), cap) {
            (Some(limit), Some(cap)) => limit.min(cap),
            (limit, cap) => limit.or(cap).unwrap_or(usize::MAX),
        };

        let rtxn = self.env.read_txn()?;
        let bounds = range.bounds();
        let iter: Box<dyn Iterator<Item = heed::Result<(u64, &str)>> + '_> = match range.direction() {
            OrderDirection::Asc => Box::new(self.nodes.range(&rtxn, &bounds)?),
            OrderDirection::Desc => Box::new(self.nodes.rev_range(&rtxn, &bounds)?),
        };

        let mut seen = 0;
        for entry in iter.skip(range.offset()).take(take) {
            let (key, json) = entry?;
            visit(key, json)?;
            seen += 1;
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = HeedStore::open(dir.path().join("db"), None).unwrap();

        store.put(7, &serde_json::json!({"id": 7})).unwrap();
        let node: Option<serde_json::Value> = store.get(7).unwrap();
        assert_eq!(node, Some(serde_json::json!({"id": 7})));

        assert!(store.delete(7).unwrap());
        assert!(!store.delete(7).unwrap());
        assert_eq!(store.get::<serde_json::Value>(7).unwrap(), None);
    }

    #[test]
    fn test_scan_follows_key_order() {
        let dir = tempdir().unwrap();
        let store = HeedStore::open(dir.path().join("db"), None).unwrap();
        // 256 sorts after 1 only with big-endian keys.
        for key in [256u64, 1, 3, 2] {
            store.put(key, &key).unwrap();
        }

        let mut keys = Vec::new();
        let seen = store
            .scan(&KeyRange::all(), None, |key, _| {
                keys.push(key);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, 4);
        assert_eq!(keys, vec![1, 2, 3, 256]);

        keys.clear();
        let mut range = KeyRange::all();
        range.set_direction(OrderDirection::Desc);
        range.skip(1);
        store
            .scan(&range, Some(2), |key, _| {
                keys.push(key);
                Ok(())
            })
            .unwrap();
        assert_eq!(keys, vec![3, 2]);
    }
}
