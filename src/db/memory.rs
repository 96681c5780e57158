//! In-memory DAO.
//!
//! Rows live in a `DashMap` shared between clones of the DAO and the writes
//! staged on sessions, so a commit can apply them without borrowing the DAO.
//!
//! An insert reserves its key until the session commits or discards the
//! write. A second insert of a reserved key fails right away, whichever
//! session it comes from.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{Dao, DbSession, Dto};
use crate::error::{Error, Result};

/// DAO keeping committed rows in memory.
pub struct MemoryDao<E, K> {
    rows: Arc<DashMap<K, E>>,
    /// Keys of uncommitted inserts, by owning session.
    reserved: Arc<DashMap<K, Uuid>>,
    _key: PhantomData<fn() -> K>,
}

impl<E, K> Clone for MemoryDao<E, K> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            reserved: Arc::clone(&self.reserved),
            _key: PhantomData,
        }
    }
}

impl<E, K> Default for MemoryDao<E, K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            reserved: Arc::new(DashMap::new()),
            _key: PhantomData,
        }
    }
}

impl<E, K> MemoryDao<E, K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<E, K> MemoryDao<E, K>
where
    E: Dto<K>,
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync + 'static,
{
    fn stage_put(&self, session: &mut DbSession, mut item: E) -> E {
        item.set_updated_at(Utc::now());
        let rows = Arc::clone(&self.rows);
        let staged = item.clone();
        session.stage(move || {
            rows.insert(staged.key(), staged);
        });
        item
    }

    fn reserve(&self, session: &DbSession, key: &K) -> Result<()> {
        match self.reserved.entry(key.clone()) {
            Entry::Occupied(_) => return Err(Error::DuplicateKey(format!("{key:?}"))),
            Entry::Vacant(slot) => {
                slot.insert(session.id());
            },
        }
        // Commits insert the row before releasing the key, so a reservation
        // taken here cannot miss a row committed concurrently
        if self.rows.contains_key(key) {
            self.reserved.remove(key);
            return Err(Error::DuplicateKey(format!("{key:?}")));
        }
        Ok(())
    }
}

fn release<K: Eq + Hash>(reserved: &DashMap<K, Uuid>, key: &K, owner: Uuid) {
    reserved.remove_if(key, |_, session| *session == owner);
}

impl<E, K> Dao<E, K> for MemoryDao<E, K>
where
    E: Dto<K>,
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync + 'static,
{
    fn get_by_key(&self, key: &K) -> Option<E> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    fn insert(&self, session: &mut DbSession, mut item: E) -> Result<E> {
        let key = item.key();
        self.reserve(session, &key)?;

        item.set_updated_at(Utc::now());
        let owner = session.id();
        let rows = Arc::clone(&self.rows);
        let reserved = Arc::clone(&self.reserved);
        let abandoned = Arc::clone(&self.reserved);
        let abandoned_key = key.clone();
        let staged = item.clone();
        session.stage_with_discard(
            move || {
                rows.insert(key.clone(), staged);
                release(&reserved, &key, owner);
            },
            move || release(&abandoned, &abandoned_key, owner),
        );
        Ok(item)
    }

    fn update(&self, session: &mut DbSession, item: E) -> Result<E> {
        let key = item.key();
        if !self.rows.contains_key(&key) {
            return Err(Error::NotFound(format!("{key:?}")));
        }
        Ok(self.stage_put(session, item))
    }

    fn delete_by_key(&self, session: &mut DbSession, key: K) {
        let rows = Arc::clone(&self.rows);
        session.stage(move || {
            rows.remove(&key);
        });
    }

    fn keys_of_rows_updated_after(&self, timestamp: DateTime<Utc>) -> Vec<K> {
        let mut keys: Vec<K> = self
            .rows
            .iter()
            .filter(|row| row.value().updated_at().is_some_and(|at| at > timestamp))
            .map(|row| row.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct RuleDto {
        key: String,
        name: String,
        updated_at: Option<DateTime<Utc>>,
    }

    impl RuleDto {
        fn new(key: &str, name: &str) -> Self {
            Self {
                key: key.to_string(),
                name: name.to_string(),
                updated_at: None,
            }
        }
    }

    impl Dto<String> for RuleDto {
        fn key(&self) -> String {
            self.key.clone()
        }

        fn updated_at(&self) -> Option<DateTime<Utc>> {
            self.updated_at
        }

        fn set_updated_at(&mut self, at: DateTime<Utc>) {
            self.updated_at = Some(at);
        }
    }

    #[test]
    fn test_insert_visible_after_commit() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();

        let stored = dao.insert(&mut session, RuleDto::new("r1", "Rule")).unwrap();
        assert!(stored.updated_at.is_some());
        assert!(dao.get_by_key(&"r1".to_string()).is_none());

        session.commit();
        assert_eq!(dao.get_by_key(&"r1".to_string()), Some(stored));
    }

    #[test]
    fn test_uncommitted_session_discarded() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        {
            let mut session = DbSession::new();
            dao.insert(&mut session, RuleDto::new("r1", "Rule")).unwrap();
        }
        assert!(dao.is_empty());
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("r1", "Rule")).unwrap();
        session.commit();

        let err = dao.insert(&mut session, RuleDto::new("r1", "Other")).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
    }

    #[test]
    fn test_insert_same_key_from_two_sessions() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut first = DbSession::new();
        let mut second = DbSession::new();

        dao.insert(&mut first, RuleDto::new("r1", "first")).unwrap();
        let err = dao
            .insert(&mut second, RuleDto::new("r1", "second"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));

        first.commit();
        second.commit();
        assert_eq!(dao.get_by_key(&"r1".to_string()).unwrap().name, "first");
        assert_eq!(dao.len(), 1);

        let err = dao
            .insert(&mut second, RuleDto::new("r1", "again"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
    }

    #[test]
    fn test_insert_same_key_twice_in_one_session() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("r1", "first")).unwrap();

        let err = dao
            .insert(&mut session, RuleDto::new("r1", "second"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(session.commit(), 1);
        assert_eq!(dao.get_by_key(&"r1".to_string()).unwrap().name, "first");
    }

    #[test]
    fn test_discarded_insert_releases_key() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut rolled_back = DbSession::new();
        dao.insert(&mut rolled_back, RuleDto::new("r1", "rolled back")).unwrap();
        rolled_back.rollback();

        {
            let mut dropped = DbSession::new();
            dao.insert(&mut dropped, RuleDto::new("r1", "dropped")).unwrap();
        }

        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("r1", "kept")).unwrap();
        session.commit();
        assert_eq!(dao.get_by_key(&"r1".to_string()).unwrap().name, "kept");
    }

    #[test]
    fn test_concurrent_inserts_admit_one() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dao = dao.clone();
                std::thread::spawn(move || {
                    let mut session = DbSession::new();
                    let inserted = dao
                        .insert(&mut session, RuleDto::new("r1", &format!("writer {i}")))
                        .is_ok();
                    session.commit();
                    inserted
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(dao.len(), 1);
    }

    #[test]
    fn test_update_missing_fails() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();
        let err = dao.update(&mut session, RuleDto::new("r1", "Rule")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_update_and_delete() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("r1", "Rule")).unwrap();
        dao.insert(&mut session, RuleDto::new("r2", "Rule 2")).unwrap();
        session.commit();

        dao.update(&mut session, RuleDto::new("r1", "Renamed")).unwrap();
        let r2 = dao.get_by_key(&"r2".to_string()).unwrap();
        dao.delete(&mut session, &r2);
        session.commit();

        assert_eq!(dao.get_by_key(&"r1".to_string()).unwrap().name, "Renamed");
        assert!(dao.get_by_key(&"r2".to_string()).is_none());

        dao.delete_by_key(&mut session, "r1".to_string());
        dao.delete_by_key(&mut session, "missing".to_string());
        session.commit();
        assert!(dao.is_empty());
    }

    #[test]
    fn test_keys_of_rows_updated_after() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("old", "Old")).unwrap();
        session.commit();

        std::thread::sleep(Duration::from_millis(5));
        let checkpoint = Utc::now();
        std::thread::sleep(Duration::from_millis(5));

        dao.insert(&mut session, RuleDto::new("b", "B")).unwrap();
        dao.insert(&mut session, RuleDto::new("a", "A")).unwrap();
        session.commit();

        assert_eq!(dao.keys_of_rows_updated_after(checkpoint), vec!["a", "b"]);
        assert_eq!(dao.len(), 3);
    }

    #[test]
    fn test_clones_share_rows() {
        let dao: MemoryDao<RuleDto, String> = MemoryDao::new();
        let other = dao.clone();
        let mut session = DbSession::new();
        dao.insert(&mut session, RuleDto::new("r1", "Rule")).unwrap();
        session.commit();
        assert_eq!(other.len(), 1);
    }
}
