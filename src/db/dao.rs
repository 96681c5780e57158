//! DAO contracts.

use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use super::DbSession;
use crate::error::Result;

/// A persisted row identified by a key of type `K`.
pub trait Dto<K>: Clone + Send + Sync + 'static {
    fn key(&self) -> K;

    /// When the row was last written, if ever.
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

/// Keyed CRUD plus a change feed over rows of type `E`.
///
/// Writes are staged on the caller's session. Existence checks for `insert`
/// and `update` run against committed rows.
pub trait Dao<E, K>
where
    E: Dto<K>,
    K: Eq + Hash + Ord + Clone + Debug + Send + Sync + 'static,
{
    /// Committed row for `key`.
    fn get_by_key(&self, key: &K) -> Option<E>;

    /// Stage a new row. Returns the row stamped with its write time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`](crate::Error::DuplicateKey) when a row
    /// with the same key exists.
    fn insert(&self, session: &mut DbSession, item: E) -> Result<E>;

    /// Stage a replacement of an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) when no row has
    /// the item's key.
    fn update(&self, session: &mut DbSession, item: E) -> Result<E>;

    /// Stage removal of `item`'s row. Missing rows are ignored.
    fn delete(&self, session: &mut DbSession, item: &E) {
        self.delete_by_key(session, item.key());
    }

    /// Stage removal of the row with `key`. Missing rows are ignored.
    fn delete_by_key(&self, session: &mut DbSession, key: K);

    /// Keys of committed rows written strictly after `timestamp`, sorted.
    fn keys_of_rows_updated_after(&self, timestamp: DateTime<Utc>) -> Vec<K>;
}
