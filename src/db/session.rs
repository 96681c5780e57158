//! Caller-owned write session.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

type Action = Box<dyn FnOnce() + Send>;

/// A queued write and what to undo if it never gets applied.
struct StagedWrite {
    apply: Action,
    discard: Option<Action>,
}

impl StagedWrite {
    fn discard(self) {
        if let Some(discard) = self.discard {
            discard();
        }
    }
}

/// Writes staged by DAOs, applied together on [`commit`](Self::commit).
///
/// Dropping a session without committing discards everything it staged and
/// runs the discard hooks registered with it.
pub struct DbSession {
    id: Uuid,
    staged: Vec<StagedWrite>,
}

impl Default for DbSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DbSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            staged: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of writes waiting for commit.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Queue a write. Used by DAO implementations.
    pub fn stage(&mut self, write: impl FnOnce() + Send + 'static) {
        self.staged.push(StagedWrite {
            apply: Box::new(write),
            discard: None,
        });
    }

    /// Queue a write together with a hook run instead of it on rollback or
    /// drop. DAOs use the hook to release what they reserved for the write.
    pub fn stage_with_discard(
        &mut self,
        write: impl FnOnce() + Send + 'static,
        discard: impl FnOnce() + Send + 'static,
    ) {
        self.staged.push(StagedWrite {
            apply: Box::new(write),
            discard: Some(Box::new(discard)),
        });
    }

    /// Apply staged writes in the order they were staged. Returns how many
    /// were applied. The session stays usable afterwards.
    pub fn commit(&mut self) -> usize {
        let writes = std::mem::take(&mut self.staged);
        let count = writes.len();
        for write in writes {
            (write.apply)();
        }
        debug!(session = %self.id, writes = count, "Session committed");
        count
    }

    /// Discard staged writes. Returns how many were dropped.
    pub fn rollback(&mut self) -> usize {
        let writes = std::mem::take(&mut self.staged);
        let count = writes.len();
        writes.into_iter().for_each(StagedWrite::discard);
        if count > 0 {
            debug!(session = %self.id, writes = count, "Session rolled back");
        }
        count
    }
}

impl fmt::Debug for DbSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("id", &self.id)
            .field("pending", &self.staged.len())
            .finish()
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                session = %self.id,
                writes = self.staged.len(),
                "Session dropped with uncommitted writes"
            );
            std::mem::take(&mut self.staged)
                .into_iter()
                .for_each(StagedWrite::discard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_commit_applies_in_order() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut session = DbSession::new();
        for i in 0..3 {
            let log = Arc::clone(&log);
            session.stage(move || log.lock().push(i));
        }
        assert_eq!(session.pending(), 3);
        assert!(log.lock().is_empty());

        assert_eq!(session.commit(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(session.pending(), 0);
        assert_eq!(session.commit(), 0);
    }

    #[test]
    fn test_drop_discards() {
        let applied = Arc::new(AtomicUsize::new(0));
        {
            let mut session = DbSession::new();
            let applied = Arc::clone(&applied);
            session.stage(move || {
                applied.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_discard_hooks_run_only_without_commit() {
        let discarded = Arc::new(AtomicUsize::new(0));
        let hook = |discarded: &Arc<AtomicUsize>| {
            let discarded = Arc::clone(discarded);
            move || {
                discarded.fetch_add(1, Ordering::SeqCst);
            }
        };

        let mut session = DbSession::new();
        session.stage_with_discard(|| {}, hook(&discarded));
        session.commit();
        assert_eq!(discarded.load(Ordering::SeqCst), 0);

        session.stage_with_discard(|| {}, hook(&discarded));
        assert_eq!(session.rollback(), 1);
        assert_eq!(discarded.load(Ordering::SeqCst), 1);

        {
            let mut dropped = DbSession::new();
            dropped.stage_with_discard(|| {}, hook(&discarded));
        }
        assert_eq!(discarded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rollback() {
        let mut session = DbSession::new();
        session.stage(|| {});
        session.stage(|| {});
        assert_eq!(session.rollback(), 2);
        assert_eq!(session.commit(), 0);
    }
}
