//! Session
//!
//! Holds the current snapshot for a front end. Readers take an `Arc` of the
//! snapshot and may inspect it for as long as they like; edits hold the
//! write lock from start to finish, so they are applied one at a time and
//! each sees the result of the previous one.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{Edit, State};
use crate::error::Result;

/// The current snapshot plus serialized edit application.
#[derive(Debug)]
pub struct Session {
    current: RwLock<Arc<State>>,
}

impl Session {
    /// Start a session from an initial state.
    pub fn new(state: State) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.current.read())
    }

    /// Apply an edit to the current snapshot. On success the new snapshot
    /// becomes current; on failure the current snapshot is unchanged.
    pub fn apply(&self, edit: Edit) -> Result<Arc<State>> {
        let mut current = self.current.write();
        let name = edit.name();
        let next = Arc::new(current.apply(edit)?);
        *current = Arc::clone(&next);
        debug!(edit = name, "session advanced");
        Ok(next)
    }

    /// Run an arbitrary Mutation API call against the current snapshot and
    /// keep whatever extra value it returns (typically new keys).
    pub fn edit<T>(&self, f: impl FnOnce(&State) -> Result<(State, T)>) -> Result<T> {
        let mut current = self.current.write();
        let (next, extra) = f(&current)?;
        *current = Arc::new(next);
        Ok(extra)
    }

    /// Replace the current snapshot wholesale, e.g. to undo.
    pub fn restore(&self, state: Arc<State>) {
        *self.current.write() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::grid::Coord;

    fn session() -> Session {
        Session::new(State::new(EngineConfig::default().with_size(4, 2)).unwrap())
    }

    #[test]
    fn old_snapshots_are_unaffected_by_edits() {
        let session = session();
        let before = session.snapshot();
        session.apply(Edit::SetSink(Coord::new(1, 1))).unwrap();
        assert_eq!(before.grid().sink(), None);
        assert_eq!(session.snapshot().grid().sink(), Some(Coord::new(1, 1)));
    }

    #[test]
    fn failed_edit_keeps_current_snapshot() {
        let session = session();
        let before = session.snapshot();
        assert!(session.apply(Edit::SetSink(Coord::new(9, 9))).is_err());
        assert!(Arc::ptr_eq(&before, &session.snapshot()));
    }

    #[test]
    fn edit_returns_created_keys() {
        let session = session();
        session.apply(Edit::SetSink(Coord::new(3, 1))).unwrap();
        let group = session.edit(|state| state.add_source(Coord::new(0, 0))).unwrap();
        assert!(session.snapshot().node(group).is_some());
    }

    #[test]
    fn restore_rolls_back() {
        let session = session();
        let before = session.snapshot();
        session.apply(Edit::ResizeX(8)).unwrap();
        session.restore(Arc::clone(&before));
        assert_eq!(session.snapshot().grid().width(), 4);
    }
}
