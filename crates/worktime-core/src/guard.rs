//! Single-active-timer guard.
//!
//! Maps every timer scope to the id of the one entry currently open in it.
//! Check and claim are separate calls, so callers must run both inside the
//! same critical section (the daemon runs them inside one actor command).

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::{OwnerId, TaskId};

/// What a task-level timer is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum TimerScope {
    /// All task timers of one user: a user runs at most one at a time.
    User { user_id: OwnerId },
    /// All timers of one task: a task is timed by at most one user at a time.
    Task { task_id: TaskId },
}

/// Index of open timers keyed by scope.
#[derive(Debug, Clone)]
pub struct ActiveTimerGuard<S, I> {
    open: HashMap<S, I>,
}

impl<S, I> Default for ActiveTimerGuard<S, I> {
    fn default() -> Self {
        Self {
            open: HashMap::new(),
        }
    }
}

impl<S, I> ActiveTimerGuard<S, I>
where
    S: Eq + Hash + Copy,
    I: Eq + Copy,
{
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id blocking `scope`, if a timer is open there.
    pub fn blocking(&self, scope: &S) -> Option<I> {
        self.open.get(scope).copied()
    }

    /// Returns the first id blocking any of `scopes`.
    pub fn first_blocking(&self, scopes: &[S]) -> Option<I> {
        scopes.iter().find_map(|scope| self.blocking(scope))
    }

    /// Checks every scope and claims all of them for `id` only if none is
    /// taken. Returns the blocking id otherwise.
    pub fn try_claim(&mut self, scopes: &[S], id: I) -> Result<(), I> {
        if let Some(blocking) = self.first_blocking(scopes) {
            return Err(blocking);
        }
        for scope in scopes {
            self.open.insert(*scope, id);
        }
        Ok(())
    }

    /// Releases every scope currently held by `id`.
    pub fn release(&mut self, id: I) {
        self.open.retain(|_, held| *held != id);
    }

    /// Returns true if `id` holds any scope.
    pub fn is_held_by(&self, id: I) -> bool {
        self.open.values().any(|held| *held == id)
    }

    /// Number of claimed scopes.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Returns true if nothing is claimed.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryId;

    fn user(id: u64) -> TimerScope {
        TimerScope::User {
            user_id: OwnerId::new(id),
        }
    }

    fn task(id: u64) -> TimerScope {
        TimerScope::Task {
            task_id: TaskId::new(id),
        }
    }

    #[test]
    fn test_claim_and_block() {
        let mut guard = ActiveTimerGuard::new();
        guard
            .try_claim(&[user(1), task(10)], EntryId::new(1))
            .unwrap();

        // Same user, other task
        assert_eq!(
            guard.try_claim(&[user(1), task(11)], EntryId::new(2)),
            Err(EntryId::new(1))
        );
        // Other user, same task
        assert_eq!(
            guard.try_claim(&[user(2), task(10)], EntryId::new(3)),
            Err(EntryId::new(1))
        );
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_failed_claim_takes_nothing() {
        let mut guard = ActiveTimerGuard::new();
        guard.try_claim(&[task(10)], EntryId::new(1)).unwrap();
        assert!(guard
            .try_claim(&[user(5), task(10)], EntryId::new(2))
            .is_err());
        assert_eq!(guard.blocking(&user(5)), None);
    }

    #[test]
    fn test_release_frees_all_scopes() {
        let mut guard = ActiveTimerGuard::new();
        guard
            .try_claim(&[user(1), task(10)], EntryId::new(1))
            .unwrap();
        guard.release(EntryId::new(1));
        assert!(guard.is_empty());
        assert!(guard
            .try_claim(&[user(2), task(10)], EntryId::new(2))
            .is_ok());
        assert!(guard.is_held_by(EntryId::new(2)));
    }
}
