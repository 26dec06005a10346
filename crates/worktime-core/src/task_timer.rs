//! Task-level time entries and the book that enforces one running timer per
//! user and per task.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::guard::{ActiveTimerGuard, TimerScope};
use crate::ids::IdSequence;
use crate::{DomainError, DomainResult, EntryId, OwnerId, TaskId};

/// Time logged by one user against one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimeEntry {
    pub id: EntryId,
    pub user_id: OwnerId,
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when the timer stops.
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskTimeEntry {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Seconds logged so far; uses `now` as the end of a running entry.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        if let Some(duration) = self.duration_seconds {
            return duration;
        }
        let end = self.ended_at.unwrap_or(now);
        u64::try_from(end.signed_duration_since(self.started_at).num_seconds()).unwrap_or(0)
    }

    fn scopes(&self) -> [TimerScope; 2] {
        [
            TimerScope::User {
                user_id: self.user_id,
            },
            TimerScope::Task {
                task_id: self.task_id,
            },
        ]
    }
}

/// All task entries plus the guard over their open timers.
#[derive(Debug, Default)]
pub struct TaskTimers {
    entries: BTreeMap<EntryId, TaskTimeEntry>,
    guard: ActiveTimerGuard<TimerScope, EntryId>,
    ids: IdSequence,
}

impl TaskTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a timer for `user_id` on `task_id`.
    ///
    /// Fails with [`DomainError::Conflict`] if the user already runs a timer
    /// on any task, or if any user already times this task.
    pub fn start(
        &mut self,
        user_id: OwnerId,
        task_id: TaskId,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<TaskTimeEntry> {
        let entry = TaskTimeEntry {
            id: EntryId::new(0),
            user_id,
            task_id,
            started_at: now,
            ended_at: None,
            duration_seconds: None,
            description,
        };

        // Check before allocating so a rejected start does not burn an id
        if let Some(blocking) = self.guard.first_blocking(&entry.scopes()) {
            debug!(
                user_id = %user_id,
                task_id = %task_id,
                blocking = %blocking,
                "Task timer start rejected"
            );
            return Err(DomainError::Conflict { blocking });
        }

        let entry = TaskTimeEntry {
            id: EntryId::new(self.ids.next_raw()),
            ..entry
        };
        self.guard
            .try_claim(&entry.scopes(), entry.id)
            .map_err(|blocking| DomainError::Conflict { blocking })?;
        self.entries.insert(entry.id, entry.clone());

        info!(
            entry_id = %entry.id,
            user_id = %user_id,
            task_id = %task_id,
            "Task timer started"
        );
        Ok(entry)
    }

    /// Stops a running timer and fixes its duration.
    pub fn stop(&mut self, entry_id: EntryId, now: DateTime<Utc>) -> DomainResult<TaskTimeEntry> {
        let entry = self
            .entries
            .get_mut(&entry_id)
            .ok_or(DomainError::EntryNotFound(entry_id))?;

        if !entry.is_running() {
            return Err(DomainError::NotRunning { entry_id });
        }

        let end = now.max(entry.started_at);
        entry.ended_at = Some(end);
        entry.duration_seconds = Some(entry.elapsed_seconds(end));
        self.guard.release(entry_id);

        info!(
            entry_id = %entry_id,
            duration_seconds = entry.duration_seconds.unwrap_or(0),
            "Task timer stopped"
        );
        Ok(entry.clone())
    }

    pub fn get(&self, entry_id: EntryId) -> Option<&TaskTimeEntry> {
        self.entries.get(&entry_id)
    }

    /// The running timer of `user_id`, if any.
    pub fn active_for_user(&self, user_id: OwnerId) -> Option<&TaskTimeEntry> {
        self.guard
            .blocking(&TimerScope::User { user_id })
            .and_then(|id| self.entries.get(&id))
    }

    /// Entries of `task_id` in creation order.
    pub fn entries_for_task(&self, task_id: TaskId) -> Vec<TaskTimeEntry> {
        self.entries
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Total seconds logged on `task_id`, counting running entries up to `now`.
    pub fn task_total_seconds(&self, task_id: TaskId, now: DateTime<Utc>) -> u64 {
        self.entries
            .values()
            .filter(|e| e.task_id == task_id)
            .map(|e| e.elapsed_seconds(now))
            .sum()
    }

    /// Number of running timers.
    pub fn running_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_running()).count()
    }
}
