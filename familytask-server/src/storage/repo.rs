//! Task persistence seam.
//!
//! Handlers only ever see `dyn TaskRepo`; the application state decides
//! whether tasks live in SQLite or in a process-local list.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use super::StorageError;
use super::models::Task;

#[derive(Debug, Clone)]
pub struct NewTaskInput {
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub due_date: Option<NaiveDate>,
}

impl NewTaskInput {
    pub fn into_task(self, id: String, now: NaiveDateTime) -> Task {
        Task {
            id,
            family_id: self.family_id,
            title: self.title,
            description: self.description,
            points: self.points,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            completed: false,
            approved: false,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a task. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub points: Option<i32>,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub approved: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.points.is_none()
            && self.assigned_to.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.approved.is_none()
    }

    /// True when the patch touches anything besides `completed`.
    pub fn touches_more_than_completion(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.points.is_some()
            || self.assigned_to.is_some()
            || self.due_date.is_some()
            || self.approved.is_some()
    }

    /// Produces the updated row. Approval requires completion and is final,
    /// and pins the assignee that was credited.
    pub fn apply(&self, current: &Task, now: NaiveDateTime) -> Result<Task, StorageError> {
        let mut next = current.clone();
        if let Some(t) = &self.title {
            next.title = t.clone();
        }
        if let Some(d) = &self.description {
            next.description = Some(d.clone());
        }
        if let Some(p) = self.points {
            if p <= 0 {
                return Err(StorageError::InvalidInput("points must be positive".into()));
            }
            next.points = p;
        }
        if let Some(a) = &self.assigned_to {
            if current.approved && current.assigned_to.as_deref() != Some(a.as_str()) {
                return Err(StorageError::InvalidInput(
                    "an approved task cannot be reassigned".into(),
                ));
            }
            next.assigned_to = Some(a.clone());
        }
        if let Some(d) = self.due_date {
            next.due_date = Some(d);
        }
        if let Some(c) = self.completed {
            next.completed = c;
        }
        if let Some(a) = self.approved {
            next.approved = a;
        }
        if current.approved && !next.approved {
            return Err(StorageError::InvalidInput(
                "an approved task cannot be reopened".into(),
            ));
        }
        if next.approved && !next.completed {
            return Err(StorageError::InvalidInput(
                "a task must be completed before it can be approved".into(),
            ));
        }
        next.updated_at = now;
        Ok(next)
    }
}

/// Row state before and after an update.
#[derive(Debug, Clone)]
pub struct TaskTransition {
    pub before: Task,
    pub after: Task,
}

impl TaskTransition {
    pub fn became_completed(&self) -> bool {
        !self.before.completed && self.after.completed
    }

    pub fn became_approved(&self) -> bool {
        !self.before.approved && self.after.approved
    }
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Tasks of one family, oldest first, optionally restricted to an assignee.
    async fn list_tasks(
        &self,
        family_id: &str,
        assigned_to: Option<&str>,
    ) -> Result<Vec<Task>, StorageError>;

    async fn get_task(&self, family_id: &str, task_id: &str)
    -> Result<Option<Task>, StorageError>;

    async fn create_task(&self, input: NewTaskInput) -> Result<Task, StorageError>;

    /// Applies `patch` atomically. `Ok(None)` when the task is not in `family_id`.
    async fn update_task(
        &self,
        family_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<TaskTransition>, StorageError>;
}
