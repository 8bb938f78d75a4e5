use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::models::Task;
use super::{StorageError, Store};
use super::repo::{NewTaskInput, TaskPatch, TaskRepo, TaskTransition};

/// Process-local task list. Contents vanish on restart and are not shared
/// between server instances; meant for demos and tests. Point awards still
/// go to the database when a ledger store is attached.
#[derive(Clone, Default)]
pub struct MemoryTaskRepo {
    tasks: Arc<Mutex<Vec<Task>>>,
    ledger: Option<Store>,
}

impl MemoryTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Store) -> Self {
        Self {
            tasks: Default::default(),
            ledger: Some(ledger),
        }
    }
}

#[async_trait]
impl TaskRepo for MemoryTaskRepo {
    async fn list_tasks(
        &self,
        family_id: &str,
        assigned_to: Option<&str>,
    ) -> Result<Vec<Task>, StorageError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .iter()
            .filter(|t| t.family_id == family_id)
            .filter(|t| assigned_to.is_none() || t.assigned_to.as_deref() == assigned_to)
            .cloned()
            .collect())
    }

    async fn get_task(
        &self,
        family_id: &str,
        task_id: &str,
    ) -> Result<Option<Task>, StorageError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .iter()
            .find(|t| t.id == task_id && t.family_id == family_id)
            .cloned())
    }

    async fn create_task(&self, input: NewTaskInput) -> Result<Task, StorageError> {
        let task = input.into_task(super::new_id(), Utc::now().naive_utc());
        self.tasks.lock().await.push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        family_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<TaskTransition>, StorageError> {
        let mut tasks = self.tasks.lock().await;
        let Some(slot) = tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.family_id == family_id)
        else {
            return Ok(None);
        };
        let after = patch.apply(slot, Utc::now().naive_utc())?;
        // Award first: a failed write keeps the task unapproved
        if !slot.approved && after.approved {
            if let Some(ledger) = &self.ledger {
                ledger.award_points(&after).await?;
            }
        }
        let before = std::mem::replace(slot, after.clone());
        Ok(Some(TaskTransition { before, after }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_store;
    use diesel::prelude::*;

    fn input(family: &str, title: &str, assignee: Option<&str>) -> NewTaskInput {
        NewTaskInput {
            family_id: family.into(),
            title: title.into(),
            description: None,
            points: 3,
            assigned_to: assignee.map(Into::into),
            created_by: "parent".into(),
            due_date: None,
        }
    }

    #[tokio::test]
    async fn lists_are_scoped_to_family_and_assignee() {
        let repo = MemoryTaskRepo::new();
        repo.create_task(input("F1", "Dishes", Some("kid-a")))
            .await
            .unwrap();
        repo.create_task(input("F1", "Laundry", Some("kid-b")))
            .await
            .unwrap();
        repo.create_task(input("F2", "Garden", None)).await.unwrap();

        assert_eq!(repo.list_tasks("F1", None).await.unwrap().len(), 2);
        let only_a = repo.list_tasks("F1", Some("kid-a")).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].title, "Dishes");
    }

    #[tokio::test]
    async fn update_of_unknown_or_foreign_task_is_none() {
        let repo = MemoryTaskRepo::new();
        let t = repo.create_task(input("F1", "Dishes", None)).await.unwrap();
        let patch = TaskPatch {
            completed: Some(true),
            ..Default::default()
        };
        assert!(
            repo.update_task("F1", "missing", patch.clone())
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repo.update_task("F2", &t.id, patch.clone())
                .await
                .unwrap()
                .is_none()
        );
        let tr = repo.update_task("F1", &t.id, patch).await.unwrap().unwrap();
        assert!(tr.became_completed());
        assert!(repo.get_task("F1", &t.id).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn rejected_patch_leaves_task_unchanged() {
        let repo = MemoryTaskRepo::new();
        let t = repo.create_task(input("F1", "Dishes", None)).await.unwrap();
        let patch = TaskPatch {
            approved: Some(true),
            ..Default::default()
        };
        assert!(repo.update_task("F1", &t.id, patch).await.is_err());
        let stored = repo.get_task("F1", &t.id).await.unwrap().unwrap();
        assert_eq!(stored, t);
    }

    #[tokio::test]
    async fn approval_credits_ledger_once() {
        let (_dir, store) = temp_store().await;
        let repo = MemoryTaskRepo::with_ledger(store.clone());
        let t = repo
            .create_task(input("F1", "Dishes", Some("kid-a")))
            .await
            .unwrap();
        let approve = TaskPatch {
            completed: Some(true),
            approved: Some(true),
            ..Default::default()
        };
        let tr = repo.update_task("F1", &t.id, approve.clone()).await.unwrap().unwrap();
        assert!(tr.became_approved());
        assert_eq!(store.points_balance("kid-a").await.unwrap(), 3);
        let again = repo.update_task("F1", &t.id, approve).await.unwrap().unwrap();
        assert!(!again.became_approved());
        assert_eq!(store.points_balance("kid-a").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_award_keeps_task_unapproved() {
        let (_dir, store) = temp_store().await;
        let repo = MemoryTaskRepo::with_ledger(store.clone());
        let t = repo
            .create_task(input("F1", "Dishes", Some("kid-a")))
            .await
            .unwrap();
        let id = t.id.clone();
        store
            .with_conn(move |conn| {
                diesel::insert_into(crate::storage::schema::point_awards::table)
                    .values(&crate::storage::models::NewPointAward {
                        child_id: "other",
                        task_id: &id,
                        points: 1,
                        created_at: Utc::now().naive_utc(),
                    })
                    .execute(conn)?;
                Ok(())
            })
            .await
            .unwrap();
        let approve = TaskPatch {
            completed: Some(true),
            approved: Some(true),
            ..Default::default()
        };
        assert!(repo.update_task("F1", &t.id, approve).await.is_err());
        let stored = repo.get_task("F1", &t.id).await.unwrap().unwrap();
        assert!(!stored.approved);
        assert_eq!(store.points_balance("kid-a").await.unwrap(), 0);
    }
}
