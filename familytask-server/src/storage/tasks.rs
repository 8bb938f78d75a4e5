use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use super::models::{NewPointAward, Task};
use super::repo::{NewTaskInput, TaskPatch, TaskRepo, TaskTransition};
use super::{Store, StorageError, new_id, schema};

#[async_trait]
impl TaskRepo for Store {
    async fn list_tasks(
        &self,
        family_id: &str,
        assigned_to: Option<&str>,
    ) -> Result<Vec<Task>, StorageError> {
        use schema::tasks::dsl as t;
        let family = family_id.to_string();
        let assignee = assigned_to.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let mut query = t::tasks.filter(t::family_id.eq(&family)).into_boxed();
            if let Some(a) = &assignee {
                query = query.filter(t::assigned_to.eq(a));
            }
            Ok(query.order(t::created_at.asc()).load::<Task>(conn)?)
        })
        .await
    }

    async fn get_task(
        &self,
        family_id: &str,
        task_id: &str,
    ) -> Result<Option<Task>, StorageError> {
        use schema::tasks::dsl as t;
        let family = family_id.to_string();
        let id = task_id.to_string();
        self.with_conn(move |conn| {
            Ok(t::tasks
                .filter(t::id.eq(&id))
                .filter(t::family_id.eq(&family))
                .first::<Task>(conn)
                .optional()?)
        })
        .await
    }

    async fn create_task(&self, input: NewTaskInput) -> Result<Task, StorageError> {
        let task = input.into_task(new_id(), Utc::now().naive_utc());
        self.with_conn(move |conn| {
            diesel::insert_into(schema::tasks::table)
                .values(&task)
                .execute(conn)?;
            Ok(task)
        })
        .await
    }

    async fn update_task(
        &self,
        family_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<TaskTransition>, StorageError> {
        use schema::tasks::dsl as t;
        let family = family_id.to_string();
        let id = task_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<TaskTransition>, StorageError> {
                let Some(before) = t::tasks
                    .filter(t::id.eq(&id))
                    .filter(t::family_id.eq(&family))
                    .first::<Task>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };
                let after = patch.apply(&before, Utc::now().naive_utc())?;
                diesel::update(t::tasks.filter(t::id.eq(&id)))
                    .set((
                        t::title.eq(&after.title),
                        t::description.eq(after.description.as_deref()),
                        t::points.eq(after.points),
                        t::assigned_to.eq(after.assigned_to.as_deref()),
                        t::due_date.eq(after.due_date),
                        t::completed.eq(after.completed),
                        t::approved.eq(after.approved),
                        t::updated_at.eq(after.updated_at),
                    ))
                    .execute(conn)?;
                let transition = TaskTransition { before, after };
                if transition.became_approved() {
                    credit_approval(conn, &transition.after)?;
                }
                Ok(Some(transition))
            })
        })
        .await
    }
}

/// Writes the award for a freshly approved task. Unassigned tasks earn nothing.
fn credit_approval(conn: &mut SqliteConnection, task: &Task) -> Result<(), StorageError> {
    let Some(child) = task.assigned_to.as_deref() else {
        return Ok(());
    };
    let rec = NewPointAward {
        child_id: child,
        task_id: &task.id,
        points: task.points,
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(schema::point_awards::table)
        .values(&rec)
        .execute(conn)?;
    Ok(())
}

impl Store {
    /// Credits an approved task kept outside the database.
    pub(crate) async fn award_points(&self, task: &Task) -> Result<(), StorageError> {
        let task = task.clone();
        self.with_conn(move |conn| credit_approval(conn, &task)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_store;

    fn chore(assignee: Option<&str>) -> NewTaskInput {
        NewTaskInput {
            family_id: "F1".into(),
            title: "Dishes".into(),
            description: None,
            points: 5,
            assigned_to: assignee.map(Into::into),
            created_by: "mom".into(),
            due_date: None,
        }
    }

    fn approve() -> TaskPatch {
        TaskPatch {
            completed: Some(true),
            approved: Some(true),
            ..Default::default()
        }
    }

    async fn block_award(store: &Store, task_id: &str) {
        let id = task_id.to_string();
        store
            .with_conn(move |conn| {
                diesel::insert_into(schema::point_awards::table)
                    .values(&NewPointAward {
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
    }

    #[tokio::test]
    async fn approval_and_award_commit_together() {
        let (_dir, store) = temp_store().await;
        let t = store.create_task(chore(Some("kid"))).await.unwrap();
        let tr = store.update_task("F1", &t.id, approve()).await.unwrap().unwrap();
        assert!(tr.became_approved());
        assert_eq!(store.points_balance("kid").await.unwrap(), 5);

        let again = store.update_task("F1", &t.id, approve()).await.unwrap().unwrap();
        assert!(!again.became_approved());
        assert_eq!(store.points_balance("kid").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn failed_award_rolls_back_approval() {
        let (_dir, store) = temp_store().await;
        let t = store.create_task(chore(Some("kid"))).await.unwrap();
        block_award(&store, &t.id).await;

        assert!(store.update_task("F1", &t.id, approve()).await.is_err());
        let stored = store.get_task("F1", &t.id).await.unwrap().unwrap();
        assert!(!stored.approved);
        assert!(!stored.completed);
        assert_eq!(store.points_balance("kid").await.unwrap(), 0);

        let id = t.id.clone();
        store
            .with_conn(move |conn| {
                use schema::point_awards::dsl as pa;
                diesel::delete(pa::point_awards.filter(pa::task_id.eq(&id))).execute(conn)?;
                Ok(())
            })
            .await
            .unwrap();
        let tr = store.update_task("F1", &t.id, approve()).await.unwrap().unwrap();
        assert!(tr.became_approved());
        assert_eq!(store.points_balance("kid").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unassigned_approval_earns_nothing() {
        let (_dir, store) = temp_store().await;
        let t = store.create_task(chore(None)).await.unwrap();
        let tr = store.update_task("F1", &t.id, approve()).await.unwrap().unwrap();
        assert!(tr.became_approved());
        let id = t.id.clone();
        let rows: i64 = store
            .with_conn(move |conn| {
                use schema::point_awards::dsl as pa;
                Ok(pa::point_awards
                    .filter(pa::task_id.eq(&id))
                    .count()
                    .get_result(conn)?)
            })
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
