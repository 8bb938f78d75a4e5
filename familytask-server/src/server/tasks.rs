use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use chrono::NaiveDate;
use familytask_shared::api;
use familytask_shared::auth::Role;
use familytask_shared::domain::NotificationKind;
use serde::Deserialize;

use super::auth::AuthCtx;
use super::{AppError, AppState, optional, required, rfc3339};
use crate::storage::models::Task;
use crate::storage::notifications::NewNotificationInput;
use crate::storage::repo::NewTaskInput;
use crate::storage::{TaskPatch, TaskTransition};

const DATE_FMT: &str = "%Y-%m-%d";

pub(super) fn task_dto(t: Task) -> api::TaskDto {
    api::TaskDto {
        id: t.id,
        family_id: t.family_id,
        title: t.title,
        description: t.description,
        points: t.points,
        assigned_to: t.assigned_to,
        created_by: t.created_by,
        completed: t.completed,
        approved: t.approved,
        due_date: t.due_date.map(|d| d.format(DATE_FMT).to_string()),
        created_at: rfc3339(t.created_at),
        updated_at: rfc3339(t.updated_at),
    }
}

fn parse_due_date(raw: Option<String>) -> Result<Option<NaiveDate>, AppError> {
    match optional(raw) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FMT)
            .map(Some)
            .map_err(|_| AppError::bad_request("due_date must be YYYY-MM-DD")),
    }
}

fn positive_points(points: i32) -> Result<i32, AppError> {
    if points <= 0 {
        return Err(AppError::bad_request("points must be positive"));
    }
    Ok(points)
}

/// The assignee must be a child of the family.
async fn check_assignee(state: &AppState, family_id: &str, child: &str) -> Result<(), AppError> {
    let profile = state
        .store
        .get_profile(child)
        .await
        .map_err(AppError::internal)?;
    let ok = match &profile {
        Some(p) => {
            p.family_id.as_deref() == Some(family_id)
                && p.role().map_err(AppError::internal)? == Role::Child
        }
        None => false,
    };
    if !ok {
        return Err(AppError::bad_request(format!(
            "assigned_to is not a child of this family: {child}"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
pub(super) struct TaskFilter {
    assigned_to: Option<String>,
}

pub(super) async fn api_list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    let fid = auth.family_id()?;
    let assignee = optional(filter.assigned_to);
    let rows = state
        .tasks
        .list_tasks(fid, assignee.as_deref())
        .await
        .map_err(AppError::internal)?;
    Ok(Json(rows.into_iter().map(task_dto).collect()))
}

pub(super) async fn api_create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::CreateTaskReq>, JsonRejection>,
) -> Result<Json<api::TaskDto>, AppError> {
    // ACL restricts this route to parents
    let Json(body) = body?;
    let fid = auth.family_id()?;
    let title = required("title", body.title)?;
    let points = body
        .points
        .ok_or_else(|| AppError::bad_request("points is required"))
        .and_then(positive_points)?;
    let due_date = parse_due_date(body.due_date)?;
    let assigned_to = optional(body.assigned_to);
    if let Some(child) = assigned_to.as_deref() {
        check_assignee(&state, fid, child).await?;
    }

    let task = state
        .tasks
        .create_task(NewTaskInput {
            family_id: fid.to_string(),
            title,
            description: optional(body.description),
            points,
            assigned_to,
            created_by: auth.user_id().to_string(),
            due_date,
        })
        .await?;
    tracing::info!(task_id=%task.id, family_id=%fid, "task created");
    Ok(Json(task_dto(task)))
}

pub(super) async fn api_update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::UpdateTaskReq>, JsonRejection>,
) -> Result<Json<api::TaskDto>, AppError> {
    let Json(body) = body?;
    let fid = auth.family_id()?;
    let task_id = required("id", body.id)?;

    let patch = TaskPatch {
        title: match body.title {
            Some(t) => Some(required("title", Some(t))?),
            None => None,
        },
        description: body.description,
        points: body.points.map(positive_points).transpose()?,
        assigned_to: optional(body.assigned_to),
        due_date: parse_due_date(body.due_date)?,
        completed: body.completed,
        approved: body.approved,
    };
    if patch.is_empty() {
        return Err(AppError::bad_request("nothing to update"));
    }

    if auth.role() == Role::Child {
        if patch.touches_more_than_completion() {
            return Err(AppError::forbidden());
        }
        let current = state
            .tasks
            .get_task(fid, &task_id)
            .await
            .map_err(AppError::internal)?
            .ok_or_else(|| AppError::not_found("task not found"))?;
        if current.assigned_to.as_deref() != Some(auth.user_id()) {
            tracing::warn!(task_id=%task_id, user_id=%auth.user_id(), "task update: not the assignee");
            return Err(AppError::forbidden());
        }
    } else if let Some(child) = patch.assigned_to.as_deref() {
        check_assignee(&state, fid, child).await?;
    }

    let transition = state
        .tasks
        .update_task(fid, &task_id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    if transition.became_completed() {
        on_completed(&state, &auth, &transition).await;
    }
    if transition.became_approved() {
        on_approved(&state, &transition).await;
    }
    Ok(Json(task_dto(transition.after)))
}

async fn on_completed(state: &AppState, auth: &AuthCtx, tr: &TaskTransition) {
    let task = &tr.after;
    let message = format!(
        "{} completed \"{}\" ({} points)",
        auth.profile.full_name, task.title, task.points
    );
    if let Err(e) = state
        .store
        .notify_parents(
            &task.family_id,
            Some(auth.user_id()),
            NotificationKind::TaskCompleted,
            "Task completed",
            &message,
        )
        .await
    {
        tracing::error!(task_id=%task.id, error=%e, "task completed: notify parents failed");
    }
}

/// The award was written with the approval; drop the cached balance and tell the assignee.
async fn on_approved(state: &AppState, tr: &TaskTransition) {
    let task = &tr.after;
    let Some(child) = task.assigned_to.as_deref() else {
        tracing::warn!(task_id=%task.id, "task approved without assignee; no points credited");
        return;
    };

    let child_mutex = state.child_mutex(child).await;
    let mut child_guard = child_mutex.lock().await;
    state.reset_balance(&mut child_guard);
    let balance = state.points_balance(child, &mut child_guard).await.ok();
    tracing::info!(task_id=%task.id, child_id=%child, points=task.points, balance=?balance, "points credited");
    drop(child_guard);

    let notice = NewNotificationInput {
        user_id: child.to_string(),
        family_id: Some(task.family_id.clone()),
        kind: NotificationKind::TaskApproved,
        title: "Task approved".into(),
        message: format!(
            "\"{}\" was approved. You earned {} points.",
            task.title, task.points
        ),
    };
    if let Err(e) = state.store.insert_notification(notice).await {
        tracing::error!(task_id=%task.id, error=%e, "task approved: notify assignee failed");
    }
}
