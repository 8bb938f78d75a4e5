use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::HeaderMap;
use familytask_shared::api;
use familytask_shared::domain::NotificationKind;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::auth::AuthCtx;
use super::{AppError, AppState, PageOpts, optional, required, rfc3339};
use crate::storage::models::Notification;
use crate::storage::notifications::NewNotificationInput;

const SERVICE_KEY_HEADER: &str = "x-service-role-key";

fn notification_dto(n: Notification) -> api::NotificationDto {
    // Unknown kinds written by hand surface as `system`
    let kind = n.kind.parse::<NotificationKind>().unwrap_or(NotificationKind::System);
    api::NotificationDto {
        id: n.id,
        user_id: n.user_id,
        family_id: n.family_id,
        title: n.title,
        message: n.message,
        kind,
        read: n.is_read,
        created_at: rfc3339(n.created_at),
    }
}

#[derive(Deserialize)]
pub(super) struct ListOpts {
    #[serde(default)]
    unread_only: bool,
    page: Option<usize>,
    per_page: Option<usize>,
}

pub(super) async fn api_list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(opts): Query<ListOpts>,
) -> Result<Json<Vec<api::NotificationDto>>, AppError> {
    let (page, per_page) = PageOpts {
        page: opts.page,
        per_page: opts.per_page,
    }
    .resolve();
    let rows = state
        .store
        .list_notifications(auth.user_id(), opts.unread_only, page, per_page)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(rows.into_iter().map(notification_dto).collect()))
}

pub(super) async fn api_notification_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::NotificationCountDto>, AppError> {
    let count = state
        .store
        .unread_count(auth.user_id())
        .await
        .map_err(AppError::internal)?;
    Ok(Json(api::NotificationCountDto { count }))
}

pub(super) async fn api_mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::MarkReadResp>, AppError> {
    let found = state
        .store
        .mark_read(auth.user_id(), &id)
        .await
        .map_err(AppError::internal)?;
    if !found {
        return Err(AppError::not_found("notification not found"));
    }
    Ok(Json(api::MarkReadResp {
        success: true,
        updated: 1,
    }))
}

pub(super) async fn api_mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::MarkReadResp>, AppError> {
    let updated = state
        .store
        .mark_all_read(auth.user_id())
        .await
        .map_err(AppError::internal)?;
    tracing::debug!(user_id=%auth.user_id(), updated, "notifications marked read");
    Ok(Json(api::MarkReadResp {
        success: true,
        updated,
    }))
}

/// Direct insert for trusted backends holding the service-role key.
pub(super) async fn api_admin_insert_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<api::AdminNotificationReq>, JsonRejection>,
) -> Result<Json<api::NotificationDto>, AppError> {
    let Some(expected) = state
        .config
        .service_role_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
    else {
        tracing::warn!("admin notifications: no service role key configured");
        return Err(AppError::forbidden());
    };
    let provided = headers
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
    if !matches {
        tracing::warn!("admin notifications: bad service role key");
        return Err(AppError::unauthorized());
    }

    let Json(body) = body?;
    let user_id = required("user_id", body.user_id)?;
    let title = required("title", body.title)?;
    let message = required("message", body.message)?;
    let profile = state
        .store
        .get_profile(&user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("profile not found"))?;

    let row = state
        .store
        .insert_notification(NewNotificationInput {
            user_id,
            family_id: optional(body.family_id).or(profile.family_id),
            kind: body.kind.unwrap_or(NotificationKind::System),
            title,
            message,
        })
        .await?;
    Ok(Json(notification_dto(row)))
}
