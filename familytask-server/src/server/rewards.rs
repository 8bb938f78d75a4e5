use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use familytask_shared::api;
use familytask_shared::auth::Role;
use serde::Deserialize;

use super::auth::AuthCtx;
use super::{AppError, AppState, PageOpts, optional, required, rfc3339};
use crate::storage::models::Reward;
use crate::storage::rewards::NewRewardInput;

fn reward_dto(r: Reward) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        family_id: r.family_id,
        title: r.title,
        description: r.description,
        points_required: r.points_required,
        created_by: r.created_by,
        created_at: rfc3339(r.created_at),
    }
}

pub(super) async fn api_list_rewards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let fid = auth.family_id()?;
    let rows = state
        .store
        .list_rewards(fid)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

pub(super) async fn api_create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::CreateRewardReq>, JsonRejection>,
) -> Result<Json<api::RewardDto>, AppError> {
    // ACL restricts this route to parents
    let Json(body) = body?;
    let fid = auth.family_id()?;
    let title = required("title", body.title)?;
    let points_required = match body.points_required {
        Some(p) if p > 0 => p,
        Some(_) => return Err(AppError::bad_request("points_required must be positive")),
        None => return Err(AppError::bad_request("points_required is required")),
    };
    let reward = state
        .store
        .create_reward(NewRewardInput {
            family_id: fid.to_string(),
            title,
            description: optional(body.description),
            points_required,
            created_by: auth.user_id().to_string(),
        })
        .await?;
    tracing::info!(reward_id=%reward.id, family_id=%fid, "reward created");
    Ok(Json(reward_dto(reward)))
}

pub(super) async fn api_redeem_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(reward_id): Path<String>,
) -> Result<Json<api::RedeemResp>, AppError> {
    // ACL restricts this route to children
    let fid = auth.family_id()?;
    let child = auth.user_id();

    let child_mutex = state.child_mutex(child).await;
    let mut child_guard = child_mutex.lock().await;
    state.reset_balance(&mut child_guard);
    let (redemption, reward, balance) = state
        .store
        .redeem_reward(fid, child, &auth.profile.full_name, &reward_id)
        .await?;
    *child_guard = Some(balance);
    drop(child_guard);

    tracing::info!(
        reward_id=%reward.id,
        child_id=%child,
        points=redemption.points_spent,
        balance,
        "reward redeemed"
    );
    Ok(Json(api::RedeemResp {
        success: true,
        redemption_id: redemption.id,
        points_spent: redemption.points_spent,
        balance,
    }))
}

#[derive(Deserialize)]
pub(super) struct RedemptionFilter {
    child_id: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

pub(super) async fn api_list_redemptions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(filter): Query<RedemptionFilter>,
) -> Result<Json<Vec<api::RedemptionDto>>, AppError> {
    let fid = auth.family_id()?;
    // Children only ever see their own history
    let child = match auth.role() {
        Role::Child => Some(auth.user_id().to_string()),
        Role::Parent => optional(filter.child_id),
    };
    let (page, per_page) = PageOpts {
        page: filter.page,
        per_page: filter.per_page,
    }
    .resolve();
    let rows = state
        .store
        .list_redemptions(fid, child.as_deref(), page, per_page)
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|(r, title)| api::RedemptionDto {
            id: r.id,
            reward_id: r.reward_id,
            reward_title: title,
            child_id: r.child_id,
            points_spent: r.points_spent,
            created_at: rfc3339(r.created_at),
        })
        .collect();
    Ok(Json(items))
}

pub(super) async fn api_child_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(child_id): Path<String>,
) -> Result<Json<api::PointsDto>, AppError> {
    // ACL lets children read only their own balance
    let fid = auth.family_id()?;
    let child = state
        .store
        .get_profile(&child_id)
        .await
        .map_err(AppError::internal)?
        .filter(|p| p.family_id.as_deref() == Some(fid))
        .ok_or_else(|| AppError::not_found("child not found"))?;
    if child.role().map_err(AppError::internal)? != Role::Child {
        return Err(AppError::not_found("child not found"));
    }

    let child_mutex = state.child_mutex(&child_id).await;
    let mut child_guard = child_mutex.lock().await;
    let balance = state.points_balance(&child_id, &mut child_guard).await?;
    Ok(Json(api::PointsDto { child_id, balance }))
}
