use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use familytask_shared::api;
use familytask_shared::auth::Role;
use familytask_shared::domain::{FamilyCode, MAX_PARENTS_PER_FAMILY, NotificationKind};

use super::auth::AuthCtx;
use super::{AppError, AppState, optional};

pub(super) async fn api_validate_family(
    State(state): State<AppState>,
    body: Result<Json<api::ValidateFamilyReq>, JsonRejection>,
) -> Result<Json<api::ValidateFamilyResp>, AppError> {
    let Json(body) = body?;
    let invalid = api::ValidateFamilyResp {
        valid: false,
        parent_count: 0,
        parent_slots_left: 0,
    };
    let Some(code) = body.family_code.as_deref().and_then(FamilyCode::parse) else {
        return Ok(Json(invalid));
    };
    let family = state
        .store
        .get_family(code.as_str())
        .await
        .map_err(AppError::internal)?;
    if family.is_none() {
        return Ok(Json(invalid));
    }
    let parents = state
        .store
        .count_parents(code.as_str())
        .await
        .map_err(AppError::internal)?;
    Ok(Json(api::ValidateFamilyResp {
        valid: true,
        parent_count: parents,
        parent_slots_left: (MAX_PARENTS_PER_FAMILY - parents).max(0),
    }))
}

pub(super) async fn api_create_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::CreateFamilyReq>, JsonRejection>,
) -> Result<Json<api::CreateFamilyResp>, AppError> {
    // ACL restricts this route to parents
    let Json(body) = body?;
    let requested = optional(body.family_id);
    let family = state
        .store
        .create_family(auth.user_id(), requested.as_deref())
        .await?;
    tracing::info!(family_id=%family.id, owner=%auth.user_id(), "family created");
    Ok(Json(api::CreateFamilyResp {
        success: true,
        family_id: family.id,
    }))
}

pub(super) async fn api_link_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::LinkFamilyReq>, JsonRejection>,
) -> Result<Json<api::LinkFamilyResp>, AppError> {
    link(state, auth, body, Role::Child).await
}

pub(super) async fn api_link_parent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::LinkFamilyReq>, JsonRejection>,
) -> Result<Json<api::LinkFamilyResp>, AppError> {
    link(state, auth, body, Role::Parent).await
}

/// Joins `user_id` (the caller when omitted) to a family as `role`.
///
/// Anyone may link themself. A parent may also link a child into the
/// parent's own family.
async fn link(
    state: AppState,
    auth: AuthCtx,
    body: Result<Json<api::LinkFamilyReq>, JsonRejection>,
    role: Role,
) -> Result<Json<api::LinkFamilyResp>, AppError> {
    let Json(body) = body?;
    let user_id = optional(body.user_id).unwrap_or_else(|| auth.user_id().to_string());
    let code = body
        .family_code
        .as_deref()
        .and_then(FamilyCode::parse)
        .ok_or_else(|| AppError::bad_request("family_code is required"))?;

    if user_id != auth.user_id() {
        let own_family = auth.profile.family_id.as_deref() == Some(code.as_str());
        if !(role == Role::Child && auth.role() == Role::Parent && own_family) {
            tracing::warn!(
                caller=%auth.user_id(),
                target=%user_id,
                family_id=%code,
                "link: caller may not link this profile"
            );
            return Err(AppError::forbidden());
        }
    }

    let profile = state
        .store
        .link_to_family(&user_id, code.as_str(), role)
        .await?;
    tracing::info!(user_id=%profile.id, family_id=%code, role=%role, "profile linked to family");

    let message = format!("{} joined the family", profile.full_name);
    if let Err(e) = state
        .store
        .notify_parents(
            code.as_str(),
            Some(&profile.id),
            NotificationKind::FamilyJoined,
            "New family member",
            &message,
        )
        .await
    {
        tracing::error!(family_id=%code, error=%e, "link: notify parents failed");
    }

    Ok(Json(api::LinkFamilyResp {
        success: true,
        user_id: profile.id,
        family_id: code.into_inner(),
    }))
}

pub(super) async fn api_family_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::FamilyMemberDto>>, AppError> {
    let fid = auth.family_id()?;
    let rows = state
        .store
        .list_family_members(fid)
        .await
        .map_err(AppError::internal)?;
    let mut items = Vec::with_capacity(rows.len());
    for p in rows {
        let role = p.role().map_err(AppError::internal)?;
        items.push(api::FamilyMemberDto {
            id: p.id,
            full_name: p.full_name,
            role,
            profile_image: p.profile_image,
        });
    }
    Ok(Json(items))
}
