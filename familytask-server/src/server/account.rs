use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use familytask_shared::api;

use super::auth::{self, AuthCtx};
use super::{AppError, AppState, RegistrationConfig, optional, required, rfc3339};
use crate::storage::StorageError;
use crate::storage::models::Profile;
use crate::storage::profiles::NewProfileInput;

const MIN_PASSWORD_LEN: usize = 8;

pub(super) fn profile_dto(p: Profile) -> Result<api::ProfileDto, AppError> {
    let role = p.role().map_err(AppError::internal)?;
    Ok(api::ProfileDto {
        id: p.id,
        email: p.email,
        full_name: p.full_name,
        role,
        family_id: p.family_id,
        profile_image: p.profile_image,
    })
}

/// Decides whether one more account may be created given the current count.
pub(super) fn evaluate_registration(
    count: Result<i64, StorageError>,
    cfg: &RegistrationConfig,
) -> api::RegistrationLimitDto {
    let Some(max) = cfg.max_users else {
        return api::RegistrationLimitDto {
            allowed: true,
            current_count: count.ok(),
            max_users: None,
        };
    };
    match count {
        Ok(n) => api::RegistrationLimitDto {
            allowed: n < max,
            current_count: Some(n),
            max_users: Some(max),
        },
        Err(e) => {
            tracing::error!(error=%e, fail_open = cfg.fail_open, "registration limit: count failed");
            api::RegistrationLimitDto {
                allowed: cfg.fail_open,
                current_count: None,
                max_users: Some(max),
            }
        }
    }
}

pub(super) async fn api_check_registration_limit(
    State(state): State<AppState>,
) -> Json<api::RegistrationLimitDto> {
    let count = state.store.count_profiles().await;
    Json(evaluate_registration(count, &state.config.registration))
}

pub(super) async fn api_register(
    State(state): State<AppState>,
    body: Result<Json<api::RegisterReq>, JsonRejection>,
) -> Result<Json<api::AuthResp>, AppError> {
    let Json(body) = body?;
    let email = required("email", body.email)?.to_lowercase();
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("password is required"))?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let full_name = required("full_name", body.full_name)?;
    let role = body
        .role
        .ok_or_else(|| AppError::bad_request("role is required"))?;

    let limit = evaluate_registration(
        state.store.count_profiles().await,
        &state.config.registration,
    );
    if !limit.allowed {
        tracing::warn!(email=%email, count=?limit.current_count, "register: user limit reached");
        return Err(AppError::forbidden());
    }

    // bcrypt is CPU bound
    let password_hash = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(AppError::internal)?
        .map_err(|e| {
            tracing::error!(error=%e, "register: bcrypt hash failed");
            AppError::internal(e)
        })?;

    let profile = state
        .store
        .create_profile(NewProfileInput {
            email,
            password_hash,
            full_name,
            role,
        })
        .await?;
    tracing::info!(user_id=%profile.id, role=%role, "register: profile created");
    let token = auth::issue_token(&state, &profile).await?;
    Ok(Json(api::AuthResp {
        token,
        user_id: profile.id,
        role,
    }))
}

pub(super) async fn api_login(
    State(state): State<AppState>,
    body: Result<Json<api::LoginReq>, JsonRejection>,
) -> Result<Json<api::AuthResp>, AppError> {
    let Json(body) = body?;
    let email = required("email", body.email)?.to_lowercase();
    let password = body
        .password
        .ok_or_else(|| AppError::bad_request("password is required"))?;

    let profile = state
        .store
        .find_profile_by_email(&email)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            tracing::warn!(email=%email, "login: unknown email");
            AppError::unauthorized()
        })?;
    let stored = profile.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify(password, &stored))
        .await
        .map_err(AppError::internal)?
        .map_err(|e| {
            tracing::error!(email=%email, error=%e, "login: bcrypt verify failed");
            AppError::internal(e)
        })?;
    if !ok {
        tracing::warn!(email=%email, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let role = profile.role().map_err(AppError::internal)?;
    let token = auth::issue_token(&state, &profile).await?;
    Ok(Json(api::AuthResp {
        token,
        user_id: profile.id,
        role,
    }))
}

pub(super) async fn api_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::SuccessResp>, AppError> {
    let removed = state
        .store
        .delete_session(&auth.claims.jti)
        .await
        .map_err(AppError::internal)?;
    if !removed {
        tracing::warn!(jti=%auth.claims.jti, "logout: session already gone");
    }
    Ok(Json(api::SuccessResp { success: true }))
}

pub(super) async fn api_get_profile(
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::ProfileDto>, AppError> {
    Ok(Json(profile_dto(auth.profile)?))
}

pub(super) async fn api_update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::UpdateProfileReq>, JsonRejection>,
) -> Result<Json<api::ProfileDto>, AppError> {
    let Json(body) = body?;
    let full_name = match body.full_name {
        Some(n) => Some(required("full_name", Some(n))?),
        None => None,
    };
    // An empty image clears it
    let profile_image = body.profile_image.map(|img| optional(Some(img)));
    let updated = state
        .store
        .update_profile(auth.user_id(), full_name, profile_image)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;
    Ok(Json(profile_dto(updated)?))
}

pub(super) async fn api_check_premium(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::PremiumDto>, AppError> {
    let Some(fid) = auth.profile.family_id.as_deref() else {
        return Ok(Json(api::PremiumDto {
            is_premium: false,
            family_id: None,
            premium_until: None,
        }));
    };
    let family = state
        .store
        .get_family(fid)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("family not found"))?;
    let now = Utc::now().naive_utc();
    let is_premium = family.premium_until.map(|u| u > now).unwrap_or(false);
    Ok(Json(api::PremiumDto {
        is_premium,
        family_id: Some(family.id),
        premium_until: family.premium_until.map(rfc3339),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use familytask_shared::auth::Role;

    fn cfg(max_users: Option<i64>, fail_open: bool) -> RegistrationConfig {
        RegistrationConfig {
            max_users,
            fail_open,
        }
    }

    #[test]
    fn registration_allowed_below_limit_only() {
        assert!(evaluate_registration(Ok(4), &cfg(Some(5), true)).allowed);
        let full = evaluate_registration(Ok(5), &cfg(Some(5), true));
        assert!(!full.allowed);
        assert_eq!(full.current_count, Some(5));
        assert_eq!(full.max_users, Some(5));
    }

    #[test]
    fn registration_without_limit_is_open() {
        let dto = evaluate_registration(Ok(10_000), &cfg(None, false));
        assert!(dto.allowed);
        assert_eq!(dto.max_users, None);
    }

    #[test]
    fn count_failure_follows_policy() {
        let failed = || Err(StorageError::Migration("db gone".into()));
        assert!(evaluate_registration(failed(), &cfg(Some(5), true)).allowed);
        let closed = evaluate_registration(failed(), &cfg(Some(5), false));
        assert!(!closed.allowed);
        assert_eq!(closed.current_count, None);
    }

    #[test]
    fn role_is_reported_from_profile() {
        let now = Utc::now().naive_utc();
        let p = Profile {
            id: "u1".into(),
            email: "a@b.c".into(),
            password_hash: String::new(),
            full_name: "Ann".into(),
            role: "child".into(),
            family_id: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(profile_dto(p).unwrap().role, Role::Child);
    }
}
