use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use familytask_shared::auth::Role;
use familytask_shared::jwt::{self, JwtClaims};
use tracing::{error, warn};

use super::{AppError, AppState};
use crate::storage::models::Profile;

/// How many days of inactivity before a session is considered expired.
pub const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

/// The authenticated caller, attached to request extensions by [`require_bearer`].
#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
    pub profile: Profile,
}

impl AuthCtx {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    /// The caller's family, or 400 when the profile has not been linked yet.
    pub fn family_id(&self) -> Result<&str, AppError> {
        self.profile
            .family_id
            .as_deref()
            .ok_or_else(|| AppError::bad_request("profile is not linked to a family"))
    }
}

pub(crate) fn bearer_token(req: &Request<axum::body::Body>) -> Option<&str> {
    let header_str = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    header_str.strip_prefix("Bearer ")
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(&req) else {
        return Err(AppError::unauthorized());
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return Err(AppError::unauthorized());
        }
    };

    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state
        .store
        .touch_session_with_cutoff(&claims.jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %claims.jti,
                user_id = %claims.sub,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return Err(AppError::unauthorized());
        }
        Err(e) => {
            error!(jti = %claims.jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }

    let profile = state
        .store
        .get_profile(&claims.sub)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "auth: profile no longer exists");
            AppError::unauthorized()
        })?;
    let stored_role = profile.role().map_err(AppError::internal)?;
    if stored_role != claims.role {
        warn!(
            user_id = %claims.sub,
            token_role = ?claims.role,
            stored_role = ?stored_role,
            "auth: role changed since token was issued"
        );
        return Err(AppError::unauthorized());
    }

    req.extensions_mut().insert(AuthCtx { claims, profile });
    Ok(next.run(req).await)
}

/// Creates a session row and signs a token bound to it.
pub async fn issue_token(state: &AppState, profile: &Profile) -> Result<String, AppError> {
    let role = profile.role().map_err(AppError::internal)?;
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: profile.id.clone(),
        jti: jti.clone(),
        exp,
        role,
    };

    state
        .store
        .create_session(&jti, &profile.id)
        .await
        .map_err(|e| {
            error!(user_id = %profile.id, error=%e, "login/register: create_session failed");
            AppError::internal(e)
        })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(user_id = %profile.id, error=%e, "login/register: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}
