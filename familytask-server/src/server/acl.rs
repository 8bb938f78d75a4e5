use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use familytask_shared::auth::Role;
use percent_encoding::percent_decode_str;

/// Role-based allow-list over `/api/...` paths. Family scoping and ownership of
/// individual rows are checked by the handlers.
pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };

    let segs = segmented(&path);
    let Some(rest) = segs.strip_prefix(&["api"]) else {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    };

    let decision = match auth.role() {
        Role::Parent => allow_parent(&method, rest),
        Role::Child => allow_child(&method, rest, auth),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            user_id = %auth.user_id(),
            role = ?auth.role(),
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_common(method: &Method, rest: &[&str]) -> bool {
    match rest {
        ["auth", "logout"] => *method == Method::POST,
        ["profile"] => *method == Method::GET || *method == Method::PUT,
        ["family", "members"] => *method == Method::GET,
        ["family", "link-child"] => *method == Method::POST,
        ["tasks"] => *method == Method::GET || *method == Method::PUT,
        ["rewards"] => *method == Method::GET,
        ["redemptions"] => *method == Method::GET,
        ["notifications"] | ["notifications", "count"] => *method == Method::GET,
        ["notifications", "read-all"] | ["notifications", _, "read"] => *method == Method::POST,
        ["check-premium"] => *method == Method::GET,
        _ => false,
    }
}

fn allow_parent(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    if allow_common(method, rest) {
        return Ok(());
    }
    match rest {
        ["family", "create"] if *method == Method::POST => Ok(()),
        ["family", "link-parent"] if *method == Method::POST => Ok(()),
        ["tasks"] if *method == Method::POST => Ok(()),
        ["rewards"] if *method == Method::POST => Ok(()),
        ["children", _, "points"] if *method == Method::GET => Ok(()),
        ["checkout"] if *method == Method::POST => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], auth: &AuthCtx) -> Result<(), AppError> {
    if allow_common(method, rest) {
        return Ok(());
    }
    match rest {
        ["rewards", _, "redeem"] if *method == Method::POST => Ok(()),
        ["children", child, "points"] if *method == Method::GET => ensure_self(auth, child),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_self(auth: &AuthCtx, seg: &str) -> Result<(), AppError> {
    if auth.user_id() == decode(seg) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_manage_family_children_do_not() {
        let create = ["family", "create"];
        assert!(allow_parent(&Method::POST, &create).is_ok());
        assert!(!allow_common(&Method::POST, &create));
        assert!(allow_parent(&Method::POST, &["tasks"]).is_ok());
        assert!(!allow_common(&Method::POST, &["tasks"]));
        assert!(allow_parent(&Method::POST, &["checkout"]).is_ok());
    }

    #[test]
    fn common_rules_cover_reads_and_completion() {
        assert!(allow_common(&Method::GET, &["tasks"]));
        assert!(allow_common(&Method::PUT, &["tasks"]));
        assert!(allow_common(&Method::POST, &["notifications", "n1", "read"]));
        assert!(allow_common(&Method::POST, &["notifications", "read-all"]));
        assert!(!allow_common(&Method::DELETE, &["tasks"]));
        assert!(!allow_common(&Method::GET, &["rewards", "r1", "redeem"]));
    }

    #[test]
    fn parents_cannot_redeem() {
        assert!(allow_parent(&Method::POST, &["rewards", "r1", "redeem"]).is_err());
    }
}
