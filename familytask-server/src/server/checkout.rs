//! Hosted checkout sessions for the premium subscription.
//!
//! The provider speaks the Stripe-style form API: `POST {api_base}/v1/checkout/sessions`
//! with a bearer secret key, answering `{ "id", "url" }`.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use familytask_shared::api;
use serde::Deserialize;
use url::Url;

use super::auth::AuthCtx;
use super::{AppError, AppState, CheckoutConfig, optional};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

#[derive(Debug, Deserialize)]
struct SessionResp {
    id: String,
    url: String,
}

/// One checkout request, before encoding.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub family_id: &'a str,
    pub customer_email: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Clone)]
pub struct CheckoutClient {
    http: reqwest::Client,
    cfg: CheckoutConfig,
}

impl CheckoutClient {
    pub fn new(cfg: CheckoutConfig) -> Result<Self, CheckoutError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("familytask-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| CheckoutError::Http(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    fn form_pairs<'a>(&'a self, req: &CheckoutRequest<'a>) -> [(&'static str, &'a str); 7] {
        [
            ("mode", "subscription"),
            ("line_items[0][price]", self.cfg.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", req.success_url),
            ("cancel_url", req.cancel_url),
            ("client_reference_id", req.family_id),
            ("customer_email", req.customer_email),
        ]
    }

    pub async fn create_session(
        &self,
        req: &CheckoutRequest<'_>,
    ) -> Result<api::CheckoutResp, CheckoutError> {
        let url = format!(
            "{}/v1/checkout/sessions",
            self.cfg.api_base.trim_end_matches('/')
        );
        let res = self
            .http
            .post(url)
            .bearer_auth(self.cfg.secret_key.as_deref().unwrap_or_default())
            .form(&self.form_pairs(req))
            .send()
            .await
            .map_err(|e| CheckoutError::Http(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CheckoutError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let session = res
            .json::<SessionResp>()
            .await
            .map_err(|e| CheckoutError::Serde(e.to_string()))?;
        Ok(api::CheckoutResp {
            session_id: session.id,
            url: session.url,
        })
    }
}

/// Redirect targets must stay on the origin of the configured one.
fn redirect_url(requested: Option<String>, configured: &str, field: &str) -> Result<String, AppError> {
    let Some(requested) = optional(requested) else {
        return Ok(configured.to_string());
    };
    let allowed = match (Url::parse(&requested), Url::parse(configured)) {
        (Ok(req), Ok(cfg)) => req.origin() == cfg.origin() && req.origin().is_tuple(),
        _ => false,
    };
    if !allowed {
        return Err(AppError::BadRequest(format!(
            "{field} must be on the application origin"
        )));
    }
    Ok(requested)
}

pub(super) async fn api_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    body: Result<Json<api::CheckoutReq>, JsonRejection>,
) -> Result<Json<api::CheckoutResp>, AppError> {
    // ACL restricts this route to parents
    let Json(body) = body?;
    let Some(client) = state.checkout.as_ref() else {
        return Err(AppError::Unavailable("payments are not configured".into()));
    };
    let fid = auth.family_id()?;
    let success_url = redirect_url(body.success_url, &client.cfg.success_url, "success_url")?;
    let cancel_url = redirect_url(body.cancel_url, &client.cfg.cancel_url, "cancel_url")?;
    let req = CheckoutRequest {
        family_id: fid,
        customer_email: &auth.profile.email,
        success_url: &success_url,
        cancel_url: &cancel_url,
    };
    let session = client.create_session(&req).await.map_err(|e| {
        tracing::error!(family_id=%fid, error=%e, "checkout: provider request failed");
        AppError::Unavailable("payment provider unavailable".into())
    })?;
    tracing::info!(family_id=%fid, session_id=%session.session_id, "checkout session created");
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_pairs_carry_price_and_family() {
        let client = CheckoutClient::new(CheckoutConfig {
            api_base: "http://127.0.0.1:1".into(),
            secret_key: Some("sk_test".into()),
            price_id: "price_123".into(),
            success_url: "https://app/ok".into(),
            cancel_url: "https://app/cancel".into(),
        })
        .unwrap();
        let req = CheckoutRequest {
            family_id: "F1",
            customer_email: "mom@example.com",
            success_url: "https://app/ok?x=1",
            cancel_url: "https://app/cancel",
        };
        let pairs = client.form_pairs(&req);
        assert_eq!(pairs[0], ("mode", "subscription"));
        assert!(pairs.contains(&("line_items[0][price]", "price_123")));
        assert!(pairs.contains(&("success_url", "https://app/ok?x=1")));
        assert!(pairs.contains(&("client_reference_id", "F1")));
    }

    #[test]
    fn redirect_url_stays_on_configured_origin() {
        let cfg = "https://app.example.com/billing/ok";
        assert_eq!(redirect_url(None, cfg, "success_url").unwrap(), cfg);
        assert_eq!(redirect_url(Some("  ".into()), cfg, "success_url").unwrap(), cfg);
        assert_eq!(
            redirect_url(Some("https://app.example.com/other?x=1".into()), cfg, "success_url").unwrap(),
            "https://app.example.com/other?x=1"
        );
        for bad in [
            "https://evil.example.net/ok",
            "http://app.example.com/ok",
            "https://app.example.com:8443/ok",
            "https://app.example.com.evil.net/ok",
            "javascript:alert(1)",
            "not a url",
        ] {
            assert!(
                matches!(redirect_url(Some(bad.into()), cfg, "success_url"), Err(AppError::BadRequest(_))),
                "{bad} accepted"
            );
        }
    }
}
