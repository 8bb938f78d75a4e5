mod common;

use axum::http::{HeaderMap, StatusCode};
use axum::{Json, Router, routing::post};
use chrono::{Duration, Utc};
use common::{SERVICE_KEY, TestServer};
use familytask_server::server;
use familytask_shared::api::endpoints as ep;
use serde_json::{Value, json};

#[tokio::test]
async fn health_reports_configuration() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let body = server
        .request_expect("GET", &ep::health(&server.base), None, None, StatusCode::OK)
        .await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"], true);
    assert_eq!(body["checks"]["jwt_secret"], true);
    assert_eq!(body["checks"]["service_role_key"], true);
    assert_eq!(body["checks"]["payments"], false);

    let resp = server
        .client
        .get(format!("{}/api/nope", server.base))
        .header("x-request-id", "rid-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-request-id"], "rid-1");
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn registration_limit_is_enforced() {
    let mut config = common::test_config();
    config.registration = server::RegistrationConfig {
        max_users: Some(1),
        fail_open: true,
    };
    let Some(server) = TestServer::spawn_with(config).await else {
        return;
    };
    let url = ep::registration_limit(&server.base);
    let body = server
        .request_expect("GET", &url, None, None, StatusCode::OK)
        .await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["current_count"], 0);

    server.register("first@example.com", "First", "parent").await;
    let body = server
        .request_expect("GET", &url, None, None, StatusCode::OK)
        .await;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["max_users"], 1);

    server
        .request_expect(
            "POST",
            &ep::auth_register(&server.base),
            None,
            Some(json!({
                "email": "second@example.com",
                "password": common::PASSWORD,
                "full_name": "Second",
                "role": "child",
            })),
            StatusCode::FORBIDDEN,
        )
        .await;
}

#[tokio::test]
async fn register_validates_input() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let url = ep::auth_register(&server.base);
    for body in [
        json!({"password": common::PASSWORD, "full_name": "A", "role": "parent"}),
        json!({"email": "a@example.com", "password": "short", "full_name": "A", "role": "parent"}),
        json!({"email": "a@example.com", "password": common::PASSWORD, "full_name": "A"}),
        json!({"email": "a@example.com", "password": common::PASSWORD, "full_name": "A", "role": "admin"}),
    ] {
        server
            .request_expect("POST", &url, None, Some(body), StatusCode::BAD_REQUEST)
            .await;
    }
    server.register("a@example.com", "A", "parent").await;
    server
        .request_expect(
            "POST",
            &url,
            None,
            Some(json!({
                "email": "a@example.com",
                "password": common::PASSWORD,
                "full_name": "Again",
                "role": "parent",
            })),
            StatusCode::BAD_REQUEST,
        )
        .await;
}

#[tokio::test]
async fn admin_notifications_require_service_key() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let user = server.register("mom@example.com", "Mom", "parent").await;
    let url = ep::admin_notifications(&server.base);
    let payload = json!({
        "user_id": user.id,
        "title": "Welcome",
        "message": "Thanks for joining",
    });

    server
        .request_expect("POST", &url, None, Some(payload.clone()), StatusCode::UNAUTHORIZED)
        .await;
    // Same length, prefix, and unrelated keys all fail
    let mut same_len = SERVICE_KEY.to_string();
    same_len.pop();
    same_len.push('#');
    let prefix = &SERVICE_KEY[..SERVICE_KEY.len() - 1];
    for key in ["wrong", prefix, same_len.as_str()] {
        let resp = server
            .client
            .post(&url)
            .header("x-service-role-key", key)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "key {key:?}");
    }

    for _ in 0..2 {
        let resp = server
            .client
            .post(&url)
            .header("x-service-role-key", SERVICE_KEY)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["type"], "system");
        assert_eq!(body["read"], false);
    }
    // No deduplication
    let count = server
        .request_expect(
            "GET",
            &ep::notifications_count(&server.base),
            Some(&user.token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(count["count"], 2);
}

#[tokio::test]
async fn premium_status_follows_family() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let loner = server.register("solo@example.com", "Solo", "parent").await;
    let body = server
        .request_expect(
            "GET",
            &ep::premium(&server.base),
            Some(&loner.token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["is_premium"], false);

    let parent = server.parent_with_family("mom@example.com", "F1").await;
    let until = (Utc::now() + Duration::days(30)).naive_utc();
    assert!(server.store.set_premium_until("F1", Some(until)).await.unwrap());
    let body = server
        .request_expect(
            "GET",
            &ep::premium(&server.base),
            Some(&parent.token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["is_premium"], true);
    assert_eq!(body["family_id"], "F1");
}

async fn fake_provider() -> String {
    async fn create_session(headers: HeaderMap, body: String) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk_test_123");
        if !authorized || !body.contains("client_reference_id=F1") {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
        }
        (
            StatusCode::OK,
            Json(json!({"id": "cs_test_1", "url": "https://pay.example/cs_test_1"})),
        )
    }
    let app = Router::new().route("/v1/checkout/sessions", post(create_session));
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn checkout_without_provider_is_unavailable() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent = server.parent_with_family("mom@example.com", "F1").await;
    server
        .request_expect(
            "POST",
            &ep::checkout(&server.base),
            Some(&parent.token),
            Some(json!({})),
            StatusCode::SERVICE_UNAVAILABLE,
        )
        .await;
}

#[tokio::test]
async fn checkout_creates_provider_session() {
    let mut config = common::test_config();
    config.checkout = Some(server::CheckoutConfig {
        api_base: fake_provider().await,
        secret_key: Some("sk_test_123".into()),
        price_id: "price_family".into(),
        success_url: "https://app.example/premium/ok".into(),
        cancel_url: "https://app.example/premium/cancel".into(),
    });
    let Some(server) = TestServer::spawn_with(config).await else {
        return;
    };
    let parent = server.parent_with_family("mom@example.com", "F1").await;
    let child = server.child_in_family(&parent, "kid@example.com", "F1").await;

    let body = server
        .request_expect(
            "POST",
            &ep::checkout(&server.base),
            Some(&parent.token),
            Some(json!({})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["session_id"], "cs_test_1");
    assert_eq!(body["url"], "https://pay.example/cs_test_1");

    server
        .request_expect(
            "POST",
            &ep::checkout(&server.base),
            Some(&parent.token),
            Some(json!({"success_url": "https://app.example/premium/thanks"})),
            StatusCode::OK,
        )
        .await;
    for body in [
        json!({"success_url": "https://phish.example/premium/ok"}),
        json!({"cancel_url": "http://app.example/premium/cancel"}),
    ] {
        server
            .request_expect(
                "POST",
                &ep::checkout(&server.base),
                Some(&parent.token),
                Some(body),
                StatusCode::BAD_REQUEST,
            )
            .await;
    }

    server
        .request_expect(
            "POST",
            &ep::checkout(&server.base),
            Some(&child.token),
            Some(json!({})),
            StatusCode::FORBIDDEN,
        )
        .await;
}
