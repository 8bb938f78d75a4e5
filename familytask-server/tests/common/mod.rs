#![allow(dead_code)]

use axum::http::StatusCode;
use familytask_server::{server, storage};
use familytask_shared::api::endpoints as ep;
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

pub const JWT_SECRET: &str = "testsecret";
pub const SERVICE_KEY: &str = "service-key-for-tests";
pub const PASSWORD: &str = "correct-horse";

pub fn test_config() -> server::AppConfig {
    server::AppConfig {
        jwt_secret: JWT_SECRET.into(),
        service_role_key: Some(SERVICE_KEY.into()),
        dev_cors_origin: None,
        listen_port: None,
        task_store: server::TaskStoreKind::Sqlite,
        registration: server::RegistrationConfig::default(),
        checkout: None,
    }
}

pub struct TestServer {
    pub base: String,
    pub client: Client,
    pub store: storage::Store,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

/// A registered account.
pub struct User {
    pub id: String,
    pub token: String,
}

impl TestServer {
    pub async fn spawn() -> Option<Self> {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: server::AppConfig) -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, store, handle) = match start_server(&db_path, config).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            store,
            handle,
            _tempdir: dir,
        })
    }

    pub async fn request(
        &self,
        method: &str,
        url: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    pub async fn request_expect(
        &self,
        method: &str,
        url: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, url, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {url} returned {status:?} with body {value:?}",
        );
        value
    }

    pub async fn register(&self, email: &str, name: &str, role: &str) -> User {
        let body = self
            .request_expect(
                "POST",
                &ep::auth_register(&self.base),
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "full_name": name,
                    "role": role,
                })),
                StatusCode::OK,
            )
            .await;
        User {
            id: body["user_id"].as_str().expect("user_id").to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    /// Registers a parent and creates a family for them.
    pub async fn parent_with_family(&self, email: &str, family_id: &str) -> User {
        let parent = self.register(email, "Parent", "parent").await;
        let body = self
            .request_expect(
                "POST",
                &ep::family_create(&self.base),
                Some(&parent.token),
                Some(json!({"family_id": family_id})),
                StatusCode::OK,
            )
            .await;
        assert_eq!(body["family_id"], family_id);
        parent
    }

    /// Registers a child and links them into `family_id` on behalf of `parent`.
    pub async fn child_in_family(&self, parent: &User, email: &str, family_id: &str) -> User {
        let child = self.register(email, "Kid", "child").await;
        self.request_expect(
            "POST",
            &ep::family_link_child(&self.base),
            Some(&parent.token),
            Some(json!({"user_id": child.id, "family_code": family_id})),
            StatusCode::OK,
        )
        .await;
        child
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
    config: server::AppConfig,
) -> Result<(SocketAddr, storage::Store, tokio::task::JoinHandle<()>), std::io::Error> {
    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");

    let state = server::AppState::new(config, store.clone());
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, store, handle))
}
