#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tower::ServiceExt;

use murmur::config::Config;
use murmur::db;
use murmur::realtime::ChannelId;
use murmur::state::AppState;

pub const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub tmp: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

/// A signed-up account and its session cookie.
pub struct Account {
    pub id: String,
    pub cookie: String,
}

impl TestApp {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("murmur.db"));
        config.storage.path = Some(tmp.path().join("uploads"));
        config.auth.jwt_secret = Some("integration-secret".to_string());

        let pool = db::create_pool(&config.db_path()).unwrap();
        db::run_migrations(&pool).unwrap();

        let state = AppState::new(pool, config);
        let router = murmur::routes::app(state.clone()).unwrap();
        Self { state, router, tmp }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, account: &Account) -> Response {
        self.request(Method::GET, uri, Some(&account.cookie), None)
            .await
    }

    pub async fn post(&self, uri: &str, account: &Account, body: Value) -> Response {
        self.request(Method::POST, uri, Some(&account.cookie), Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, account: &Account) -> Response {
        self.request(Method::DELETE, uri, Some(&account.cookie), None)
            .await
    }

    pub async fn signup(&self, name: &str) -> Account {
        let response = self
            .request(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "fullName": format!("{} Tester", name),
                    "email": format!("{}@example.com", name),
                    "password": "secret1",
                    "username": name,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        Account {
            id: response.body["id"].as_str().unwrap().to_string(),
            cookie: session_cookie(&response.headers).unwrap(),
        }
    }

    /// Opens a push channel straight on the registry, as the socket handler would.
    pub async fn channel(&self, user_id: Option<&str>) -> (ChannelId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let channel = self.state.registry.connect(tx).await;
        if let Some(user_id) = user_id {
            assert!(self.state.registry.register(user_id, channel).await);
        }
        (channel, rx)
    }

    pub async fn create_post(&self, account: &Account, content: &str) -> Value {
        let response = self
            .post("/api/posts", account, json!({ "content": content }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }
}

/// The `name=value` part of the session Set-Cookie header.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("jwt="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Every frame queued on a channel so far, parsed.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

pub fn events_named<'a>(frames: &'a [Value], name: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["event"] == name).collect()
}
