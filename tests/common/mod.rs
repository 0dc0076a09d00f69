//! Shared helpers for the web API integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;

use imghost::rbac::sync_role_permissions;
use imghost::web::{create_router, AppState};
use imghost::{Config, Database};

pub const PASSWORD: &str = "secret_pw1";

/// A running test server with its state and scratch directory.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

/// Create a test configuration rooted in `dir`.
pub fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.jwt_secret = "test-secret-key-for-testing-only".to_string();
    config.storage.root = dir.path().join("uploads").to_string_lossy().into_owned();
    config.storage.temp_path = dir.path().join("tmp").to_string_lossy().into_owned();
    config
}

/// Create a test server with an in-memory database and seeded roles.
pub async fn create_test_app() -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&dir);

    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    sync_role_permissions(db.pool(), &config.permissions.roles)
        .await
        .expect("Failed to seed roles");

    let state = Arc::new(AppState::new(db, config).expect("Failed to build state"));
    let server = TestServer::new(create_router(Arc::clone(&state)))
        .expect("Failed to create test server");

    TestApp {
        server,
        state,
        _dir: dir,
    }
}

/// A signed-in user.
pub struct TestUser {
    pub id: i64,
    pub jwt: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.jwt)
    }
}

/// Register a user with the default password and return its session.
pub async fn register_user(app: &TestApp, name: &str) -> TestUser {
    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "name": name, "password": PASSWORD }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: Value = response.json();
    TestUser {
        id: body["data"]["user"]["id"].as_i64().unwrap(),
        jwt: body["data"]["access_token"].as_str().unwrap().to_string(),
    }
}

/// Register a user and give them the admin role.
pub async fn register_admin(app: &TestApp, name: &str) -> TestUser {
    let user = register_user(app, name).await;
    app.state
        .rbac()
        .assign_role(user.id, "admin")
        .await
        .expect("Failed to assign admin role");
    user
}

/// Issue an opaque access token for `user`.
pub async fn create_access_token(app: &TestApp, user: &TestUser) -> String {
    let response = app
        .server
        .post("/api/tokens")
        .add_header(AUTHORIZATION, user.bearer())
        .json(&json!({ "device_id": "laptop" }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    body["data"]["token"].as_str().unwrap().to_string()
}

/// A small PNG whose pixels depend on `seed`.
pub fn png_bytes(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(64, 48, |x, y| Rgb([seed, x as u8, y as u8]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Multipart body with a single `file` part.
pub fn file_form(filename: &str, mime: &str, bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes).file_name(filename).mime_type(mime),
    )
}
