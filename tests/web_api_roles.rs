//! Web API Role Administration Tests
//!
//! Role and permission changes made over HTTP apply to the next request.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{create_test_app, file_form, png_bytes, register_admin, register_user};

fn names(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_role_permission_change_applies_to_next_request() {
    let app = create_test_app().await;
    let admin = register_admin(&app, "root").await;
    let user = register_user(&app, "alice").await;

    // warms the cached permission set
    app.server
        .post("/api/images")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(file_form("a.png", "image/png", png_bytes(1)))
        .await
        .assert_status(StatusCode::CREATED);

    app.server
        .delete("/api/roles/user/permissions/upload_file")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = app
        .server
        .post("/api/images")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(file_form("b.png", "image/png", png_bytes(2)))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("upload_file"));

    let mine: Value = app
        .server
        .get("/api/users/me/permissions")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .json();
    assert!(!names(&mine["data"]["permissions"]).contains(&"upload_file".to_string()));

    let response = app
        .server
        .post("/api/roles/user/permissions")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "permission": "upload_file" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(names(&body["data"]["permissions"]).contains(&"upload_file".to_string()));

    app.server
        .post("/api/images")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(file_form("b.png", "image/png", png_bytes(2)))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_replace_role_permissions() {
    let app = create_test_app().await;
    let admin = register_admin(&app, "root").await;
    let user = register_user(&app, "alice").await;

    let response = app
        .server
        .put("/api/roles/user/permissions")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "permissions": ["view_file", "view_file", " download_file "] }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(
        names(&body["data"]["permissions"]),
        vec!["download_file", "view_file"]
    );

    app.server
        .get("/api/private-files")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let perms: Value = app
        .server
        .get(&format!("/api/users/{}/permissions", user.id))
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .json();
    assert_eq!(perms["data"]["user_id"], user.id);
    assert_eq!(
        names(&perms["data"]["permissions"]),
        vec!["download_file", "view_file"]
    );

    app.server
        .put("/api/roles/user/permissions")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "permissions": ["view_file", ""] }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_role_and_deactivate() {
    let app = create_test_app().await;
    let admin = register_admin(&app, "root").await;
    let user = register_user(&app, "alice").await;

    let response = app
        .server
        .post("/api/roles")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "name": "auditor", "description": "reads everything" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "auditor");
    assert_eq!(body["data"]["is_active"], true);

    app.server
        .post("/api/roles")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "name": "auditor" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let roles: Value = app
        .server
        .get("/api/roles")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .json();
    let role_names: Vec<&str> = roles["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert!(role_names.contains(&"auditor"));

    app.server
        .put("/api/roles/user/active")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "is_active": false }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get("/api/private-files")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .put("/api/roles/wizard/active")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "is_active": false }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_permissions_create_list_and_sync() {
    let app = create_test_app().await;
    let admin = register_admin(&app, "root").await;

    app.server
        .post("/api/permissions")
        .add_header(AUTHORIZATION, admin.bearer())
        .json(&json!({ "name": "tag_image", "description": "tag images" }))
        .await
        .assert_status(StatusCode::CREATED);

    let listed: Value = app
        .server
        .get("/api/permissions")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .json();
    assert!(listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["name"] == "tag_image" && p["description"] == "tag images"));

    // seeded at startup, so nothing is missing
    let synced: Value = app
        .server
        .post("/api/permissions/sync")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .json();
    assert_eq!(synced["data"]["grants_created"], 0);

    app.server
        .delete("/api/roles/user/permissions/view_file")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let synced: Value = app
        .server
        .post("/api/permissions/sync")
        .add_header(AUTHORIZATION, admin.bearer())
        .await
        .json();
    assert_eq!(synced["data"]["grants_created"], 1);
}

#[tokio::test]
async fn test_role_admin_requires_admin() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;

    for path in ["/api/roles", "/api/permissions", "/api/roles/user/permissions"] {
        app.server
            .get(path)
            .add_header(AUTHORIZATION, user.bearer())
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
    app.server
        .get(&format!("/api/users/{}/permissions", user.id))
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let mine: Value = app
        .server
        .get("/api/users/me/permissions")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .json();
    assert_eq!(mine["data"]["user_id"], user.id);
    assert_eq!(
        names(&mine["data"]["permissions"]),
        vec!["download_file", "manage_private_files", "upload_file", "view_file"]
    );

    app.server
        .get("/api/users/me/permissions")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
