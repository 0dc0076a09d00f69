//! Web API Private File Tests

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{json, Value};

use common::{create_test_app, file_form, register_user, TestApp, TestUser};

const CONTENT: &[u8] = b"quarterly numbers, do not share";

async fn upload(app: &TestApp, user: &TestUser, password: Option<&str>) -> i64 {
    let mut form = MultipartForm::new().add_part(
        "file",
        Part::bytes(CONTENT.to_vec())
            .file_name("report.txt")
            .mime_type("text/plain"),
    );
    if let Some(password) = password {
        form = form.add_text("password", password);
    }

    let response = app
        .server
        .post("/api/private-files")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["is_encrypted"], password.is_some());
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_upload_and_download_plain_file() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;
    let id = upload(&app, &user, None).await;

    let response = app
        .server
        .get(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "report");
    assert_eq!(body["data"]["mime_type"], "text/plain");
    assert!(body["data"]["storage_path"].is_null());

    let response = app
        .server
        .get(&format!("/api/private-files/{id}/download"))
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), CONTENT);
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"report.txt\""
    );
}

#[tokio::test]
async fn test_duplicate_upload_conflicts_per_owner() {
    let app = create_test_app().await;
    let alice = register_user(&app, "alice").await;
    let bob = register_user(&app, "bob1").await;

    upload(&app, &alice, None).await;
    let response = app
        .server
        .post("/api/private-files")
        .add_header(AUTHORIZATION, alice.bearer())
        .multipart(file_form("again.txt", "text/plain", CONTENT.to_vec()))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // Another owner may store the same bytes.
    upload(&app, &bob, None).await;
}

#[tokio::test]
async fn test_encrypted_file_requires_password() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;
    let id = upload(&app, &user, Some("open-sesame")).await;

    let response = app
        .server
        .get(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "WRONG_PASSWORD");

    app.server
        .get(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .add_query_param("password", "wrong")
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .add_query_param("password", "open-sesame")
        .await
        .assert_status_ok();

    let response = app
        .server
        .get(&format!("/api/private-files/{id}/download"))
        .add_header(AUTHORIZATION, user.bearer())
        .add_header("x-file-password", "open-sesame".to_string())
        .await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), CONTENT);

    let leftovers = std::fs::read_dir(&app.state.config.storage.temp_path)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_encryption_changes() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;
    let id = upload(&app, &user, None).await;
    let url = format!("/api/private-files/{id}");

    let response = app
        .server
        .put(&url)
        .add_header(AUTHORIZATION, user.bearer())
        .json(&json!({ "name": "renamed", "encryption": { "action": "enable", "password": "pw-one" } }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "renamed");
    assert_eq!(body["data"]["is_encrypted"], true);

    app.server
        .put(&url)
        .add_header(AUTHORIZATION, user.bearer())
        .json(&json!({ "encryption": { "action": "change_password", "old_password": "nope", "new_password": "pw-two" } }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .put(&url)
        .add_header(AUTHORIZATION, user.bearer())
        .json(&json!({ "encryption": { "action": "change_password", "old_password": "pw-one", "new_password": "pw-two" } }))
        .await
        .assert_status_ok();

    let response = app
        .server
        .put(&url)
        .add_header(AUTHORIZATION, user.bearer())
        .json(&json!({ "encryption": { "action": "disable", "password": "pw-two" } }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["is_encrypted"], false);

    let response = app
        .server
        .get(&format!("{url}/download"))
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), CONTENT);
}

#[tokio::test]
async fn test_other_users_file_is_not_found() {
    let app = create_test_app().await;
    let alice = register_user(&app, "alice").await;
    let bob = register_user(&app, "bob1").await;
    let id = upload(&app, &alice, None).await;

    for request in [
        app.server.get(&format!("/api/private-files/{id}")),
        app.server.get(&format!("/api/private-files/{id}/download")),
        app.server.delete(&format!("/api/private-files/{id}")),
    ] {
        request
            .add_header(AUTHORIZATION, bob.bearer())
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_delete_private_file() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;
    let id = upload(&app, &user, None).await;

    app.server
        .delete(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get(&format!("/api/private-files/{id}"))
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .get("/api/private-files")
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    let body: Value = response.json();
    assert!(body["data"].as_array().unwrap().is_empty());

    // The same bytes can be stored again once deleted.
    upload(&app, &user, None).await;
}
