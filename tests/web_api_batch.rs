//! Web API Batch Upload Tests

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::Value;

use common::{create_test_app, png_bytes, register_user};

fn with_file(form: MultipartForm, name: &str, mime: &str, bytes: Vec<u8>) -> MultipartForm {
    form.add_part(
        "files[]",
        Part::bytes(bytes).file_name(name).mime_type(mime),
    )
}

#[tokio::test]
async fn test_image_batch_reports_each_file() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;

    let mut form = MultipartForm::new().add_text("description", "holiday");
    form = with_file(form, "one.png", "image/png", png_bytes(1));
    form = with_file(form, "again.png", "image/png", png_bytes(1));
    form = with_file(form, "notes.pdf", "application/pdf", b"%PDF".to_vec());
    form = with_file(form, "two.png", "image/png", png_bytes(2));

    let response = app
        .server
        .post("/api/images/batch")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(form)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let batch = &body["data"];
    assert_eq!(batch["total"], 4);
    assert_eq!(batch["success_count"], 2);

    let results = batch["results"].as_array().unwrap();
    assert_eq!(results[0]["filename"], "one.png");
    assert_eq!(results[0]["data"]["description"], "holiday");
    assert_eq!(results[1]["error"]["code"], "CONFLICT");
    assert!(results[1].get("data").is_none());
    assert_eq!(results[2]["error"]["code"], "UNPROCESSABLE_ENTITY");
    assert_eq!(results[3]["data"]["name"], "two");

    let listed: Value = app
        .server
        .get("/api/images")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .json();
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_private_batch_encrypts_every_file() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;

    let mut form = MultipartForm::new().add_text("password", "abc123");
    form = with_file(form, "a.txt", "text/plain", b"first".to_vec());
    form = with_file(form, "b.txt", "text/plain", b"second".to_vec());
    form = with_file(form, "dup.txt", "text/plain", b"first".to_vec());

    let response = app
        .server
        .post("/api/private-files/batch")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(form)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let batch = &body["data"];
    assert_eq!(batch["total"], 3);
    assert_eq!(batch["success_count"], 2);
    let results = batch["results"].as_array().unwrap();
    assert_eq!(results[0]["data"]["is_encrypted"], true);
    assert_eq!(results[1]["data"]["is_encrypted"], true);
    assert_eq!(results[2]["filename"], "dup.txt");
    assert_eq!(results[2]["error"]["code"], "CONFLICT");

    let id = results[1]["data"]["id"].as_i64().unwrap();
    let download = app
        .server
        .get(&format!("/api/private-files/{id}/download?password=abc123"))
        .add_header(AUTHORIZATION, user.bearer())
        .await;
    download.assert_status_ok();
    assert_eq!(download.as_bytes().as_ref(), b"second");
}

#[tokio::test]
async fn test_batch_limits() {
    let app = create_test_app().await;
    let user = register_user(&app, "alice").await;

    app.server
        .post("/api/images/batch")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(MultipartForm::new().add_text("description", "nothing"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let max = app.state.config.storage.max_batch_files;
    let mut form = MultipartForm::new();
    for i in 0..=max {
        form = with_file(form, &format!("f{i}.txt"), "text/plain", vec![i as u8]);
    }
    app.server
        .post("/api/private-files/batch")
        .add_header(AUTHORIZATION, user.bearer())
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let listed: Value = app
        .server
        .get("/api/private-files")
        .add_header(AUTHORIZATION, user.bearer())
        .await
        .json();
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_requires_permission() {
    let app = create_test_app().await;

    app.server
        .post("/api/images/batch")
        .multipart(with_file(MultipartForm::new(), "a.png", "image/png", png_bytes(1)))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
