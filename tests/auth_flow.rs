mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_login_me_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let registered = app
        .post_json(
            "/api/auth/register",
            &json!({
                "name": "سارة",
                "email": "Sara@Test.Local",
                "phone": "966500000009",
                "password": "sara-password",
            }),
            None,
        )
        .await?;
    assert_eq!(registered.status(), StatusCode::CREATED);
    let body = body_to_json(registered.into_body()).await?;
    assert_eq!(body["success"], json!(true));
    // Self-registration never yields anything but a client, whatever the
    // caller hoped for.
    assert_eq!(body["role"], json!("CLIENT"));

    // Email is normalized, so the original casing still logs in.
    let token = app.login_token("sara@test.local", "sara-password").await?;
    let me = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me_body = body_to_json(me.into_body()).await?;
    assert_eq!(me_body["name"], json!("سارة"));
    assert_eq!(me_body["role"], json!("CLIENT"));

    let duplicate = app
        .post_json(
            "/api/auth/register",
            &json!({
                "name": "سارة مرة أخرى",
                "email": "sara@test.local",
                "phone": "966500000010",
                "password": "another-pass",
            }),
            None,
        )
        .await?;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("عميل", "auth-client@test.local", "right-pass", "CLIENT")
        .await?;

    let wrong_password = app
        .post_json(
            "/api/auth/login",
            &json!({"email": "auth-client@test.local", "password": "wrong-pass"}),
            None,
        )
        .await?;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    let unknown_user = app
        .post_json(
            "/api/auth/login",
            &json!({"email": "ghost@test.local", "password": "whatever-pass"}),
            None,
        )
        .await?;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let body = body_to_json(unknown_user.into_body()).await?;
    assert_eq!(body["success"], json!(false));

    let no_token = app.get("/api/auth/me", None).await?;
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let garbage_token = app.get("/api/auth/me", Some("not-a-jwt")).await?;
    assert_eq!(garbage_token.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn weak_registration_input_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let short_password = app
        .post_json(
            "/api/auth/register",
            &json!({
                "name": "قصير",
                "email": "short@test.local",
                "phone": "966500000011",
                "password": "short",
            }),
            None,
        )
        .await?;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);

    let bad_email = app
        .post_json(
            "/api/auth/register",
            &json!({
                "name": "بريد",
                "email": "not-an-email",
                "phone": "966500000012",
                "password": "long-enough-pass",
            }),
            None,
        )
        .await?;
    assert_eq!(bad_email.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
