mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn invitation_to_approval_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("مشرف", "apps-admin@test.local", "admin-pass", "ADMIN")
        .await?;
    let admin_token = app.login_token("apps-admin@test.local", "admin-pass").await?;

    let invited = app
        .post_json("/api/applications/invite", &json!({}), Some(&admin_token))
        .await?;
    assert_eq!(invited.status(), StatusCode::CREATED);
    let invite = body_to_json(invited.into_body()).await?;
    let token = invite["token"].as_str().context("token")?.to_string();
    let application_id = invite["application_id"]
        .as_str()
        .context("application id")?
        .to_string();
    assert!(invite["invite_url"]
        .as_str()
        .context("invite url")?
        .contains(&token));

    // The invitee opens the capability link without an account.
    let preview = app
        .get(&format!("/api/applications/token/{token}"), None)
        .await?;
    assert_eq!(preview.status(), StatusCode::OK);
    let preview_body = body_to_json(preview.into_body()).await?;
    assert_eq!(preview_body["application"]["status"], json!("pending"));
    assert!(preview_body["application"]["applicant_name"].is_null());

    let submitted = app
        .post_json(
            &format!("/api/applications/token/{token}/submit"),
            &json!({
                "name": "مهندسة جديدة",
                "email": "new-engineer@test.local",
                "phone": "966500000002",
                "portfolio_url": "https://portfolio.test/amal",
                "password": "engineer-pass",
            }),
            None,
        )
        .await?;
    assert_eq!(submitted.status(), StatusCode::OK);

    // The link is one-shot: filled fields cannot be overwritten.
    let resubmitted = app
        .post_json(
            &format!("/api/applications/token/{token}/submit"),
            &json!({
                "name": "منتحل",
                "email": "other@test.local",
                "phone": "966500000003",
                "password": "stolen-pass",
            }),
            None,
        )
        .await?;
    assert_eq!(resubmitted.status(), StatusCode::CONFLICT);

    let reviewed = app
        .post_json(
            &format!("/api/applications/{application_id}/review"),
            &json!({"decision": "approved", "notes": "ملف ممتاز"}),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(reviewed.status(), StatusCode::OK);
    let review_body = body_to_json(reviewed.into_body()).await?;
    assert_eq!(review_body["application"]["status"], json!("approved"));
    assert!(review_body["application"]["reviewed_at"].is_string());

    // Approval provisioned the engineer account.
    let engineer_token = app
        .login_token("new-engineer@test.local", "engineer-pass")
        .await?;
    let me = app.get("/api/auth/me", Some(&engineer_token)).await?;
    let me_body = body_to_json(me.into_body()).await?;
    assert_eq!(me_body["role"], json!("ENGINEER"));

    // Re-review of a settled application is a conflict.
    let rereviewed = app
        .post_json(
            &format!("/api/applications/{application_id}/review"),
            &json!({"decision": "rejected"}),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(rereviewed.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn review_is_admin_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("مشرف", "apps-admin2@test.local", "admin-pass", "ADMIN")
        .await?;
    app.insert_user("عميل", "apps-client@test.local", "client-pass", "CLIENT")
        .await?;
    let admin_token = app
        .login_token("apps-admin2@test.local", "admin-pass")
        .await?;
    let client_token = app
        .login_token("apps-client@test.local", "client-pass")
        .await?;

    let forbidden_invite = app
        .post_json("/api/applications/invite", &json!({}), Some(&client_token))
        .await?;
    assert_eq!(forbidden_invite.status(), StatusCode::FORBIDDEN);

    let invited = app
        .post_json("/api/applications/invite", &json!({}), Some(&admin_token))
        .await?;
    let invite = body_to_json(invited.into_body()).await?;
    let application_id = invite["application_id"]
        .as_str()
        .context("application id")?
        .to_string();

    let forbidden_review = app
        .post_json(
            &format!("/api/applications/{application_id}/review"),
            &json!({"decision": "rejected"}),
            Some(&client_token),
        )
        .await?;
    assert_eq!(forbidden_review.status(), StatusCode::FORBIDDEN);

    let forbidden_list = app.get("/api/applications", Some(&client_token)).await?;
    assert_eq!(forbidden_list.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unfilled_application_cannot_be_approved_but_can_be_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("مشرف", "apps-admin3@test.local", "admin-pass", "ADMIN")
        .await?;
    let admin_token = app
        .login_token("apps-admin3@test.local", "admin-pass")
        .await?;

    let invited = app
        .post_json("/api/applications/invite", &json!({}), Some(&admin_token))
        .await?;
    let invite = body_to_json(invited.into_body()).await?;
    let application_id = invite["application_id"]
        .as_str()
        .context("application id")?
        .to_string();

    let approve_empty = app
        .post_json(
            &format!("/api/applications/{application_id}/review"),
            &json!({"decision": "approved"}),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(approve_empty.status(), StatusCode::CONFLICT);

    let rejected = app
        .post_json(
            &format!("/api/applications/{application_id}/review"),
            &json!({"decision": "rejected", "notes": "لم يكتمل"}),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(rejected.status(), StatusCode::OK);
    let body = body_to_json(rejected.into_body()).await?;
    assert_eq!(body["application"]["status"], json!("rejected"));

    app.cleanup().await?;
    Ok(())
}
