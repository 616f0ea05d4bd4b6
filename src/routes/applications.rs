use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::lifecycle::ApplicationStatus;
use crate::models::{EngineerApplication, NewEngineerApplication, NewUser};
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::{engineer_applications, users};
use crate::state::AppState;

use super::orders::to_iso;

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub portfolio_url: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct InviteData {
    pub application_id: Uuid,
    pub token: String,
    pub invite_url: String,
}

#[derive(Serialize)]
pub struct ApplicationInfo {
    pub id: Uuid,
    pub token: String,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub applicant_phone: Option<String>,
    pub portfolio_url: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ApplicationList {
    pub applications: Vec<ApplicationInfo>,
}

#[derive(Serialize)]
pub struct ApplicationDetail {
    pub application: ApplicationInfo,
}

/// What the invitee sees when opening their capability link. No reviewer
/// fields, no token echo.
#[derive(Serialize)]
pub struct InviteePreview {
    pub status: String,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub applicant_phone: Option<String>,
    pub portfolio_url: Option<String>,
}

#[derive(Serialize)]
pub struct InviteePreviewData {
    pub application: InviteePreview,
}

/// Admin mints an invitation: a pending application whose applicant fields
/// stay empty until the invitee fills them through the token link.
pub async fn invite(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<(StatusCode, Json<Envelope<InviteData>>)> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;

    let token = generate_invite_token();
    let new_application = NewEngineerApplication {
        id: Uuid::new_v4(),
        token: token.clone(),
        status: ApplicationStatus::Pending.as_str().to_string(),
    };
    diesel::insert_into(engineer_applications::table)
        .values(&new_application)
        .execute(&mut conn)?;

    let invite_url = format!("{}/apply?token={}", state.config.app_base_url, token);
    Ok((
        StatusCode::CREATED,
        ok(InviteData {
            application_id: new_application.id,
            token,
            invite_url,
        }),
    ))
}

pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<ApplicationList>>> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;
    let rows: Vec<EngineerApplication> = engineer_applications::table
        .order(engineer_applications::created_at.desc())
        .load(&mut conn)?;

    Ok(ok(ApplicationList {
        applications: rows.into_iter().map(to_application_info).collect(),
    }))
}

pub async fn get_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Envelope<InviteePreviewData>>> {
    let mut conn = state.db()?;
    let application = load_by_token(&mut conn, &token)?;

    Ok(ok(InviteePreviewData {
        application: InviteePreview {
            status: application.status,
            applicant_name: application.applicant_name,
            applicant_email: application.applicant_email,
            applicant_phone: application.applicant_phone,
            portfolio_url: application.portfolio_url,
        },
    }))
}

/// Invitee fills the application. One shot: once the applicant fields are
/// in, the link cannot overwrite them.
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> AppResult<Json<Envelope<InviteePreviewData>>> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    let phone = payload.phone.trim().to_string();

    if name.is_empty() || email.is_empty() || phone.is_empty() {
        return Err(AppError::bad_request("جميع الحقول مطلوبة"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("البريد الإلكتروني غير صالح"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::bad_request(
            "كلمة المرور يجب أن تكون ٨ أحرف على الأقل",
        ));
    }

    let mut conn = state.db()?;
    let application = load_by_token(&mut conn, &token)?;

    let now = Utc::now().naive_utc();
    let filled = diesel::update(
        engineer_applications::table
            .find(application.id)
            .filter(engineer_applications::status.eq(ApplicationStatus::Pending.as_str()))
            .filter(engineer_applications::applicant_name.is_null()),
    )
    .set((
        engineer_applications::applicant_name.eq(Some(name.as_str())),
        engineer_applications::applicant_email.eq(Some(email.as_str())),
        engineer_applications::applicant_phone.eq(Some(phone.as_str())),
        engineer_applications::portfolio_url.eq(payload.portfolio_url.as_deref()),
        engineer_applications::password_hash.eq(Some(password::hash_password(&payload.password)?)),
        engineer_applications::updated_at.eq(now),
    ))
    .execute(&mut conn)?;

    if filled == 0 {
        return Err(AppError::conflict("تم تقديم هذا الطلب مسبقاً"));
    }

    let application = load_by_token(&mut conn, &token)?;
    Ok(ok(InviteePreviewData {
        application: InviteePreview {
            status: application.status,
            applicant_name: application.applicant_name,
            applicant_email: application.applicant_email,
            applicant_phone: application.applicant_phone,
            portfolio_url: application.portfolio_url,
        },
    }))
}

/// One-shot review. The `status = pending` precondition lives inside the
/// UPDATE, so two admins racing on the same application cannot both review
/// it; approval provisions the engineer account in the same transaction.
pub async fn review(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<Envelope<ApplicationDetail>>> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;

    let application: EngineerApplication = engineer_applications::table
        .find(application_id)
        .first(&mut conn)?;

    let next_status = match payload.decision {
        ReviewDecision::Approved => ApplicationStatus::Approved,
        ReviewDecision::Rejected => ApplicationStatus::Rejected,
    };

    if next_status == ApplicationStatus::Approved {
        let complete = application.applicant_name.is_some()
            && application.applicant_email.is_some()
            && application.applicant_phone.is_some()
            && application.password_hash.is_some();
        if !complete {
            return Err(AppError::conflict("الطلب غير مكتمل ولا يمكن اعتماده"));
        }
    }

    conn.transaction::<(), AppError, _>(|conn| {
        let now = Utc::now().naive_utc();

        let reviewed = diesel::update(
            engineer_applications::table
                .find(application_id)
                .filter(engineer_applications::status.eq(ApplicationStatus::Pending.as_str())),
        )
        .set((
            engineer_applications::status.eq(next_status.as_str()),
            engineer_applications::notes.eq(payload.notes.as_deref()),
            engineer_applications::reviewed_by.eq(Some(user.user_id)),
            engineer_applications::reviewed_at.eq(Some(now)),
            engineer_applications::updated_at.eq(now),
        ))
        .execute(conn)?;

        if reviewed == 0 {
            return Err(AppError::conflict("تمت مراجعة هذا الطلب مسبقاً"));
        }

        if next_status == ApplicationStatus::Approved {
            let new_user = NewUser {
                id: Uuid::new_v4(),
                name: application.applicant_name.clone().unwrap_or_default(),
                email: application.applicant_email.clone().unwrap_or_default(),
                phone: application.applicant_phone.clone().unwrap_or_default(),
                password_hash: application.password_hash.clone().unwrap_or_default(),
                role: Role::Engineer.as_str().to_string(),
            };
            match diesel::insert_into(users::table)
                .values(&new_user)
                .execute(conn)
            {
                Ok(_) => {}
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) => {
                    return Err(AppError::conflict(
                        "البريد الإلكتروني للمتقدم مسجل مسبقاً",
                    ));
                }
                Err(err) => return Err(AppError::from(err)),
            }
        }

        Ok(())
    })?;

    let application: EngineerApplication = engineer_applications::table
        .find(application_id)
        .first(&mut conn)?;
    Ok(ok(ApplicationDetail {
        application: to_application_info(application),
    }))
}

fn load_by_token(conn: &mut PgConnection, token: &str) -> AppResult<EngineerApplication> {
    engineer_applications::table
        .filter(engineer_applications::token.eq(token))
        .first(conn)
        .map_err(AppError::from)
}

fn to_application_info(application: EngineerApplication) -> ApplicationInfo {
    ApplicationInfo {
        id: application.id,
        token: application.token,
        applicant_name: application.applicant_name,
        applicant_email: application.applicant_email,
        applicant_phone: application.applicant_phone,
        portfolio_url: application.portfolio_url,
        status: application.status,
        notes: application.notes,
        reviewed_by: application.reviewed_by,
        reviewed_at: application.reviewed_at.map(to_iso),
        created_at: to_iso(application.created_at),
    }
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
