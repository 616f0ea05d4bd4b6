use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::models::{NewPlan, Plan, User};
use crate::notify::whatsapp_link;
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::{plans, users};
use crate::state::AppState;

use super::orders::{load_order, to_iso};

#[derive(Deserialize)]
pub struct UploadPlanRequest {
    pub title: String,
    pub file_url: String,
}

#[derive(Serialize)]
pub struct PlanInfo {
    pub id: Uuid,
    pub order_id: Uuid,
    pub title: String,
    /// Always null once the underlying file has been purged, even though
    /// the record itself is kept for history.
    pub file_url: Option<String>,
    pub is_active: bool,
    pub purged: bool,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct PlanDetail {
    pub plan: PlanInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_url: Option<String>,
}

#[derive(Serialize)]
pub struct PlanList {
    pub plans: Vec<PlanInfo>,
}

/// Attach a deliverable to the order. Only the engineer actually bound to
/// the order (or an admin) may upload; an engineer merely browsing unclaimed
/// orders may not.
pub async fn upload_plan(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UploadPlanRequest>,
) -> AppResult<(StatusCode, Json<Envelope<PlanDetail>>)> {
    let title = payload.title.trim().to_string();
    let file_url = payload.file_url.trim().to_string();
    if title.is_empty() || file_url.is_empty() {
        return Err(AppError::bad_request("اسم المخطط ورابط الملف مطلوبان"));
    }

    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;
    let is_bound_engineer =
        user.role == Role::Engineer && order.engineer_id == Some(user.user_id);
    if !(is_bound_engineer || user.role == Role::Admin) {
        return Err(AppError::forbidden());
    }

    let new_plan = NewPlan {
        id: Uuid::new_v4(),
        order_id,
        title,
        file_url: Some(file_url),
        is_active: true,
    };
    diesel::insert_into(plans::table)
        .values(&new_plan)
        .execute(&mut conn)?;

    if let Err(err) = state.notifier.plan_uploaded(order.id, order.client_id).await {
        warn!(order_id = %order.id, error = %err, "plan-uploaded notification failed");
    }

    // Deep link so the engineer can nudge the client directly.
    let client: User = users::table.find(order.client_id).first(&mut conn)?;
    let whatsapp_url = Some(whatsapp_link(
        &client.phone,
        &format!("تم رفع مخطط جديد لطلبك رقم {}", order.order_number),
    ));

    let plan: Plan = plans::table.find(new_plan.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        ok(PlanDetail {
            plan: to_plan_info(plan),
            whatsapp_url,
        }),
    ))
}

pub async fn list_plans(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<PlanList>>> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    let rows: Vec<Plan> = plans::table
        .filter(plans::order_id.eq(order_id))
        .order(plans::created_at.desc())
        .load(&mut conn)?;

    Ok(ok(PlanList {
        plans: rows.into_iter().map(to_plan_info).collect(),
    }))
}

/// Storage-cost purge: the file reference goes dark but the row stays as
/// history. Idempotent; purging twice keeps the first timestamp.
pub async fn purge_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<PlanDetail>>> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    diesel::update(
        plans::table
            .find(plan_id)
            .filter(plans::purged_at.is_null()),
    )
    .set((
        plans::purged_at.eq(Some(now)),
        plans::is_active.eq(false),
        plans::updated_at.eq(now),
    ))
    .execute(&mut conn)?;

    let plan: Plan = plans::table.find(plan_id).first(&mut conn)?;
    Ok(ok(PlanDetail {
        plan: to_plan_info(plan),
        whatsapp_url: None,
    }))
}

fn to_plan_info(plan: Plan) -> PlanInfo {
    let purged = plan.purged_at.is_some();
    // Soft tombstone: never surface the reference after a purge, and treat
    // a missing reference the same way.
    let file_url = if purged { None } else { plan.file_url };
    PlanInfo {
        id: plan.id,
        order_id: plan.order_id,
        title: plan.title,
        file_url,
        is_active: plan.is_active,
        purged,
        created_at: to_iso(plan.created_at),
    }
}
