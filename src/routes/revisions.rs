use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::lifecycle::OrderStatus;
use crate::models::{NewMessage, NewRevisionRequest, RevisionRequest};
use crate::pins::{self, MessageBody, Pin};
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::{messages, orders, revision_requests};
use crate::settings;
use crate::state::AppState;

use super::orders::{load_order, to_iso};

#[derive(Deserialize)]
pub struct PinInput {
    pub location: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Deserialize)]
pub struct CreateRevisionRequest {
    pub pins: Vec<PinInput>,
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub quantity: i32,
}

#[derive(Serialize)]
pub struct RevisionInfo {
    pub id: Uuid,
    pub requested_by: Uuid,
    pub pins: Vec<Pin>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct RevisionList {
    pub revisions: Vec<RevisionInfo>,
    pub remaining_revisions: i32,
}

#[derive(Serialize)]
pub struct RevisionDetail {
    pub revision: RevisionInfo,
    pub remaining_revisions: i32,
}

#[derive(Serialize)]
pub struct PurchaseData {
    pub quantity: i32,
    pub total_price: i64,
    pub remaining_revisions: i32,
}

/// File a revision request against one revision credit. The debit is a
/// guarded UPDATE (`remaining_revisions > 0` evaluated by the store), so
/// concurrent requests can never drive the counter negative: N credits admit
/// exactly N revisions.
pub async fn create_revision(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRevisionRequest>,
) -> AppResult<(StatusCode, Json<Envelope<RevisionDetail>>)> {
    if payload.pins.is_empty() {
        return Err(AppError::bad_request("حدد نقطة تعديل واحدة على الأقل"));
    }
    if payload.pins.iter().any(|pin| pin.location.trim().is_empty()) {
        return Err(AppError::bad_request("موقع نقطة التعديل مطلوب"));
    }

    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;
    if user.role == Role::Engineer {
        return Err(AppError::forbidden());
    }

    let current = OrderStatus::from_stored(&order.status)?;
    if !matches!(current, OrderStatus::InProgress | OrderStatus::Review) {
        return Err(AppError::conflict("حالة الطلب الحالية لا تسمح بطلب تعديل"));
    }

    let pin_records: Vec<Pin> = payload
        .pins
        .iter()
        .map(|pin| Pin {
            location: pin.location.trim().to_string(),
            note: pin.note.trim().to_string(),
        })
        .collect();

    let revision_id = conn.transaction::<Uuid, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();

        let debited = diesel::update(
            orders::table
                .find(order_id)
                .filter(orders::remaining_revisions.gt(0)),
        )
        .set((
            orders::remaining_revisions.eq(orders::remaining_revisions - 1),
            orders::updated_at.eq(now),
        ))
        .execute(conn)?;

        if debited == 0 {
            return Err(AppError::conflict(
                "لا يوجد رصيد تعديلات متبقٍ، يمكنك شراء تعديلات إضافية",
            ));
        }

        let new_revision = NewRevisionRequest {
            id: Uuid::new_v4(),
            order_id,
            requested_by: user.user_id,
            pins: serde_json::to_string(&pin_records)?,
        };
        diesel::insert_into(revision_requests::table)
            .values(&new_revision)
            .execute(conn)?;

        // Each pin lands in the thread as a modification-point message, so
        // the engineer sees the request where the conversation happens.
        for (position, pin) in pin_records.iter().enumerate() {
            let pin_index = (position + 1) as u32;
            let body = MessageBody::ModificationPoint {
                pin_index,
                location: pin.location.clone(),
                note: if pin.note.is_empty() {
                    pins::NO_NOTE.to_string()
                } else {
                    pin.note.clone()
                },
            };
            // Spread the timestamps so the thread keeps the pins in order.
            let message = NewMessage {
                id: Uuid::new_v4(),
                order_id,
                sender_id: user.user_id,
                content: pins::encode_modification_point(pin_index, &pin.location, &pin.note),
                payload: Some(serde_json::to_value(&body)?),
                created_at: now + ChronoDuration::milliseconds(position as i64),
            };
            diesel::insert_into(messages::table)
                .values(&message)
                .execute(conn)?;
        }

        // A revision filed during review sends the order back to the
        // drawing board.
        diesel::update(
            orders::table
                .find(order_id)
                .filter(orders::status.eq(OrderStatus::Review.as_str())),
        )
        .set((
            orders::status.eq(OrderStatus::InProgress.as_str()),
            orders::updated_at.eq(now),
        ))
        .execute(conn)?;

        Ok(new_revision.id)
    })?;

    let revision: RevisionRequest = revision_requests::table
        .find(revision_id)
        .first(&mut conn)?;
    let order = load_order(&mut conn, order_id)?;

    Ok((
        StatusCode::CREATED,
        ok(RevisionDetail {
            revision: to_revision_info(revision),
            remaining_revisions: order.remaining_revisions,
        }),
    ))
}

pub async fn list_revisions(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<RevisionList>>> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    let rows: Vec<RevisionRequest> = revision_requests::table
        .filter(revision_requests::order_id.eq(order_id))
        .order(revision_requests::created_at.desc())
        .load(&mut conn)?;

    Ok(ok(RevisionList {
        revisions: rows.into_iter().map(to_revision_info).collect(),
        remaining_revisions: order.remaining_revisions,
    }))
}

/// Buy additional revision credit once the included allowance is spent.
/// Pricing comes from the settings row, falling back to documented defaults.
/// Payment capture happens outside this service; the handler only reports
/// the computed total.
pub async fn purchase_revisions(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<PurchaseRequest>,
) -> AppResult<Json<Envelope<PurchaseData>>> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;
    if user.role == Role::Engineer {
        return Err(AppError::forbidden());
    }

    let config = settings::revision_purchase_config(&mut conn)?;
    if payload.quantity < 1 || payload.quantity > config.max_per_purchase {
        return Err(AppError::bad_request(format!(
            "عدد التعديلات يجب أن يكون بين 1 و {}",
            config.max_per_purchase
        )));
    }

    diesel::update(orders::table.find(order_id))
        .set((
            orders::remaining_revisions.eq(orders::remaining_revisions + payload.quantity),
            orders::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let order = load_order(&mut conn, order_id)?;
    Ok(ok(PurchaseData {
        quantity: payload.quantity,
        total_price: config.price_per_revision * i64::from(payload.quantity),
        remaining_revisions: order.remaining_revisions,
    }))
}

fn to_revision_info(revision: RevisionRequest) -> RevisionInfo {
    let pins = pins::decode_pins(&revision.pins);
    RevisionInfo {
        id: revision.id,
        requested_by: revision.requested_by,
        pins,
        created_at: to_iso(revision.created_at),
    }
}
