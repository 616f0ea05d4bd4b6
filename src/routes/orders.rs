use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::lifecycle::OrderStatus;
use crate::models::{NewOrder, Order, Package};
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::{orders, packages};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub package_id: Uuid,
    pub form_data: serde_json::Value,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct PackageSummary {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
}

#[derive(Serialize)]
pub struct OrderInfo {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub engineer_id: Option<Uuid>,
    pub package: PackageSummary,
    pub status: String,
    pub remaining_revisions: i32,
    pub deadline: String,
    pub form_data: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderDetail {
    pub order: OrderInfo,
}

#[derive(Serialize)]
pub struct OrderList {
    pub orders: Vec<OrderInfo>,
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<Envelope<OrderDetail>>)> {
    if user.role != Role::Client {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;

    let package: Option<Package> = packages::table
        .find(payload.package_id)
        .first(&mut conn)
        .optional()?;
    let package = match package {
        Some(package) if package.is_active => package,
        _ => return Err(AppError::bad_request("الباقة المختارة غير متاحة")),
    };

    let now = Utc::now().naive_utc();
    let deadline = now + ChronoDuration::days(i64::from(package.execution_days));

    // Order numbers carry entropy, so a unique-violation collision is
    // possible in principle. One retry covers it.
    let mut inserted: Option<NewOrder> = None;
    for _ in 0..2 {
        let candidate = NewOrder {
            id: Uuid::new_v4(),
            order_number: generate_order_number(),
            client_id: user.user_id,
            package_id: package.id,
            form_data: payload.form_data.clone(),
            status: OrderStatus::Pending.as_str().to_string(),
            remaining_revisions: package.revisions,
            deadline,
        };

        match diesel::insert_into(orders::table)
            .values(&candidate)
            .execute(&mut conn)
        {
            Ok(_) => {
                inserted = Some(candidate);
                break;
            }
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => continue,
            Err(err) => return Err(AppError::from(err)),
        }
    }
    let inserted = inserted.ok_or_else(|| AppError::internal("order number collision"))?;

    let order: Order = orders::table.find(inserted.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        ok(OrderDetail {
            order: to_order_info(order, &package),
        }),
    ))
}

/// The list is scoped server-side with the same predicate the access policy
/// applies to single reads; clients never supply their own scope.
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<OrderList>>> {
    let mut conn = state.db()?;

    let base = orders::table
        .inner_join(packages::table)
        .order(orders::created_at.desc());

    let rows: Vec<(Order, Package)> = match user.role {
        Role::Admin => base.load(&mut conn)?,
        Role::Client => base
            .filter(orders::client_id.eq(user.user_id))
            .load(&mut conn)?,
        Role::Engineer => base
            .filter(
                orders::engineer_id
                    .eq(user.user_id)
                    .or(orders::engineer_id.is_null()),
            )
            .load(&mut conn)?,
    };

    let orders = rows
        .into_iter()
        .map(|(order, package)| to_order_info(order, &package))
        .collect();

    Ok(ok(OrderList { orders }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<OrderDetail>>> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    let package: Package = packages::table.find(order.package_id).first(&mut conn)?;
    Ok(ok(OrderDetail {
        order: to_order_info(order, &package),
    }))
}

/// Engineer claim. The bind is a single conditional UPDATE so two engineers
/// racing for the same order cannot both win; re-claiming an order you
/// already hold is a no-op success.
pub async fn start_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<OrderDetail>>> {
    if user.role != Role::Engineer {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    let claimed = diesel::update(
        orders::table.find(order_id).filter(
            orders::status
                .eq(OrderStatus::Pending.as_str())
                .and(orders::engineer_id.is_null())
                .or(orders::engineer_id
                    .eq(user.user_id)
                    .and(orders::status.eq(OrderStatus::InProgress.as_str()))),
        ),
    )
    .set((
        orders::status.eq(OrderStatus::InProgress.as_str()),
        orders::engineer_id.eq(user.user_id),
        orders::updated_at.eq(now),
    ))
    .execute(&mut conn)?;

    let order = load_order(&mut conn, order_id)?;

    if claimed == 0 {
        // The row exists but the guard failed: bound to someone else, or in
        // a state that cannot be claimed.
        return match order.engineer_id {
            Some(engineer_id) if engineer_id != user.user_id => Err(AppError::forbidden()),
            _ => Err(AppError::conflict("لا يمكن بدء العمل على هذا الطلب")),
        };
    }

    if let Err(err) = state.notifier.order_claimed(order.id, order.client_id).await {
        warn!(order_id = %order.id, error = %err, "order-claimed notification failed");
    }

    let package: Package = packages::table.find(order.package_id).first(&mut conn)?;
    Ok(ok(OrderDetail {
        order: to_order_info(order, &package),
    }))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<Envelope<OrderDetail>>> {
    let next: OrderStatus = payload
        .status
        .parse()
        .map_err(|_| AppError::bad_request("حالة الطلب المطلوبة غير معروفة"))?;

    let mut conn = state.db()?;
    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    let current = OrderStatus::from_stored(&order.status)?;
    current.check_transition(next)?;
    if !initiator_may_transition(&user, &order, current, next) {
        return Err(AppError::forbidden());
    }

    // Precondition on the current status keeps two concurrent transitions
    // from both applying.
    let moved = diesel::update(
        orders::table
            .find(order_id)
            .filter(orders::status.eq(current.as_str())),
    )
    .set((
        orders::status.eq(next.as_str()),
        orders::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(&mut conn)?;

    if moved == 0 {
        return Err(AppError::conflict("تغيرت حالة الطلب، أعد المحاولة"));
    }

    let order = load_order(&mut conn, order_id)?;
    let package: Package = packages::table.find(order.package_id).first(&mut conn)?;
    Ok(ok(OrderDetail {
        order: to_order_info(order, &package),
    }))
}

/// Who may push which lifecycle edge. Admins may take any legal edge; the
/// bound engineer hands work over to review; the client accepts and closes.
fn initiator_may_transition(
    user: &AuthenticatedUser,
    order: &Order,
    from: OrderStatus,
    to: OrderStatus,
) -> bool {
    use OrderStatus::*;
    match user.role {
        Role::Admin => true,
        Role::Engineer => {
            order.engineer_id == Some(user.user_id) && matches!((from, to), (InProgress, Review))
        }
        Role::Client => {
            order.client_id == user.user_id
                && matches!((from, to), (Review, Completed) | (Completed, Closed))
        }
    }
}

pub(super) fn load_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    orders::table
        .find(order_id)
        .first(conn)
        .map_err(AppError::from)
}

pub(super) fn to_iso(value: NaiveDateTime) -> String {
    format!("{}Z", value.format("%Y-%m-%dT%H:%M:%S%.3f"))
}

fn to_order_info(order: Order, package: &Package) -> OrderInfo {
    OrderInfo {
        id: order.id,
        order_number: order.order_number,
        client_id: order.client_id,
        engineer_id: order.engineer_id,
        package: PackageSummary {
            id: package.id,
            name_ar: package.name_ar.clone(),
            name_en: package.name_en.clone(),
        },
        status: order.status,
        remaining_revisions: order.remaining_revisions,
        deadline: to_iso(order.deadline),
        form_data: order.form_data,
        created_at: to_iso(order.created_at),
        updated_at: to_iso(order.updated_at),
    }
}

fn generate_order_number() -> String {
    let mut bytes = [0u8; 3];
    OsRng.fill_bytes(&mut bytes);
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d"),
        hex::encode_upper(bytes)
    )
}
