use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::users;
use crate::state::AppState;

use super::orders::to_iso;

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<UserInfo>,
}

#[derive(Serialize)]
pub struct UserDetail {
    pub user: UserInfo,
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<UserList>>> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;
    let rows: Vec<User> = users::table.order(users::created_at.desc()).load(&mut conn)?;

    Ok(ok(UserList {
        users: rows.into_iter().map(to_user_info).collect(),
    }))
}

/// Roles change only here, by admin action. The value is validated against
/// the closed enum before it touches the store.
pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<Envelope<UserDetail>>> {
    policy::ensure_admin(&user)?;

    let role: Role = payload
        .role
        .parse()
        .map_err(|_| AppError::bad_request("الدور المطلوب غير معروف"))?;

    if user_id == user.user_id {
        return Err(AppError::bad_request("لا يمكنك تغيير دورك بنفسك"));
    }

    let mut conn = state.db()?;
    let target: User = users::table.find(user_id).first(&mut conn)?;

    diesel::update(users::table.find(target.id))
        .set((
            users::role.eq(role.as_str()),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let updated: User = users::table.find(user_id).first(&mut conn)?;
    Ok(ok(UserDetail {
        user: to_user_info(updated),
    }))
}

fn to_user_info(user: User) -> UserInfo {
    UserInfo {
        id: user.id,
        name: user.name,
        email: user.email,
        phone: user.phone,
        role: user.role,
        created_at: to_iso(user.created_at),
    }
}
