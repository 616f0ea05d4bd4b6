use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewPackage, Package};
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::packages;
use crate::state::AppState;

use super::orders::to_iso;

#[derive(Deserialize)]
pub struct CreatePackageRequest {
    pub name_ar: String,
    pub name_en: String,
    pub price: i64,
    pub revisions: i32,
    pub execution_days: i32,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdatePackageRequest {
    pub name_ar: Option<String>,
    pub name_en: Option<String>,
    pub price: Option<i64>,
    pub revisions: Option<i32>,
    pub execution_days: Option<i32>,
    pub is_active: Option<bool>,
    pub features: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct PackageInfo {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub price: i64,
    pub revisions: i32,
    pub execution_days: i32,
    pub is_active: bool,
    pub features: serde_json::Value,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct PackageList {
    pub packages: Vec<PackageInfo>,
}

#[derive(Serialize)]
pub struct PackageDetail {
    pub package: PackageInfo,
}

/// Public catalog. Only active tiers are orderable, so only those are
/// listed; reads go through the short-lived state cache.
pub async fn list_packages(
    State(state): State<AppState>,
) -> AppResult<Json<Envelope<PackageList>>> {
    let rows = match state.cached_packages() {
        Some(rows) => rows,
        None => {
            let mut conn = state.db()?;
            let rows: Vec<Package> = packages::table
                .filter(packages::is_active.eq(true))
                .order(packages::price.asc())
                .load(&mut conn)?;
            state.store_packages(rows.clone());
            rows
        }
    };

    Ok(ok(PackageList {
        packages: rows.into_iter().map(to_package_info).collect(),
    }))
}

pub async fn create_package(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePackageRequest>,
) -> AppResult<(StatusCode, Json<Envelope<PackageDetail>>)> {
    policy::ensure_admin(&user)?;

    if payload.name_ar.trim().is_empty() || payload.name_en.trim().is_empty() {
        return Err(AppError::bad_request("اسم الباقة مطلوب باللغتين"));
    }
    if payload.price < 0 || payload.revisions < 0 || payload.execution_days < 1 {
        return Err(AppError::bad_request("قيم الباقة غير صالحة"));
    }

    let mut conn = state.db()?;
    let new_package = NewPackage {
        id: Uuid::new_v4(),
        name_ar: payload.name_ar.trim().to_string(),
        name_en: payload.name_en.trim().to_string(),
        price: payload.price,
        revisions: payload.revisions,
        execution_days: payload.execution_days,
        is_active: true,
        features: serde_json::to_value(&payload.features)?,
    };
    diesel::insert_into(packages::table)
        .values(&new_package)
        .execute(&mut conn)?;
    state.invalidate_packages();

    let package: Package = packages::table.find(new_package.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        ok(PackageDetail {
            package: to_package_info(package),
        }),
    ))
}

pub async fn update_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdatePackageRequest>,
) -> AppResult<Json<Envelope<PackageDetail>>> {
    policy::ensure_admin(&user)?;

    let mut conn = state.db()?;
    let existing: Package = packages::table.find(package_id).first(&mut conn)?;

    let name_ar = match payload.name_ar {
        Some(value) if value.trim().is_empty() => {
            return Err(AppError::bad_request("اسم الباقة مطلوب باللغتين"))
        }
        Some(value) => value.trim().to_string(),
        None => existing.name_ar,
    };
    let name_en = match payload.name_en {
        Some(value) if value.trim().is_empty() => {
            return Err(AppError::bad_request("اسم الباقة مطلوب باللغتين"))
        }
        Some(value) => value.trim().to_string(),
        None => existing.name_en,
    };
    let price = payload.price.unwrap_or(existing.price);
    let revisions = payload.revisions.unwrap_or(existing.revisions);
    let execution_days = payload.execution_days.unwrap_or(existing.execution_days);
    if price < 0 || revisions < 0 || execution_days < 1 {
        return Err(AppError::bad_request("قيم الباقة غير صالحة"));
    }
    let features = match payload.features {
        Some(features) => serde_json::to_value(&features)?,
        None => existing.features,
    };

    diesel::update(packages::table.find(package_id))
        .set((
            packages::name_ar.eq(name_ar),
            packages::name_en.eq(name_en),
            packages::price.eq(price),
            packages::revisions.eq(revisions),
            packages::execution_days.eq(execution_days),
            packages::is_active.eq(payload.is_active.unwrap_or(existing.is_active)),
            packages::features.eq(features),
            packages::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    state.invalidate_packages();

    let package: Package = packages::table.find(package_id).first(&mut conn)?;
    Ok(ok(PackageDetail {
        package: to_package_info(package),
    }))
}

fn to_package_info(package: Package) -> PackageInfo {
    PackageInfo {
        id: package.id,
        name_ar: package.name_ar,
        name_en: package.name_en,
        price: package.price,
        revisions: package.revisions,
        execution_days: package.execution_days,
        is_active: package.is_active,
        features: package.features,
        created_at: to_iso(package.created_at),
    }
}
