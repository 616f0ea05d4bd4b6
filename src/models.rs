use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = packages)]
pub struct Package {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub price: i64,
    pub revisions: i32,
    pub execution_days: i32,
    pub is_active: bool,
    pub features: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = packages)]
pub struct NewPackage {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub price: i64,
    pub revisions: i32,
    pub execution_days: i32,
    pub is_active: bool,
    pub features: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = orders)]
#[diesel(belongs_to(Package))]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub engineer_id: Option<Uuid>,
    pub package_id: Uuid,
    pub form_data: serde_json::Value,
    pub status: String,
    pub remaining_revisions: i32,
    pub deadline: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub package_id: Uuid,
    pub form_data: serde_json::Value,
    pub status: String,
    pub remaining_revisions: i32,
    pub deadline: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = plans)]
#[diesel(belongs_to(Order))]
pub struct Plan {
    pub id: Uuid,
    pub order_id: Uuid,
    pub title: String,
    pub file_url: Option<String>,
    pub is_active: bool,
    pub purged_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = plans)]
pub struct NewPlan {
    pub id: Uuid,
    pub order_id: Uuid,
    pub title: String,
    pub file_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = revision_requests)]
#[diesel(belongs_to(Order))]
pub struct RevisionRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub requested_by: Uuid,
    pub pins: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = revision_requests)]
pub struct NewRevisionRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub requested_by: Uuid,
    pub pins: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = messages)]
#[diesel(belongs_to(Order))]
pub struct Message {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub payload: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub payload: Option<serde_json::Value>,
    /// Set explicitly rather than left to the store default: rows inserted
    /// inside one transaction would otherwise share a timestamp and lose
    /// their relative order under the random tie-breaking id.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = engineer_applications)]
pub struct EngineerApplication {
    pub id: Uuid,
    pub token: String,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub applicant_phone: Option<String>,
    pub portfolio_url: Option<String>,
    pub password_hash: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = engineer_applications)]
pub struct NewEngineerApplication {
    pub id: Uuid,
    pub token: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = settings)]
pub struct Setting {
    pub id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = settings)]
pub struct NewSetting {
    pub id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
