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

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Message, NewMessage};
use crate::pins::{self, MessageBody};
use crate::policy;
use crate::respond::{ok, Envelope};
use crate::schema::messages;
use crate::state::AppState;

use super::orders::{load_order, to_iso};

#[derive(Deserialize)]
pub struct PointInput {
    pub pin_index: u32,
    pub location: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub content: Option<String>,
    pub point: Option<PointInput>,
}

#[derive(Serialize)]
pub struct MessageInfo {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub body: MessageBody,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct MessageList {
    pub messages: Vec<MessageInfo>,
}

#[derive(Serialize)]
pub struct MessageDetail {
    pub message: MessageInfo,
}

/// Fetch the order's thread. Side effect by design: everything the *other*
/// participants sent is marked read in the same request, so a fetch is the
/// read receipt. A sender never marks their own messages.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Envelope<MessageList>>> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    diesel::update(
        messages::table
            .filter(messages::order_id.eq(order_id))
            .filter(messages::sender_id.ne(user.user_id))
            .filter(messages::is_read.eq(false)),
    )
    .set(messages::is_read.eq(true))
    .execute(&mut conn)?;

    // Creation-time order with the id as tie-breaker, re-sorted on every
    // fetch; concurrent inserts settle here, not in the handlers.
    let rows: Vec<Message> = messages::table
        .filter(messages::order_id.eq(order_id))
        .order((messages::created_at.asc(), messages::id.asc()))
        .load(&mut conn)?;

    let messages = rows.into_iter().map(to_message_info).collect();
    Ok(ok(MessageList { messages }))
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<PostMessageRequest>,
) -> AppResult<(StatusCode, Json<Envelope<MessageDetail>>)> {
    let mut conn = state.db()?;

    let order = load_order(&mut conn, order_id)?;
    policy::ensure_order_access(&user, &order)?;

    let (content, body) = match (payload.point, payload.content) {
        (Some(point), _) => {
            if point.location.trim().is_empty() {
                return Err(AppError::bad_request("موقع نقطة التعديل مطلوب"));
            }
            let content =
                pins::encode_modification_point(point.pin_index, &point.location, &point.note);
            let body = MessageBody::ModificationPoint {
                pin_index: point.pin_index,
                location: point.location.trim().to_string(),
                note: if point.note.trim().is_empty() {
                    pins::NO_NOTE.to_string()
                } else {
                    point.note.trim().to_string()
                },
            };
            (content, body)
        }
        (None, Some(text)) => {
            let trimmed = text.trim().to_string();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("لا يمكن إرسال رسالة فارغة"));
            }
            (trimmed, MessageBody::Text)
        }
        (None, None) => {
            return Err(AppError::bad_request("لا يمكن إرسال رسالة فارغة"));
        }
    };

    let new_message = NewMessage {
        id: Uuid::new_v4(),
        order_id,
        sender_id: user.user_id,
        content,
        payload: Some(serde_json::to_value(&body)?),
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(messages::table)
        .values(&new_message)
        .execute(&mut conn)?;

    if let Err(err) = state
        .notifier
        .message_posted(order_id, user.user_id)
        .await
    {
        warn!(%order_id, error = %err, "message-posted notification failed");
    }

    let message: Message = messages::table.find(new_message.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        ok(MessageDetail {
            message: to_message_info(message),
        }),
    ))
}

fn to_message_info(message: Message) -> MessageInfo {
    let body = pins::decode_message(&message.content, message.payload.as_ref());
    MessageInfo {
        id: message.id,
        sender_id: message.sender_id,
        content: message.content,
        body,
        is_read: message.is_read,
        created_at: to_iso(message.created_at),
    }
}
