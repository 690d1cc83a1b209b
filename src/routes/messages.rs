use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::{Message, User};
use crate::db::{messages, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::realtime::Event;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub image: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages/users", get(contacts))
        .route("/api/messages/{id}", get(conversation))
        .route("/api/messages/send/{id}", post(send_message))
}

/// GET /api/messages/users: everyone except the caller
async fn contacts(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(users::list_except(&conn, user.id())?))
}

async fn conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(other_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    let conn = state.db.get()?;
    Ok(Json(messages::conversation(&conn, user.id(), &other_id)?))
}

async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(receiver_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let text = req.text.filter(|t| !t.trim().is_empty());
    let image = req.image.filter(|i| !i.trim().is_empty());
    if text.is_none() && image.is_none() {
        return Err(AppError::BadRequest("Message must have text or image".into()));
    }

    {
        let conn = state.db.get()?;
        if users::find_by_id(&conn, &receiver_id)?.is_none() {
            return Err(AppError::not_found("User"));
        }
    }

    let image = match image {
        Some(image) => Some(media::store_image(state.media.as_ref(), &image).await?),
        None => None,
    };

    let message = {
        let conn = state.db.get()?;
        messages::send_message(
            &conn,
            user.id(),
            &receiver_id,
            text.as_deref(),
            image.as_deref(),
            Utc::now(),
        )?
    };

    let delivered = state
        .events
        .send_to(&receiver_id, Event::NewMessage(message.clone()))
        .await;
    tracing::debug!(
        "Message {} to {} (online: {})",
        message.id,
        receiver_id,
        delivered
    );
    Ok((StatusCode::CREATED, Json(message)))
}
