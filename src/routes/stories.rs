use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{OwnStoryView, StoryContent, StoryView};
use crate::db::stories;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::realtime::Event;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    pub content: Option<StoryContent>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stories", post(create_story))
        .route("/api/stories/active", get(active_stories))
        .route("/api/stories/user/{user_id}", get(user_stories))
        .route("/api/stories/{id}/view", post(view_story))
        .route("/api/stories/{id}", delete(delete_story))
}

async fn create_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateStoryRequest>,
) -> AppResult<(StatusCode, Json<StoryView>)> {
    let content = req.content.unwrap_or_default();
    let image = content.image.filter(|i| !i.trim().is_empty());
    let text = content.text.filter(|t| !t.trim().is_empty());
    if image.is_none() && text.is_none() {
        return Err(AppError::BadRequest("Story content is required".into()));
    }

    let image = match image {
        Some(image) => Some(media::store_image(state.media.as_ref(), &image).await?),
        None => None,
    };
    let content = StoryContent {
        image,
        text,
        background_color: content.background_color,
    };

    let story = {
        let conn = state.db.get()?;
        stories::create_story(
            &conn,
            user.id(),
            &content,
            Utc::now(),
            state.config.stories.ttl(),
        )?
    };

    tracing::info!("User {} created story {}", user.id(), story.id);
    state
        .events
        .publish(Event::NewStory(Box::new(story.clone())))
        .await;
    Ok((StatusCode::CREATED, Json(story)))
}

async fn active_stories(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<StoryView>>> {
    let conn = state.db.get()?;
    Ok(Json(stories::list_active(&conn, Utc::now())?))
}

/// GET /api/stories/user/{user_id}: own stories only, expired ones included
async fn user_stories(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<OwnStoryView>>> {
    if user_id != user.id() {
        return Err(AppError::Forbidden(
            "Not authorized to view these stories".into(),
        ));
    }

    let now = Utc::now();
    let conn = state.db.get()?;
    let stories = stories::list_for_user(&conn, &user_id)?
        .into_iter()
        .map(|story| OwnStoryView::at(story, now))
        .collect();
    Ok(Json(stories))
}

async fn view_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<StoryView>> {
    let now = Utc::now();
    let conn = state.db.get()?;
    let story = stories::find_story(&conn, &id)?.ok_or_else(|| AppError::not_found("Story"))?;

    if story.is_expired_at(now) {
        return Err(AppError::Gone("Story has expired".into()));
    }

    if story.user.id == user.id() || !stories::record_view(&conn, &id, user.id(), now)? {
        return Ok(Json(story));
    }

    let story = stories::find_story(&conn, &id)?.ok_or_else(|| AppError::not_found("Story"))?;
    Ok(Json(story))
}

async fn delete_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let story = {
        let conn = state.db.get()?;
        stories::find_story(&conn, &id)?.ok_or_else(|| AppError::not_found("Story"))?
    };

    if story.user.id != user.id() {
        return Err(AppError::Forbidden(
            "Not authorized to delete this story".into(),
        ));
    }

    remove_story(&state, story).await?;
    Ok(Json(json!({ "message": "Story deleted successfully" })))
}

/// Deletes the row, then its image, and announces the removal. A story the
/// sweeper got to first is reported as missing and not announced again.
async fn remove_story(state: &AppState, story: StoryView) -> AppResult<()> {
    let deleted = {
        let conn = state.db.get()?;
        stories::delete_story(&conn, &story.id)?
    };
    if !deleted {
        return Err(AppError::not_found("Story"));
    }

    if let Some(image) = story.content.image.as_deref() {
        media::discard_image(state.media.as_ref(), image).await;
    }
    state.events.publish(Event::StoryDeleted(story.id)).await;
    Ok(())
}
