use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::{CommentView, LikeToggle, PostView, ReplyView};
use crate::db::posts::{self, Page};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::realtime::events::{
    CommentUpdate, NewComment, NewReply, PostRef, PostUpdate, ReplyUpdate,
};
use crate::realtime::Event;
use crate::state::AppState;

// --- Request/response types ---

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct ShareRequest {
    pub text: Option<String>,
}

/// Raw paging parameters; anything unparsable falls back to the default.
#[derive(Deserialize)]
pub struct FeedQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub likes: usize,
    pub is_liked: bool,
}

impl From<&LikeToggle> for LikeResponse {
    fn from(toggle: &LikeToggle) -> Self {
        Self {
            likes: toggle.count(),
            is_liked: toggle.is_liked,
        }
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/feed", get(feed))
        .route("/api/posts/user/{user_id}", get(user_posts))
        .route("/api/posts/{id}", delete(delete_post))
        .route("/api/posts/{id}/like", post(like_post))
        .route("/api/posts/{id}/comment", post(comment_on_post))
        .route("/api/posts/{id}/share", post(share_post))
        .route(
            "/api/posts/{post_id}/comment/{comment_id}/like",
            post(like_comment),
        )
        .route(
            "/api/posts/{post_id}/comment/{comment_id}/reply",
            post(reply_to_comment),
        )
        .route(
            "/api/posts/{post_id}/comment/{comment_id}/reply/{reply_id}/like",
            post(like_reply),
        )
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<PostView>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_posts(&conn)?))
}

async fn feed(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let page = Page::new(
        query.page.and_then(|p| p.trim().parse().ok()),
        query.limit.and_then(|l| l.trim().parse().ok()),
    );
    let conn = state.db.get()?;
    Ok(Json(posts::list_feed(&conn, page)?))
}

async fn user_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<PostView>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_user_posts(&conn, &user_id)?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let content = non_blank(req.content);
    let image = non_blank(req.image);
    if content.is_none() && image.is_none() {
        return Err(AppError::BadRequest("Post must have content or image".into()));
    }

    let image_url = match image {
        Some(image) => Some(media::store_image(state.media.as_ref(), &image).await?),
        None => None,
    };

    let post = {
        let conn = state.db.get()?;
        posts::create_post(
            &conn,
            user.id(),
            content.as_deref(),
            image_url.as_deref(),
            Utc::now(),
        )?
    };

    tracing::info!("User {} created post {}", user.id(), post.id);
    state.events.publish(Event::NewPost(Box::new(post.clone()))).await;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let (owner_id, image) = {
        let conn = state.db.get()?;
        posts::post_owner(&conn, &id)?.ok_or_else(|| AppError::not_found("Post"))?
    };

    if owner_id != user.id() {
        return Err(AppError::Forbidden(
            "You can only delete your own posts".into(),
        ));
    }

    if let Some(image) = image.as_deref() {
        media::discard_image(state.media.as_ref(), image).await;
    }

    {
        let conn = state.db.get()?;
        if !posts::delete_post(&conn, &id)? {
            return Err(AppError::not_found("Post"));
        }
    }

    state
        .events
        .publish(Event::PostDeleted(PostRef { post_id: id }))
        .await;
    Ok(Json(json!({ "message": "Post deleted successfully" })))
}

async fn like_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let toggle = {
        let mut conn = state.db.get()?;
        posts::toggle_post_like(&mut conn, &id, user.id(), Utc::now())?
    };

    let response = LikeResponse::from(&toggle);
    state
        .events
        .publish(Event::PostUpdate(PostUpdate {
            post_id: id,
            likes_count: toggle.count(),
            likes: toggle.likes,
        }))
        .await;
    Ok(Json(response))
}

async fn comment_on_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment content is required".into()));
    }

    let (comment, comments_count) = {
        let conn = state.db.get()?;
        posts::add_comment(&conn, &id, user.id(), content, Utc::now())?
    };

    state
        .events
        .publish(Event::NewComment(Box::new(NewComment {
            post_id: id,
            comment: comment.clone(),
            comments_count,
        })))
        .await;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn reply_to_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
    Json(req): Json<ContentRequest>,
) -> AppResult<(StatusCode, Json<ReplyView>)> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Reply content is required".into()));
    }

    let reply = {
        let conn = state.db.get()?;
        posts::add_reply(&conn, &post_id, &comment_id, user.id(), content, Utc::now())?
    };

    state
        .events
        .publish(Event::NewReply(Box::new(NewReply {
            post_id,
            comment_id,
            reply: reply.clone(),
        })))
        .await;
    Ok((StatusCode::CREATED, Json(reply)))
}

async fn like_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<LikeResponse>> {
    let toggle = {
        let mut conn = state.db.get()?;
        posts::toggle_comment_like(&mut conn, &post_id, &comment_id, user.id(), Utc::now())?
    };

    let response = LikeResponse::from(&toggle);
    state
        .events
        .publish(Event::CommentUpdate(CommentUpdate {
            post_id,
            comment_id,
            likes_count: toggle.count(),
            likes: toggle.likes,
        }))
        .await;
    Ok(Json(response))
}

async fn like_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id, reply_id)): Path<(String, String, String)>,
) -> AppResult<Json<LikeResponse>> {
    let toggle = {
        let mut conn = state.db.get()?;
        posts::toggle_reply_like(
            &mut conn,
            &post_id,
            &comment_id,
            &reply_id,
            user.id(),
            Utc::now(),
        )?
    };

    let response = LikeResponse::from(&toggle);
    state
        .events
        .publish(Event::ReplyUpdate(ReplyUpdate {
            post_id,
            comment_id,
            reply_id,
            likes_count: toggle.count(),
            likes: toggle.likes,
        }))
        .await;
    Ok(Json(response))
}

async fn share_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ShareRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let caption = non_blank(req.text);

    let (shared, shares_count) = {
        let mut conn = state.db.get()?;
        posts::share_post(&mut conn, &id, user.id(), caption.as_deref(), Utc::now())?
    };

    tracing::info!(
        "User {} shared post {} ({} shares)",
        user.id(),
        id,
        shares_count
    );
    state
        .events
        .publish(Event::NewPost(Box::new(shared.clone())))
        .await;
    Ok((StatusCode::CREATED, Json(shared)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
