use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::auth::password::{self, PasswordHash};
use crate::db::models::{check_username, Gender, User, BIO_MAX, PASSWORD_MIN};
use crate::db::users::{self, NewUser, ProfileUpdate};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::state::AppState;

type WithCookie<T> = (StatusCode, [(HeaderName, String); 1], Json<T>);

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub profile_pic: Option<String>,
    pub full_name: Option<String>,
    /// Absent leaves the username alone; `null` or `""` clears it.
    #[serde(default, deserialize_with = "present")]
    pub username: Option<Option<String>>,
    pub bio: Option<String>,
    pub gender: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

// -- Handlers --

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<WithCookie<User>> {
    let full_name = req.full_name.trim();
    let email = req.email.trim();
    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }
    let username = req
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    if let Some(username) = username {
        check_username(username).map_err(|msg| AppError::BadRequest(msg.into()))?;
    }

    {
        let conn = state.db.get()?;
        if users::email_exists(&conn, email)? {
            return Err(AppError::BadRequest("Email already exists".into()));
        }
        if let Some(username) = username {
            if users::username_taken(&conn, username, None)? {
                return Err(AppError::BadRequest("Username already exists".into()));
            }
        }
    }

    let hash = password::hash_password(req.password.clone()).await?;

    let user = {
        let conn = state.db.get()?;
        users::create_user(
            &conn,
            &NewUser {
                email: email.to_string(),
                full_name: full_name.to_string(),
                username: username.map(str::to_string),
                password_hash: hash.into_string(),
            },
            Utc::now(),
        )?
    };

    tracing::info!("New account {} ({})", user.id, user.email);
    with_session(&state, StatusCode::CREATED, user)
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<WithCookie<User>> {
    let found = {
        let conn = state.db.get()?;
        users::find_credentials(&conn, req.email.trim())?
    };
    let invalid = || AppError::BadRequest("Invalid credentials".into());

    let (user, hash) = found.ok_or_else(invalid)?;
    if !password::verify_password(PasswordHash::from_stored(hash), req.password).await? {
        return Err(invalid());
    }

    with_session(&state, StatusCode::OK, user)
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>) -> WithCookie<serde_json::Value> {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, state.sessions.clear_session_cookie())],
        Json(json!({ "message": "Logged out successfully" })),
    )
}

/// GET /api/auth/check
pub async fn check(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// PUT /api/auth/update-profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    let username = req
        .username
        .map(|u| u.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()));
    if let Some(Some(username)) = &username {
        check_username(username).map_err(|msg| AppError::BadRequest(msg.into()))?;
        let conn = state.db.get()?;
        if users::username_taken(&conn, username, Some(user.id()))? {
            return Err(AppError::BadRequest("Username already exists".into()));
        }
    }

    if let Some(bio) = &req.bio {
        if bio.chars().count() > BIO_MAX {
            return Err(AppError::BadRequest(
                "Bio must be less than 300 characters".into(),
            ));
        }
    }

    let gender = match req.gender.as_deref().filter(|g| !g.is_empty()) {
        Some(g) => Some(
            g.parse::<Gender>()
                .map_err(|_| AppError::BadRequest("Invalid gender value".into()))?,
        ),
        None => None,
    };

    let profile_pic = match req.profile_pic.as_deref().filter(|p| !p.is_empty()) {
        Some(pic) => Some(media::store_image(state.media.as_ref(), pic).await?),
        None => None,
    };

    let update = ProfileUpdate {
        full_name: req.full_name.filter(|n| !n.trim().is_empty()),
        username,
        bio: req.bio,
        gender,
        profile_pic,
    };

    let conn = state.db.get()?;
    let updated = users::update_profile(&conn, user.id(), &update, Utc::now())?;
    Ok(Json(updated))
}

fn with_session(state: &AppState, status: StatusCode, user: User) -> AppResult<WithCookie<User>> {
    let token = state.sessions.issue(&user.id, Utc::now())?;
    Ok((
        status,
        [(header::SET_COOKIE, state.sessions.session_cookie(&token))],
        Json(user),
    ))
}
