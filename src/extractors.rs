use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::session::get_cookie_value;
use crate::db::models::User;
use crate::db::users;
use crate::error::AppError;
use crate::state::AppState;

/// The account behind a valid session cookie.
/// Returns 401 when the cookie is missing, invalid, expired, or names a
/// deleted user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, state.sessions.cookie_name())
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let user_id = state.sessions.verify(token).map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            AppError::Unauthorized
        })?;

        let conn = state.db.get()?;
        users::find_by_id(&conn, &user_id)?
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Like `CurrentUser`, but a missing or bad session yields `None`
/// instead of a 401.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}
