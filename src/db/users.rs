use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::db::models::{Gender, User, UserSummary};
use crate::db::{new_id, time_column, to_db_time};
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str =
    "id, email, full_name, username, profile_pic, bio, gender, created_at, updated_at";

pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub username: Option<String>,
    pub password_hash: String,
}

/// Fields a profile update may touch. `None` leaves the column alone;
/// `username: Some(None)` clears it.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<Option<String>>,
    pub bio: Option<String>,
    pub gender: Option<Gender>,
    pub profile_pic: Option<String>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let gender: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        username: row.get(3)?,
        profile_pic: row.get(4)?,
        bio: row.get(5)?,
        gender: gender.parse().unwrap_or_default(),
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
    })
}

/// Translates UNIQUE violations on the users table into the messages the
/// API reports for duplicate accounts.
fn map_unique_violation(err: rusqlite::Error) -> AppError {
    if let rusqlite::Error::SqliteFailure(ref e, Some(ref msg)) = err {
        if e.code == ErrorCode::ConstraintViolation {
            if msg.contains("users.email") {
                return AppError::BadRequest("Email already exists".into());
            }
            if msg.contains("users.username") {
                return AppError::BadRequest("Username already exists".into());
            }
        }
    }
    AppError::Database(err)
}

pub fn create_user(conn: &Connection, user: &NewUser, now: DateTime<Utc>) -> AppResult<User> {
    let id = new_id();
    let ts = to_db_time(&now);
    conn.execute(
        "INSERT INTO users (id, email, full_name, username, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            user.email,
            user.full_name,
            user.username,
            user.password_hash,
            ts
        ],
    )
    .map_err(map_unique_violation)?;

    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Looks up an account for login, returning it with its password hash.
pub fn find_credentials(conn: &Connection, email: &str) -> AppResult<Option<(User, String)>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {}, password_hash FROM users WHERE email = ?1",
                USER_COLUMNS
            ),
            params![email],
            |row| Ok((user_from_row(row)?, row.get::<_, String>(9)?)),
        )
        .optional()?;
    Ok(found)
}

pub fn email_exists(conn: &Connection, email: &str) -> AppResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// True when another account (not `except_id`) already owns `username`.
pub fn username_taken(
    conn: &Connection,
    username: &str,
    except_id: Option<&str>,
) -> AppResult<bool> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 AND id != COALESCE(?2, '')",
        params![username, except_id],
        |row| row.get(0),
    )?;
    Ok(taken)
}

pub fn update_profile(
    conn: &Connection,
    id: &str,
    update: &ProfileUpdate,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let (set_username, username) = match &update.username {
        Some(value) => (true, value.clone()),
        None => (false, None),
    };

    let changed = conn
        .execute(
            "UPDATE users SET
                full_name = COALESCE(?2, full_name),
                username = CASE WHEN ?3 THEN ?4 ELSE username END,
                bio = COALESCE(?5, bio),
                gender = COALESCE(?6, gender),
                profile_pic = COALESCE(?7, profile_pic),
                updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                update.full_name,
                set_username,
                username,
                update.bio,
                update.gender.map(|g| g.as_str()),
                update.profile_pic,
                to_db_time(&now),
            ],
        )
        .map_err(map_unique_violation)?;

    if changed == 0 {
        return Err(AppError::not_found("User"));
    }

    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User"))
}

/// Everyone except `id`, for the direct-message contact list.
pub fn list_except(conn: &Connection, id: &str) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE id != ?1 ORDER BY full_name COLLATE NOCASE",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map(params![id], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn summary(conn: &Connection, id: &str) -> AppResult<UserSummary> {
    let summary = conn
        .query_row(
            "SELECT id, username, full_name, profile_pic FROM users WHERE id = ?1",
            params![id],
            summary_from_row,
        )
        .optional()?;
    summary.ok_or_else(|| AppError::not_found("User"))
}

pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        profile_pic: row.get(3)?,
    })
}
