use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{StoryContent, StoryView, StoryViewer};
use crate::db::users::summary_from_row;
use crate::db::{new_id, time_column, to_db_time};
use crate::error::{AppError, AppResult};

const STORY_SELECT: &str = "
    SELECT u.id, u.username, u.full_name, u.profile_pic,
           s.id, s.image, s.text, s.background_color, s.is_active,
           s.expires_at, s.created_at, s.updated_at
    FROM stories s
    JOIN users u ON u.id = s.user_id";

/// A story removed by the sweeper, with the image that may need cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptStory {
    pub id: String,
    pub image: Option<String>,
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryView> {
    Ok(StoryView {
        user: summary_from_row(row)?,
        id: row.get(4)?,
        content: StoryContent {
            image: row.get(5)?,
            text: row.get(6)?,
            background_color: row.get(7)?,
        },
        viewers: Vec::new(),
        is_active: row.get(8)?,
        expires_at: time_column(row, 9)?,
        created_at: time_column(row, 10)?,
        updated_at: time_column(row, 11)?,
    })
}

fn viewers_of(conn: &Connection, story_id: &str) -> rusqlite::Result<Vec<StoryViewer>> {
    let mut stmt = conn.prepare_cached(
        "SELECT u.id, u.username, u.full_name, u.profile_pic, v.viewed_at
         FROM story_views v
         JOIN users u ON u.id = v.user_id
         WHERE v.story_id = ?1
         ORDER BY v.viewed_at ASC, v.rowid ASC",
    )?;
    let viewers = stmt
        .query_map(params![story_id], |row| {
            Ok(StoryViewer {
                user: summary_from_row(row)?,
                viewed_at: time_column(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(viewers)
}

fn with_viewers(conn: &Connection, mut story: StoryView) -> rusqlite::Result<StoryView> {
    story.viewers = viewers_of(conn, &story.id)?;
    Ok(story)
}

fn list_where(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> AppResult<Vec<StoryView>> {
    let mut stmt = conn.prepare(&format!(
        "{} {} ORDER BY s.created_at DESC, s.rowid DESC",
        STORY_SELECT, filter
    ))?;
    let stories = stmt
        .query_map(args, story_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let stories = stories
        .into_iter()
        .map(|story| with_viewers(conn, story))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

pub fn create_story(
    conn: &Connection,
    user_id: &str,
    content: &StoryContent,
    now: DateTime<Utc>,
    ttl: Duration,
) -> AppResult<StoryView> {
    let id = new_id();
    let ts = to_db_time(&now);
    conn.execute(
        "INSERT INTO stories (id, user_id, image, text, background_color, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            user_id,
            content.image,
            content.text,
            content.background_color,
            to_db_time(&(now + ttl)),
            ts
        ],
    )?;
    find_story(conn, &id)?.ok_or_else(|| AppError::Internal("story vanished after insert".into()))
}

pub fn find_story(conn: &Connection, id: &str) -> AppResult<Option<StoryView>> {
    let story = conn
        .query_row(
            &format!("{} WHERE s.id = ?1", STORY_SELECT),
            params![id],
            story_from_row,
        )
        .optional()?
        .map(|story| with_viewers(conn, story))
        .transpose()?;
    Ok(story)
}

/// Stories visible to everyone at `now`: active and not past `expires_at`,
/// whether or not the sweeper has caught up yet.
pub fn list_active(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<StoryView>> {
    let now = to_db_time(&now);
    list_where(conn, "WHERE s.is_active = 1 AND s.expires_at > ?1", &[&now])
}

/// Every story a user still has on disk, expired ones included.
pub fn list_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<StoryView>> {
    list_where(conn, "WHERE s.user_id = ?1", &[&user_id])
}

/// Records the first view of a story by `viewer_id`. Returns false when the
/// viewer had already seen it.
pub fn record_view(
    conn: &Connection,
    story_id: &str,
    viewer_id: &str,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO story_views (story_id, user_id, viewed_at) VALUES (?1, ?2, ?3)",
        params![story_id, viewer_id, to_db_time(&now)],
    )?;
    Ok(inserted > 0)
}

pub fn delete_story(conn: &Connection, id: &str) -> AppResult<bool> {
    let removed = conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

/// Deletes every story whose `expires_at` is at or before `now`.
pub fn sweep_expired(conn: &mut Connection, now: DateTime<Utc>) -> AppResult<Vec<SweptStory>> {
    let now = to_db_time(&now);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let swept = {
        let mut stmt = tx.prepare(
            "SELECT id, image FROM stories WHERE expires_at <= ?1 ORDER BY expires_at ASC",
        )?;
        let rows = stmt.query_map(params![now], |row| {
            Ok(SweptStory {
                id: row.get(0)?,
                image: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    tx.execute("DELETE FROM stories WHERE expires_at <= ?1", params![now])?;
    tx.commit()?;
    Ok(swept)
}
