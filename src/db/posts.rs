use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{CommentView, LikeToggle, PostView, ReplyView, ShareView, UserSummary};
use crate::db::users::summary_from_row;
use crate::db::{new_id, time_column, to_db_time};
use crate::error::{AppError, AppResult};

const POST_SELECT: &str = "
    SELECT u.id, u.username, u.full_name, u.profile_pic,
           p.id, p.content, p.image, p.is_shared, p.original_post_id, p.share_caption, p.created_at
    FROM posts p
    JOIN users u ON u.id = p.author_id";

/// A window into the newest-first post listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page from 1-based page number and size, falling back to the
    /// defaults for missing or zero values.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT);
        Self {
            offset: (page - 1).saturating_mul(limit),
            limit,
        }
    }
}

struct PostRow {
    id: String,
    author: UserSummary,
    content: Option<String>,
    image: Option<String>,
    is_shared: bool,
    original_post_id: Option<String>,
    share_caption: Option<String>,
    created_at: DateTime<Utc>,
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        author: summary_from_row(row)?,
        id: row.get(4)?,
        content: row.get(5)?,
        image: row.get(6)?,
        is_shared: row.get(7)?,
        original_post_id: row.get(8)?,
        share_caption: row.get(9)?,
        created_at: time_column(row, 10)?,
    })
}

/// Which like table a toggle operates on.
#[derive(Debug, Clone, Copy)]
enum LikeTarget {
    Post,
    Comment,
    Reply,
}

impl LikeTarget {
    fn table(self) -> (&'static str, &'static str) {
        match self {
            LikeTarget::Post => ("post_likes", "post_id"),
            LikeTarget::Comment => ("comment_likes", "comment_id"),
            LikeTarget::Reply => ("reply_likes", "reply_id"),
        }
    }
}

fn likes_of(conn: &Connection, target: LikeTarget, id: &str) -> rusqlite::Result<Vec<String>> {
    let (table, column) = target.table();
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT user_id FROM {} WHERE {} = ?1 ORDER BY rowid",
        table, column
    ))?;
    let likes = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(likes)
}

/// Flips membership of `user_id` in the like set. Runs inside the caller's
/// IMMEDIATE transaction, so concurrent toggles serialize on the write lock.
fn toggle_like(
    conn: &Connection,
    target: LikeTarget,
    id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<LikeToggle> {
    let (table, column) = target.table();
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1 AND user_id = ?2", table, column),
        params![id, user_id],
    )?;
    if removed == 0 {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, user_id, created_at) VALUES (?1, ?2, ?3)",
                table, column
            ),
            params![id, user_id, to_db_time(&now)],
        )?;
    }
    Ok(LikeToggle {
        likes: likes_of(conn, target, id)?,
        is_liked: removed == 0,
    })
}

fn replies_of(conn: &Connection, comment_id: &str) -> rusqlite::Result<Vec<ReplyView>> {
    let mut stmt = conn.prepare_cached(
        "SELECT u.id, u.username, u.full_name, u.profile_pic, r.id, r.content, r.created_at
         FROM replies r
         JOIN users u ON u.id = r.user_id
         WHERE r.comment_id = ?1
         ORDER BY r.created_at ASC, r.rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![comment_id], |row| {
            Ok((
                summary_from_row(row)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                time_column(row, 6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user, id, content, created_at)| {
            Ok(ReplyView {
                likes: likes_of(conn, LikeTarget::Reply, &id)?,
                id,
                user,
                content,
                created_at,
            })
        })
        .collect()
}

fn hydrate_comment(
    conn: &Connection,
    user: UserSummary,
    id: String,
    content: String,
    created_at: DateTime<Utc>,
) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        likes: likes_of(conn, LikeTarget::Comment, &id)?,
        replies: replies_of(conn, &id)?,
        id,
        user,
        content,
        created_at,
    })
}

fn comments_of(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<CommentView>> {
    let mut stmt = conn.prepare_cached(
        "SELECT u.id, u.username, u.full_name, u.profile_pic, c.id, c.content, c.created_at
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![post_id], |row| {
            Ok((
                summary_from_row(row)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                time_column(row, 6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user, id, content, created_at)| hydrate_comment(conn, user, id, content, created_at))
        .collect()
}

fn shares_of(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<ShareView>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, shared_post_id, caption, created_at
         FROM post_shares WHERE post_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let shares = stmt
        .query_map(params![post_id], |row| {
            Ok(ShareView {
                id: row.get(0)?,
                user_id: row.get(1)?,
                shared_post_id: row.get(2)?,
                caption: row.get(3)?,
                created_at: time_column(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(shares)
}

/// Assembles the full view of a post. The original of a shared post is
/// expanded one level only.
fn hydrate(conn: &Connection, row: PostRow, expand_original: bool) -> rusqlite::Result<PostView> {
    let original_post = match (&row.original_post_id, expand_original) {
        (Some(original_id), true) => load_row(conn, original_id)?
            .map(|original| hydrate(conn, original, false))
            .transpose()?
            .map(Box::new),
        _ => None,
    };

    Ok(PostView {
        likes: likes_of(conn, LikeTarget::Post, &row.id)?,
        comments: comments_of(conn, &row.id)?,
        shares: shares_of(conn, &row.id)?,
        id: row.id,
        author: row.author,
        content: row.content,
        image: row.image,
        is_shared: row.is_shared,
        original_post,
        share_caption: row.share_caption,
        created_at: row.created_at,
    })
}

fn load_row(conn: &Connection, id: &str) -> rusqlite::Result<Option<PostRow>> {
    conn.query_row(
        &format!("{} WHERE p.id = ?1", POST_SELECT),
        params![id],
        post_from_row,
    )
    .optional()
}

fn post_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn find_post(conn: &Connection, id: &str) -> AppResult<Option<PostView>> {
    let post = load_row(conn, id)?
        .map(|row| hydrate(conn, row, true))
        .transpose()?;
    Ok(post)
}

pub fn create_post(
    conn: &Connection,
    author_id: &str,
    content: Option<&str>,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<PostView> {
    let id = new_id();
    conn.execute(
        "INSERT INTO posts (id, author_id, content, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, author_id, content, image, to_db_time(&now)],
    )?;
    find_post(conn, &id)?.ok_or_else(|| AppError::Internal("post vanished after insert".into()))
}

/// Publishes a reshare of `original_id` by `user_id` and records the share
/// on the original. Returns the new post and the original's share count.
pub fn share_post(
    conn: &mut Connection,
    original_id: &str,
    user_id: &str,
    caption: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<(PostView, usize)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !post_exists(&tx, original_id)? {
        return Err(AppError::not_found("Post"));
    }

    let id = new_id();
    let ts = to_db_time(&now);
    tx.execute(
        "INSERT INTO posts (id, author_id, is_shared, original_post_id, share_caption, created_at)
         VALUES (?1, ?2, 1, ?3, ?4, ?5)",
        params![id, user_id, original_id, caption, ts],
    )?;
    tx.execute(
        "INSERT INTO post_shares (id, post_id, user_id, shared_post_id, caption, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![new_id(), original_id, user_id, id, caption, ts],
    )?;
    let shares: i64 = tx.query_row(
        "SELECT COUNT(*) FROM post_shares WHERE post_id = ?1",
        params![original_id],
        |row| row.get(0),
    )?;
    tx.commit()?;

    let post = find_post(conn, &id)?
        .ok_or_else(|| AppError::Internal("shared post vanished after insert".into()))?;
    Ok((post, shares as usize))
}

/// Author id and image of a post, for authorization and cleanup.
pub fn post_owner(conn: &Connection, id: &str) -> AppResult<Option<(String, Option<String>)>> {
    let owner = conn
        .query_row(
            "SELECT author_id, image FROM posts WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(owner)
}

/// Deletes a post; comments, replies, likes and share records cascade.
pub fn delete_post(conn: &Connection, id: &str) -> AppResult<bool> {
    let removed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

fn list_where(
    conn: &Connection,
    filter: &str,
    tail: &str,
    args: &[&dyn rusqlite::ToSql],
) -> AppResult<Vec<PostView>> {
    let mut stmt = conn.prepare(&format!(
        "{} {} ORDER BY p.created_at DESC, p.rowid DESC {}",
        POST_SELECT, filter, tail
    ))?;
    let rows = stmt
        .query_map(args, post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let posts = rows
        .into_iter()
        .map(|row| hydrate(conn, row, true))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn list_posts(conn: &Connection) -> AppResult<Vec<PostView>> {
    list_where(conn, "", "", &[])
}

pub fn list_feed(conn: &Connection, page: Page) -> AppResult<Vec<PostView>> {
    list_where(conn, "", "LIMIT ?1 OFFSET ?2", &[&page.limit, &page.offset])
}

pub fn list_user_posts(conn: &Connection, user_id: &str) -> AppResult<Vec<PostView>> {
    list_where(conn, "WHERE p.author_id = ?1", "", &[&user_id])
}

pub fn toggle_post_like(
    conn: &mut Connection,
    post_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<LikeToggle> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !post_exists(&tx, post_id)? {
        return Err(AppError::not_found("Post"));
    }
    let toggle = toggle_like(&tx, LikeTarget::Post, post_id, user_id, now)?;
    tx.commit()?;
    Ok(toggle)
}

fn comment_in_post(conn: &Connection, post_id: &str, comment_id: &str) -> AppResult<()> {
    if !post_exists(conn, post_id)? {
        return Err(AppError::not_found("Post"));
    }
    let found: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM comments WHERE id = ?1 AND post_id = ?2",
        params![comment_id, post_id],
        |row| row.get(0),
    )?;
    if !found {
        return Err(AppError::not_found("Comment"));
    }
    Ok(())
}

/// Appends a comment and returns it with the post's new comment count.
pub fn add_comment(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    content: &str,
    now: DateTime<Utc>,
) -> AppResult<(CommentView, usize)> {
    if !post_exists(conn, post_id)? {
        return Err(AppError::not_found("Post"));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, user_id, content, to_db_time(&now)],
    )?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;

    let user = crate::db::users::summary(conn, user_id)?;
    let comment = hydrate_comment(conn, user, id, content.to_string(), now)?;
    Ok((comment, count as usize))
}

pub fn add_reply(
    conn: &Connection,
    post_id: &str,
    comment_id: &str,
    user_id: &str,
    content: &str,
    now: DateTime<Utc>,
) -> AppResult<ReplyView> {
    comment_in_post(conn, post_id, comment_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO replies (id, comment_id, user_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, comment_id, user_id, content, to_db_time(&now)],
    )?;

    Ok(ReplyView {
        user: crate::db::users::summary(conn, user_id)?,
        likes: Vec::new(),
        id,
        content: content.to_string(),
        created_at: now,
    })
}

pub fn toggle_comment_like(
    conn: &mut Connection,
    post_id: &str,
    comment_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<LikeToggle> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    comment_in_post(&tx, post_id, comment_id)?;
    let toggle = toggle_like(&tx, LikeTarget::Comment, comment_id, user_id, now)?;
    tx.commit()?;
    Ok(toggle)
}

pub fn toggle_reply_like(
    conn: &mut Connection,
    post_id: &str,
    comment_id: &str,
    reply_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<LikeToggle> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    comment_in_post(&tx, post_id, comment_id)?;
    let found: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM replies WHERE id = ?1 AND comment_id = ?2",
        params![reply_id, comment_id],
        |row| row.get(0),
    )?;
    if !found {
        return Err(AppError::not_found("Reply"));
    }
    let toggle = toggle_like(&tx, LikeTarget::Reply, reply_id, user_id, now)?;
    tx.commit()?;
    Ok(toggle)
}
