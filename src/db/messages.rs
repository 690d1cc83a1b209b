use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::models::Message;
use crate::db::{new_id, time_column, to_db_time};
use crate::error::AppResult;

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

pub fn send_message(
    conn: &Connection,
    sender_id: &str,
    receiver_id: &str,
    text: Option<&str>,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Message> {
    let message = Message {
        id: new_id(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        text: text.map(str::to_string),
        image: image.map(str::to_string),
        created_at: now.trunc_subsecs(3),
    };
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id,
            message.sender_id,
            message.receiver_id,
            message.text,
            message.image,
            to_db_time(&message.created_at)
        ],
    )?;
    Ok(message)
}

/// Both directions of the exchange between `a` and `b`, oldest first.
pub fn conversation(conn: &Connection, a: &str, b: &str) -> AppResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, text, image, created_at
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let messages = stmt
        .query_map(params![a, b], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}
