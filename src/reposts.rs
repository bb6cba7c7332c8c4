use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};

use crate::db::models::InteractionRow;
use crate::db::{format_timestamp, timestamp};
use crate::error::AppResult;
use crate::posts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepostOutcome {
    pub created: bool,
    pub repost_id: i64,
    pub reposts_count: i64,
}

/// Create `author`'s repost of `original`, or return the existing one.
/// `caption` only applies when the repost is created. The partial unique
/// index on `posts(author_id, repost_of)` keeps it to one per pair.
pub fn repost(
    conn: &mut Connection,
    original: i64,
    author: i64,
    caption: &str,
    at: DateTime<Utc>,
) -> AppResult<RepostOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    posts::ensure_exists(&tx, original)?;

    let inserted = tx.execute(
        "INSERT INTO posts (author_id, text, created_at, repost_of) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT DO NOTHING",
        params![author, caption.trim(), format_timestamp(at), original],
    )?;
    let repost_id: i64 = tx.query_row(
        "SELECT id FROM posts WHERE author_id = ?1 AND repost_of = ?2",
        params![author, original],
        |row| row.get(0),
    )?;
    let reposts_count = count(&tx, original)?;
    tx.commit()?;

    let created = inserted > 0;
    tracing::info!(original, author, repost_id, created, "Repost applied");
    Ok(RepostOutcome {
        created,
        repost_id,
        reposts_count,
    })
}

pub fn count(conn: &Connection, original: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE repost_of = ?1",
        params![original],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Authors who reposted `original`, most recent first.
pub fn reposters(conn: &Connection, original: i64) -> AppResult<Vec<InteractionRow>> {
    posts::ensure_exists(conn, original)?;

    let mut stmt = conn.prepare(
        "SELECT author_id, created_at FROM posts WHERE repost_of = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![original], |row| {
            Ok(InteractionRow {
                user_id: row.get(0)?,
                created_at: timestamp(row, 1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
