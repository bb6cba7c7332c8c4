use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};

use crate::db::models::PostRow;
use crate::db::{format_timestamp, placeholders};
use crate::error::{AppError, AppResult, OptionalRow};

#[derive(Debug, Default, Clone)]
pub struct NewPost {
    pub text: String,
    pub image: Option<String>,
    pub video: Option<String>,
}

/// Partial update. `Some(None)` clears a media field.
#[derive(Debug, Default, Clone)]
pub struct PostChanges {
    pub text: Option<String>,
    pub image: Option<Option<String>>,
    pub video: Option<Option<String>>,
}

pub fn ensure_exists(conn: &Connection, post_id: i64) -> AppResult<()> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
        params![post_id],
        |row| row.get(0),
    )?;
    if found {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

pub fn get(conn: &Connection, post_id: i64) -> AppResult<PostRow> {
    conn.query_row(
        &format!("SELECT {} FROM posts p WHERE p.id = ?1", PostRow::COLUMNS),
        params![post_id],
        PostRow::from_row,
    )
    .or_not_found()
}

/// Fetch several posts by id. Missing ids are skipped; order is unspecified.
pub fn get_many(conn: &Connection, ids: &[i64]) -> AppResult<Vec<PostRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts p WHERE p.id IN ({})",
        PostRow::COLUMNS,
        placeholders(ids.len())
    ))?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), PostRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create(
    conn: &Connection,
    author_id: i64,
    post: NewPost,
    at: DateTime<Utc>,
) -> AppResult<PostRow> {
    conn.execute(
        "INSERT INTO posts (author_id, text, image, video, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            author_id,
            post.text,
            post.image,
            post.video,
            format_timestamp(at)
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(post_id = id, author_id, "Post created");

    Ok(PostRow {
        id,
        author_id,
        text: post.text,
        image: post.image,
        video: post.video,
        created_at: at,
        repost_of: None,
    })
}

/// Author-only partial update. Returns the new row and any media paths it replaced.
pub fn update(
    conn: &Connection,
    post_id: i64,
    user_id: i64,
    changes: PostChanges,
) -> AppResult<(PostRow, Vec<String>)> {
    let mut post = get(conn, post_id)?;
    if post.author_id != user_id {
        return Err(AppError::Forbidden);
    }

    let mut replaced = Vec::new();
    if let Some(text) = changes.text {
        post.text = text;
    }
    if let Some(image) = changes.image {
        replaced.extend(std::mem::replace(&mut post.image, image));
    }
    if let Some(video) = changes.video {
        replaced.extend(std::mem::replace(&mut post.video, video));
    }

    conn.execute(
        "UPDATE posts SET text = ?2, image = ?3, video = ?4 WHERE id = ?1",
        params![post.id, post.text, post.image, post.video],
    )?;
    tracing::info!(post_id, user_id, "Post updated");

    Ok((post, replaced))
}

/// Author-only delete. Stars, saves, shares, comments and reposts-of-it go
/// with the post through the foreign-key cascades, inside one transaction.
pub fn delete(conn: &mut Connection, post_id: i64, user_id: i64) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let author_id: i64 = tx
        .query_row(
            "SELECT author_id FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .or_not_found()?;
    if author_id != user_id {
        return Err(AppError::Forbidden);
    }

    tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    tx.commit()?;

    tracing::info!(post_id, user_id, "Post deleted");
    Ok(())
}
