use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};

use crate::db::models::InteractionRow;
use crate::db::{format_timestamp, timestamp};
use crate::error::AppResult;
use crate::posts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    /// Repeating the action alternates presence and absence.
    Toggle,
    /// Repeating the action after the first success has no effect.
    InsertOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Star,
    Save,
    Share,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [Self::Star, Self::Save, Self::Share];

    pub fn table(self) -> &'static str {
        match self {
            Self::Star => "post_stars",
            Self::Save => "post_saves",
            Self::Share => "post_whatsapp_shares",
        }
    }

    pub fn semantics(self) -> Semantics {
        match self {
            Self::Star | Self::Save => Semantics::Toggle,
            Self::Share => Semantics::InsertOnce,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Save => "save",
            Self::Share => "share",
        }
    }
}

/// Result of applying an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// This call inserted the row.
    pub created: bool,
    /// The row exists after the call.
    pub active: bool,
    /// Live row count for the post after the call.
    pub count: i64,
}

/// Apply `kind` for (`post_id`, `user_id`) according to its [`Semantics`].
///
/// Uniqueness is left to the store: inserts use `ON CONFLICT DO NOTHING`, so a
/// concurrent duplicate reads as "already present", never as an error.
pub fn apply(
    conn: &mut Connection,
    kind: InteractionKind,
    post_id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> AppResult<Applied> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    posts::ensure_exists(&tx, post_id)?;

    let table = kind.table();
    let insert = format!(
        "INSERT INTO {table} (post_id, user_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT DO NOTHING"
    );
    let stamp = format_timestamp(at);

    let (created, active) = match kind.semantics() {
        Semantics::Toggle => {
            let removed = tx.execute(
                &format!("DELETE FROM {table} WHERE post_id = ?1 AND user_id = ?2"),
                params![post_id, user_id],
            )?;
            if removed > 0 {
                (false, false)
            } else {
                let inserted = tx.execute(&insert, params![post_id, user_id, stamp])?;
                (inserted > 0, true)
            }
        }
        Semantics::InsertOnce => {
            let inserted = tx.execute(&insert, params![post_id, user_id, stamp])?;
            (inserted > 0, true)
        }
    };

    let count = count(&tx, kind, post_id)?;
    tx.commit()?;

    tracing::info!(
        kind = kind.as_str(),
        post_id,
        user_id,
        created,
        active,
        "Interaction applied"
    );
    Ok(Applied {
        created,
        active,
        count,
    })
}

pub fn count(conn: &Connection, kind: InteractionKind, post_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE post_id = ?1", kind.table()),
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Everyone who performed `kind` on the post, most recent first.
pub fn list(conn: &Connection, kind: InteractionKind, post_id: i64) -> AppResult<Vec<InteractionRow>> {
    posts::ensure_exists(conn, post_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT user_id, created_at FROM {} WHERE post_id = ?1
         ORDER BY created_at DESC, id DESC",
        kind.table()
    ))?;
    let rows = stmt
        .query_map(params![post_id], |row| {
            Ok(InteractionRow {
                user_id: row.get(0)?,
                created_at: timestamp(row, 1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
