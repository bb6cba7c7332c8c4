use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::db::timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub id: i64,
    pub author_id: i64,
    pub text: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
    pub repost_of: Option<i64>,
}

impl PostRow {
    /// Column list matching `from_row`, qualified with the table alias `p`.
    pub const COLUMNS: &'static str =
        "p.id, p.author_id, p.text, p.image, p.video, p.created_at, p.repost_of";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author_id: row.get(1)?,
            text: row.get(2)?,
            image: row.get(3)?,
            video: row.get(4)?,
            created_at: timestamp(row, 5)?,
            repost_of: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub const COLUMNS: &'static str = "id, post_id, user_id, parent_id, text, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            user_id: row.get(2)?,
            parent_id: row.get(3)?,
            text: row.get(4)?,
            created_at: timestamp(row, 5)?,
        })
    }
}

/// One (post, user) interaction row as listed to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRow {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverSlide {
    pub id: i64,
    pub user_id: i64,
    pub index: u8,
    pub image: Option<String>,
    pub caption: String,
    pub bibliography: String,
    pub text_color: String,
    pub text_font: String,
    pub text_x: Option<f64>,
    pub text_y: Option<f64>,
    pub text_size: Option<f64>,
    pub effect: String,
    pub updated_at: DateTime<Utc>,
}

impl CoverSlide {
    pub const COLUMNS: &'static str = "id, user_id, idx, image, caption, bibliography, \
         text_color, text_font, text_x, text_y, text_size, effect, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            index: row.get(2)?,
            image: row.get(3)?,
            caption: row.get(4)?,
            bibliography: row.get(5)?,
            text_color: row.get(6)?,
            text_font: row.get(7)?,
            text_x: row.get(8)?,
            text_y: row.get(9)?,
            text_size: row.get(10)?,
            effect: row.get(11)?,
            updated_at: timestamp(row, 12)?,
        })
    }
}
