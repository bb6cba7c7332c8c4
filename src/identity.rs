use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::models::Profile;
use crate::db::{format_timestamp, placeholders, timestamp};
use crate::error::{AppError, AppResult};
use crate::media::AssetStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPreview {
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

pub type PreviewMap = HashMap<i64, UserPreview>;

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileView {
    pub fn new(profile: Profile, assets: &dyn AssetStore) -> Self {
        Self {
            id: profile.user_id,
            avatar: assets.resolve(profile.avatar.as_deref()),
            cover: assets.resolve(profile.cover.as_deref()),
            username: profile.username,
            email: profile.email,
            display_name: profile.display_name,
            bio: profile.bio,
            updated_at: profile.updated_at,
        }
    }
}

/// Partial profile update. `Some(None)` on an image clears it.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<Option<String>>,
    pub cover: Option<Option<String>>,
}

/// Insert the default profile if the user has none, then read it.
pub fn get_or_create_profile(conn: &Connection, user_id: i64) -> AppResult<Profile> {
    conn.execute(
        "INSERT INTO profiles (user_id, updated_at)
         SELECT id, ?2 FROM users WHERE id = ?1
         ON CONFLICT(user_id) DO NOTHING",
        params![user_id, format_timestamp(Utc::now())],
    )?;

    conn.query_row(
        "SELECT p.user_id, u.username, u.email, p.display_name, p.bio, p.avatar, p.cover, p.updated_at
         FROM profiles p JOIN users u ON u.id = p.user_id
         WHERE p.user_id = ?1",
        params![user_id],
        |row| {
            Ok(Profile {
                user_id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                display_name: row.get(3)?,
                bio: row.get(4)?,
                avatar: row.get(5)?,
                cover: row.get(6)?,
                updated_at: timestamp(row, 7)?,
            })
        },
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Apply `changes` and return the updated profile plus any image paths it replaced.
pub fn update_profile(
    conn: &Connection,
    user_id: i64,
    changes: ProfileChanges,
) -> AppResult<(Profile, Vec<String>)> {
    let mut profile = get_or_create_profile(conn, user_id)?;
    let mut replaced = Vec::new();

    if let Some(name) = changes.display_name {
        profile.display_name = name.trim().to_string();
    }
    if let Some(bio) = changes.bio {
        profile.bio = bio;
    }
    if let Some(avatar) = changes.avatar {
        replaced.extend(std::mem::replace(&mut profile.avatar, avatar));
    }
    if let Some(cover) = changes.cover {
        replaced.extend(std::mem::replace(&mut profile.cover, cover));
    }
    profile.updated_at = Utc::now();

    conn.execute(
        "UPDATE profiles SET display_name = ?2, bio = ?3, avatar = ?4, cover = ?5, updated_at = ?6
         WHERE user_id = ?1",
        params![
            user_id,
            profile.display_name,
            profile.bio,
            profile.avatar,
            profile.cover,
            format_timestamp(profile.updated_at)
        ],
    )?;

    tracing::info!(user_id, "Profile updated");
    Ok((profile, replaced))
}

/// Previews for a set of users in two statements regardless of how many ids.
/// Unknown ids are simply absent from the map.
pub fn resolve_previews(
    conn: &Connection,
    assets: &dyn AssetStore,
    user_ids: impl IntoIterator<Item = i64>,
) -> AppResult<PreviewMap> {
    let ids: Vec<i64> = user_ids
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(PreviewMap::new());
    }
    let marks = placeholders(ids.len());

    let now = format_timestamp(Utc::now());
    let mut insert_values: Vec<rusqlite::types::Value> = vec![now.into()];
    insert_values.extend(ids.iter().map(|id| (*id).into()));
    conn.execute(
        &format!(
            "INSERT INTO profiles (user_id, updated_at)
             SELECT id, ? FROM users WHERE id IN ({marks})
             ON CONFLICT(user_id) DO NOTHING"
        ),
        params_from_iter(insert_values),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.username, p.display_name, p.avatar
         FROM users u JOIN profiles p ON p.user_id = u.id
         WHERE u.id IN ({marks})"
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut previews = PreviewMap::with_capacity(ids.len());
    for row in rows {
        let (id, username, display_name, avatar) = row?;
        previews.insert(id, preview(username, display_name, avatar.as_deref(), assets));
    }
    Ok(previews)
}

fn preview(
    username: String,
    display_name: String,
    avatar: Option<&str>,
    assets: &dyn AssetStore,
) -> UserPreview {
    let display_name = if display_name.trim().is_empty() {
        username.clone()
    } else {
        display_name
    };
    UserPreview {
        username,
        display_name,
        avatar: assets.resolve(avatar),
    }
}

/// Look up a preview that must exist, e.g. for a row's own author.
pub fn expect_preview(previews: &PreviewMap, user_id: i64) -> AppResult<UserPreview> {
    previews
        .get(&user_id)
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("No preview resolved for user {user_id}")))
}
