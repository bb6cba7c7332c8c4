use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::aggregation::{self, Aggregates, Counts, Projection};
use crate::db::models::PostRow;
use crate::error::{AppError, AppResult};
use crate::identity::{expect_preview, resolve_previews, PreviewMap, UserPreview};
use crate::media::AssetStore;
use crate::posts;

/// Snapshot of the post a repost points at. Deliberately flat: no
/// aggregates and no further `repost_of`.
#[derive(Debug, Clone, Serialize)]
pub struct RepostEmbed {
    pub id: i64,
    pub author: UserPreview,
    pub content: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i64,
    pub author: UserPreview,
    pub content: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
    pub repost_of: Option<RepostEmbed>,

    pub reposts_count: i64,
    pub has_reposted: bool,
    pub repost_sample: Vec<UserPreview>,
    pub first_reposter: Option<UserPreview>,

    pub stars_count: i64,
    pub has_starred: bool,
    pub stars_sample: Vec<UserPreview>,
    pub first_starrer: Option<UserPreview>,

    pub comments_count: i64,

    pub whatsapp_count: i64,
    pub has_shared_whatsapp: bool,
    pub whatsapp_sample: Vec<UserPreview>,
    pub first_whatsapper: Option<UserPreview>,

    pub saves_count: i64,
    pub has_saved: bool,
    pub saves_sample: Vec<UserPreview>,
    pub first_saver: Option<UserPreview>,
}

/// Assemble `posts` for `viewer`, preserving input order.
pub fn assemble(
    conn: &Connection,
    assets: &dyn AssetStore,
    posts: &[PostRow],
    viewer: Option<i64>,
) -> AppResult<Vec<PostView>> {
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let aggregates = aggregation::aggregate(conn, &ids, viewer, None)?;
    assemble_with(conn, assets, posts, &aggregates)
}

/// Assemble with projections the caller already computed. Posts missing from
/// `aggregates` render with empty projections.
pub fn assemble_with(
    conn: &Connection,
    assets: &dyn AssetStore,
    posts: &[PostRow],
    aggregates: &HashMap<i64, Aggregates>,
) -> AppResult<Vec<PostView>> {
    let original_ids: Vec<i64> = posts.iter().filter_map(|p| p.repost_of).collect();
    let originals: HashMap<i64, PostRow> = posts::get_many(conn, &original_ids)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut users: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
    users.extend(originals.values().map(|p| p.author_id));
    for agg in aggregates.values() {
        users.extend(agg.referenced_users());
    }
    let previews = resolve_previews(conn, assets, users)?;

    let empty = Aggregates::default();
    posts
        .iter()
        .map(|post| {
            let embed = post
                .repost_of
                .and_then(|id| originals.get(&id))
                .map(|original| snapshot(original, &previews, assets))
                .transpose()?;
            let agg = aggregates.get(&post.id).unwrap_or(&empty);
            render(post, embed, agg, &previews, assets)
        })
        .collect()
}

/// Single-post path. `known` seeds the counts, e.g. zeros for a post that
/// was just created.
pub fn assemble_one(
    conn: &Connection,
    assets: &dyn AssetStore,
    post: &PostRow,
    viewer: Option<i64>,
    known: Option<Counts>,
) -> AppResult<PostView> {
    let known = known.map(|counts| HashMap::from([(post.id, counts)]));
    let aggregates = aggregation::aggregate(conn, &[post.id], viewer, known.as_ref())?;
    assemble_with(conn, assets, std::slice::from_ref(post), &aggregates)?
        .pop()
        .ok_or_else(|| AppError::Internal(format!("Post {} did not assemble", post.id)))
}

fn snapshot(original: &PostRow, previews: &PreviewMap, assets: &dyn AssetStore) -> AppResult<RepostEmbed> {
    Ok(RepostEmbed {
        id: original.id,
        author: expect_preview(previews, original.author_id)?,
        content: original.text.clone(),
        image: assets.resolve(original.image.as_deref()),
        video: assets.resolve(original.video.as_deref()),
        created_at: original.created_at,
    })
}

fn users(projection: &Projection<i64>, previews: &PreviewMap) -> AppResult<Projection<UserPreview>> {
    projection.try_map(|id| expect_preview(previews, *id))
}

fn render(
    post: &PostRow,
    repost_of: Option<RepostEmbed>,
    agg: &Aggregates,
    previews: &PreviewMap,
    assets: &dyn AssetStore,
) -> AppResult<PostView> {
    let reposts = users(&agg.reposts, previews)?;
    let stars = users(&agg.stars, previews)?;
    let shares = users(&agg.shares, previews)?;
    let saves = users(&agg.saves, previews)?;

    Ok(PostView {
        id: post.id,
        author: expect_preview(previews, post.author_id)?,
        content: post.text.clone(),
        image: assets.resolve(post.image.as_deref()),
        video: assets.resolve(post.video.as_deref()),
        created_at: post.created_at,
        repost_of,

        reposts_count: reposts.count,
        has_reposted: reposts.has,
        repost_sample: reposts.sample,
        first_reposter: reposts.first,

        stars_count: stars.count,
        has_starred: stars.has,
        stars_sample: stars.sample,
        first_starrer: stars.first,

        comments_count: agg.comments.count,

        whatsapp_count: shares.count,
        has_shared_whatsapp: shares.has,
        whatsapp_sample: shares.sample,
        first_whatsapper: shares.first,

        saves_count: saves.count,
        has_saved: saves.has,
        saves_sample: saves.sample,
        first_saver: saves.first,
    })
}
