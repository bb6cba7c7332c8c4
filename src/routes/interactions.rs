use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::assembler;
use crate::db::models::InteractionRow;
use crate::error::AppResult;
use crate::extractors::{CurrentUser, Payload};
use crate::identity::{expect_preview, resolve_previews, UserPreview};
use crate::interactions::{self, InteractionKind};
use crate::posts;
use crate::reposts;
use crate::routes::ApiRoutes;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .api("/posts/{id}/star", post(star))
        .api("/posts/{id}/starrers", get(starrers))
        .api("/posts/{id}/save", post(save))
        .api("/posts/{id}/savers", get(savers))
        .api("/posts/{id}/whatsapp", post(whatsapp))
        .api("/posts/{id}/whatsappers", get(whatsappers))
        .api("/posts/{id}/repost", post(repost))
        .api("/posts/{id}/reposters", get(reposters))
}

#[derive(Debug, Serialize)]
pub struct ListedUser {
    #[serde(flatten)]
    pub user: UserPreview,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Listing {
    pub count: usize,
    pub results: Vec<ListedUser>,
}

fn listing(state: &AppState, rows: Vec<InteractionRow>) -> AppResult<Json<Listing>> {
    let conn = state.db.get()?;
    let previews = resolve_previews(&conn, state.assets.as_ref(), rows.iter().map(|r| r.user_id))?;
    let results = rows
        .into_iter()
        .map(|row| {
            Ok(ListedUser {
                user: expect_preview(&previews, row.user_id)?,
                created_at: row.created_at,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(Listing {
        count: results.len(),
        results,
    }))
}

fn list_kind(state: &AppState, kind: InteractionKind, post_id: i64) -> AppResult<Json<Listing>> {
    let rows = {
        let conn = state.db.get()?;
        interactions::list(&conn, kind, post_id)?
    };
    listing(state, rows)
}

async fn star(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let applied = interactions::apply(&mut conn, InteractionKind::Star, id, user.id, Utc::now())?;
    Ok(Json(json!({
        "has_starred": applied.active,
        "stars_count": applied.count,
    })))
}

async fn save(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let applied = interactions::apply(&mut conn, InteractionKind::Save, id, user.id, Utc::now())?;
    Ok(Json(json!({
        "has_saved": applied.active,
        "saves_count": applied.count,
    })))
}

async fn whatsapp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let applied = interactions::apply(&mut conn, InteractionKind::Share, id, user.id, Utc::now())?;
    Ok(Json(json!({
        "created": applied.created,
        "has_shared_whatsapp": true,
        "whatsapp_count": applied.count,
    })))
}

async fn repost(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    payload: Payload,
) -> AppResult<(StatusCode, Json<Value>)> {
    let caption = payload.text("text").unwrap_or_default();
    let mut conn = state.db.get()?;
    let outcome = reposts::repost(&mut conn, id, user.id, caption, Utc::now())?;

    let row = posts::get(&conn, outcome.repost_id)?;
    let view = assembler::assemble_one(&conn, state.assets.as_ref(), &row, Some(user.id), None)?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({
            "created": outcome.created,
            "has_reposted": true,
            "reposts_count": outcome.reposts_count,
            "repost": view,
        })),
    ))
}

async fn starrers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    list_kind(&state, InteractionKind::Star, id)
}

async fn savers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    list_kind(&state, InteractionKind::Save, id)
}

async fn whatsappers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    list_kind(&state, InteractionKind::Share, id)
}

async fn reposters(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    let rows = {
        let conn = state.db.get()?;
        reposts::reposters(&conn, id)?
    };
    listing(&state, rows)
}
