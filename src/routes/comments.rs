use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::comments::{self, CommentTree, CommentView};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Payload};
use crate::identity::resolve_previews;
use crate::routes::ApiRoutes;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .api("/posts/{id}/comments", get(list).post(create))
        .api("/comments/{id}", delete(remove))
}

async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(post_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let tree = comments::fetch_tree(&conn, post_id)?;

    let mut authors = Vec::new();
    for node in &tree {
        node.authors(&mut authors);
    }
    let previews = resolve_previews(&conn, state.assets.as_ref(), authors)?;
    let count = comments::count(&conn, post_id)?;

    Ok(Json(json!({
        "count": count,
        "results": comments::render(&tree, &previews)?,
    })))
}

/// Blank and missing `parent` both mean a root comment.
fn parse_parent(raw: Option<&str>) -> AppResult<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation("Invalid parent.".into())),
    }
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    payload: Payload,
) -> AppResult<(StatusCode, Json<Value>)> {
    let parent = parse_parent(payload.text("parent"))?;
    let text = payload.text("text").unwrap_or_default();

    let mut conn = state.db.get()?;
    let comment = comments::append(&mut conn, post_id, user.id, text, parent, Utc::now())?;
    let previews = resolve_previews(&conn, state.assets.as_ref(), [user.id])?;
    let created: Vec<CommentView> = comments::render(
        &[CommentTree {
            comment,
            replies: Vec::new(),
        }],
        &previews,
    )?;
    let count = comments::count(&conn, post_id)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "created": created.first(),
            "count": count,
        })),
    ))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let count = comments::delete(&conn, comment_id, user.id)?;
    Ok(Json(json!({ "count": count })))
}
