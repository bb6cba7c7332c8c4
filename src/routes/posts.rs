use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;

use crate::aggregation::Counts;
use crate::assembler::{self, PostView};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, Payload};
use crate::feed::{self, Page, PageOf, PaginationParams, Selection};
use crate::posts::{self, NewPost, PostChanges};
use crate::routes::{discard, media_changes, store_all, stored_paths, ApiRoutes};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .api("/posts", get(list_own).post(create))
        .api("/posts/{id}", patch(update).delete(remove))
        .api("/feed", get(global_feed))
        .api("/saved", get(saved))
}

fn collection(
    state: &AppState,
    selection: Selection,
    params: &PaginationParams,
    viewer: i64,
) -> AppResult<Json<PageOf<PostView>>> {
    let page = Page::from_params(params, &state.config.feed);
    let conn = state.db.get()?;
    let rows = feed::select(&conn, selection, page)?;
    let views = assembler::assemble(&conn, state.assets.as_ref(), &rows.results, Some(viewer))?;
    Ok(Json(rows.with_results(views)))
}

async fn list_own(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PageOf<PostView>>> {
    collection(&state, Selection::Own(user.id), &params, user.id)
}

async fn global_feed(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PageOf<PostView>>> {
    collection(&state, Selection::Global, &params, user.id)
}

async fn saved(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PageOf<PostView>>> {
    collection(&state, Selection::SavedBy(user.id), &params, user.id)
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    mut payload: Payload,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let files = [payload.take_file("image"), payload.take_file("video")];
    let [image, video] = store_all(&state, user.id, files).await?;
    let uploaded: Vec<String> = image.iter().chain(video.iter()).cloned().collect();

    let post = NewPost {
        text: payload.text("content").unwrap_or_default().trim().to_string(),
        image,
        video,
    };
    let result = (|| -> AppResult<_> {
        let conn = state.db.get()?;
        let row = posts::create(&conn, user.id, post, Utc::now())?;
        assembler::assemble_one(
            &conn,
            state.assets.as_ref(),
            &row,
            Some(user.id),
            Some(Counts::default()),
        )
    })();

    match result {
        Ok(view) => Ok((StatusCode::CREATED, Json(view))),
        Err(e) => {
            discard(&state, uploaded).await;
            Err(e)
        }
    }
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    mut payload: Payload,
) -> AppResult<Json<PostView>> {
    let changes = media_changes(&state, user.id, &mut payload, ["image", "video"]).await?;
    let uploaded = stored_paths(&changes);
    let [image, video] = changes;

    let changes = PostChanges {
        text: payload.text("content").map(|t| t.trim().to_string()),
        image,
        video,
    };
    let result = (|| -> AppResult<_> {
        let conn = state.db.get()?;
        let (row, replaced) = posts::update(&conn, id, user.id, changes)?;
        let view = assembler::assemble_one(&conn, state.assets.as_ref(), &row, Some(user.id), None)?;
        Ok((view, replaced))
    })();

    match result {
        Ok((view, replaced)) => {
            discard(&state, replaced).await;
            Ok(Json(view))
        }
        Err(e) => {
            discard(&state, uploaded).await;
            Err(e)
        }
    }
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let mut conn = state.db.get()?;
    posts::delete(&mut conn, id, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}
