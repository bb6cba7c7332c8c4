use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::cover_slides::{self, CoverSlideView, SlidesUpdate, SlidesView, SlotInput, SLOTS};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, Payload};
use crate::routes::{discard, store_all, ApiRoutes};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().api("/cover-slides", get(list).post(replace))
}

async fn list(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<SlidesView>> {
    let conn = state.db.get()?;
    let slides = cover_slides::list(&conn, user.id)?;
    let (caption, bibliography) = slides
        .first()
        .map(|s| (s.caption.clone(), s.bibliography.clone()))
        .unwrap_or_default();

    Ok(Json(SlidesView {
        results: slides
            .into_iter()
            .map(|s| CoverSlideView::new(s, state.assets.as_ref()))
            .collect(),
        caption,
        bibliography,
    }))
}

async fn replace(
    State(state): State<AppState>,
    user: CurrentUser,
    mut payload: Payload,
) -> AppResult<Json<SlidesView>> {
    let mut update = SlidesUpdate {
        caption: payload.text("caption").unwrap_or_default().trim().to_string(),
        bibliography: payload.text("bibliography").unwrap_or_default().trim().to_string(),
        ..SlidesUpdate::default()
    };
    let files: [_; SLOTS] = std::array::from_fn(|index| payload.take_file(&format!("slide{index}")));
    let stored = store_all(&state, user.id, files).await?;
    let uploaded: Vec<String> = stored.iter().flatten().cloned().collect();
    for (index, image) in stored.into_iter().enumerate() {
        update.slots[index] = SlotInput {
            image,
            ..SlotInput::from_fields(&payload.fields, index)
        };
    }
    let caption = update.caption.clone();
    let bibliography = update.bibliography.clone();

    let result = (|| -> AppResult<_> {
        let mut conn = state.db.get()?;
        cover_slides::replace(&mut conn, user.id, update, Utc::now())
    })();

    match result {
        Ok((slides, removed)) => {
            discard(&state, removed).await;
            Ok(Json(SlidesView {
                results: slides
                    .into_iter()
                    .map(|s| CoverSlideView::new(s, state.assets.as_ref()))
                    .collect(),
                caption,
                bibliography,
            }))
        }
        Err(e) => {
            discard(&state, uploaded).await;
            Err(e)
        }
    }
}
