use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::{CurrentUser, Payload};
use crate::identity::{self, ProfileChanges, ProfileView};
use crate::routes::{discard, media_changes, stored_paths, ApiRoutes};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().api("", get(show).put(update).post(update))
}

async fn show(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<ProfileView>> {
    let conn = state.db.get()?;
    let profile = identity::get_or_create_profile(&conn, user.id)?;
    Ok(Json(ProfileView::new(profile, state.assets.as_ref())))
}

/// Partial update; PUT and POST behave the same.
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    mut payload: Payload,
) -> AppResult<Json<ProfileView>> {
    let changes = media_changes(&state, user.id, &mut payload, ["avatar", "cover"]).await?;
    let uploaded = stored_paths(&changes);
    let [avatar, cover] = changes;

    let changes = ProfileChanges {
        display_name: payload.text("display_name").map(str::to_string),
        bio: payload.text("bio").map(str::to_string),
        avatar,
        cover,
    };
    let result = (|| -> AppResult<_> {
        let conn = state.db.get()?;
        identity::update_profile(&conn, user.id, changes)
    })();

    match result {
        Ok((profile, replaced)) => {
            discard(&state, replaced).await;
            Ok(Json(ProfileView::new(profile, state.assets.as_ref())))
        }
        Err(e) => {
            discard(&state, uploaded).await;
            Err(e)
        }
    }
}
