pub mod comments;
pub mod cover_slides;
pub mod interactions;
pub mod media;
pub mod posts;
pub mod profile;

use axum::routing::MethodRouter;
use axum::Router;

use crate::error::AppResult;
use crate::extractors::{Payload, UploadedFile};
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/finca";

/// Every JSON endpoint, mounted under [`API_PREFIX`].
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(profile::router())
        .merge(posts::router())
        .merge(interactions::router())
        .merge(comments::router())
        .merge(cover_slides::router())
}

pub(crate) trait ApiRoutes {
    /// Route `path` under the API prefix, with and without a trailing slash.
    fn api(self, path: &str, method_router: MethodRouter<AppState>) -> Self;
}

impl ApiRoutes for Router<AppState> {
    fn api(self, path: &str, method_router: MethodRouter<AppState>) -> Self {
        let base = format!("{API_PREFIX}{}", path.trim_end_matches('/'));
        self.route(&format!("{base}/"), method_router.clone())
            .route(&base, method_router)
    }
}

/// Store an uploaded file for `owner`, if one was sent.
pub(crate) async fn store_upload(
    state: &AppState,
    owner: i64,
    file: Option<UploadedFile>,
) -> AppResult<Option<String>> {
    match file {
        Some(file) => Ok(Some(state.assets.put(owner, &file.filename, &file.bytes).await?)),
        None => Ok(None),
    }
}

/// Store every sent file, in order. If one fails, the files already stored
/// by this call are removed before the error is returned.
pub(crate) async fn store_all<const N: usize>(
    state: &AppState,
    owner: i64,
    files: [Option<UploadedFile>; N],
) -> AppResult<[Option<String>; N]> {
    let mut stored: [Option<String>; N] = std::array::from_fn(|_| None);
    for (index, file) in files.into_iter().enumerate() {
        match store_upload(state, owner, file).await {
            Ok(path) => stored[index] = path,
            Err(e) => {
                discard(state, stored.into_iter().flatten()).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// How a write request changes each media field: a new file replaces it, a
/// blank text value clears it, absence leaves it alone.
pub(crate) async fn media_changes<const N: usize>(
    state: &AppState,
    owner: i64,
    payload: &mut Payload,
    fields: [&str; N],
) -> AppResult<[Option<Option<String>>; N]> {
    let files = fields.map(|field| payload.take_file(field));
    let stored = store_all(state, owner, files).await?;

    let mut changes: [Option<Option<String>>; N] = std::array::from_fn(|_| None);
    for (index, path) in stored.into_iter().enumerate() {
        changes[index] = match path {
            Some(path) => Some(Some(path)),
            None => match payload.text(fields[index]) {
                Some(value) if value.trim().is_empty() => Some(None),
                _ => None,
            },
        };
    }
    Ok(changes)
}

/// Paths newly stored by a set of media changes.
pub(crate) fn stored_paths(changes: &[Option<Option<String>>]) -> Vec<String> {
    changes.iter().filter_map(|change| change.clone().flatten()).collect()
}

/// Remove stored files that are no longer referenced. Failures are logged,
/// never returned, so the response reflects the database outcome alone.
pub(crate) async fn discard(state: &AppState, paths: impl IntoIterator<Item = String>) {
    for path in paths {
        if let Err(e) = state.assets.remove(&path).await {
            tracing::warn!(path = %path, error = %e, "Failed to remove stored file");
        }
    }
}
