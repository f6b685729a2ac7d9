use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::RANGE;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::error::ServeError;
use crate::serve::{MediaRequest, MediaResponse, serve};
use crate::store::ResourceStore;

/// Build the media routes: `GET /media/{*resource_id}`.
///
/// Any authorization must be layered in front of this router.
pub fn router(store: Arc<dyn ResourceStore>) -> Router {
    Router::new()
        .route("/media/{*resource_id}", get(serve_media))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn serve_media(
    State(store): State<Arc<dyn ResourceStore>>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
) -> Result<MediaResponse, ServeError> {
    // a non-UTF-8 header can't parse as a byte range and ends up as a 416
    let range = headers
        .get(RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    serve(store.as_ref(), &MediaRequest { resource_id, range }).await
}
