use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::RangeNotSatisfiable;
use crate::store::InvalidIdentifier;

/// Terminal outcomes of [`serve`](crate::serve()) other than a streamed body.
///
/// None of these are retried. Client errors map to 4xx and are never
/// logged as server faults.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The identifier was malformed or could escape the storage root.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("resource {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    UnsatisfiableRange(#[from] RangeNotSatisfiable),

    /// Any storage error other than not-found while opening the resource.
    #[error("storage failure opening {resource_id:?}: {source}")]
    StorageFailure {
        resource_id: String,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::UnsatisfiableRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            ServeError::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        match self {
            ServeError::UnsatisfiableRange(e) => e.into_response(),
            other => other.status().into_response(),
        }
    }
}
