//! # range-media
//!
//! HTTP range responses for audio and cover files, served through [`axum`][1].
//!
//! [`serve()`] resolves a [`MediaRequest`] against any [`ResourceStore`] and
//! answers with the whole resource (`200`), a single byte window (`206`)
//! or an error from the [`ServeError`] taxonomy. Bodies are streamed
//! lazily in bounded chunks; only the requested window is ever read.
//!
//! The responder itself is generic: any type implementing [`RangeBody`]
//! can be wrapped in [`Ranged`]. Any type implementing both [`AsyncRead`]
//! and [`AsyncSeekStart`] can be used through the [`KnownSize`] adapter.
//!
//! [`AsyncSeekStart`] is a trait defined by this crate which only allows
//! seeking from the start of a file. It is automatically implemented for any
//! type implementing [`AsyncSeek`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use range_media::{router, FsStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FsStore::new("media").await?;
//!     let app = router(Arc::new(store));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! [1]: https://docs.rs/axum

mod config;
mod error;
mod file;
mod range;
mod router;
mod serve;
mod store;
mod stream;
mod tracing_setup;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType};
use mime_guess::mime::Mime;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

pub use config::ServerConfig;
pub use error::ServeError;
pub use file::KnownSize;
pub use range::{ByteRange, ParseRangeError, parse_range_header};
pub use router::router;
pub use serve::{MediaBody, MediaRequest, MediaResponse, serve};
pub use store::{FsStore, InvalidIdentifier, MediaSource, MemoryStore, Resource, ResourceId, ResourceStore, StoreError};
pub use stream::RangedStream;
pub use tracing_setup::init_tracing;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}

/// The main responder type. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    range: Option<String>,
    body: B,
    content_type: Mime,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// and the raw value of an optional `Range` header.
    pub fn new(range: Option<String>, body: B, content_type: Mime) -> Self {
        Ranged { range, body, content_type }
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeNotSatisfiable`] error if requested
    /// range in header was malformed or not satisfiable.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RangeNotSatisfiable> {
        let total_bytes = self.body.byte_size();
        let content_type = self.content_type;

        let Some(header) = self.range else {
            let content_length = ContentLength(total_bytes);
            let stream = RangedStream::new(self.body, 0, total_bytes);
            return Ok(RangedResponse::Full { content_length, stream, content_type });
        };

        let range = parse_range_header(&header, total_bytes).map_err(|e| {
            tracing::debug!(error = %e, "rejecting range request");
            RangeNotSatisfiable(ContentRange::unsatisfied_bytes(total_bytes))
        })?;

        let content_range = ContentRange::bytes(range.start..range.end + 1, total_bytes)
            .expect("ContentRange::bytes cannot panic in this usage");
        let content_length = ContentLength(range.len());
        let stream = RangedStream::new(self.body, range.start, range.len());
        Ok(RangedResponse::Partial { content_range, content_length, stream, content_type })
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone, Error)]
#[error("requested range not satisfiable")]
pub struct RangeNotSatisfiable(pub ContentRange);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse<B> {
    /// Full content response, no range requested.
    Full {
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Mime,
    },
    /// A single satisfiable byte range.
    Partial {
        content_range: ContentRange,
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Mime,
    },
}

impl<B> RangedResponse<B> {
    pub fn status(&self) -> StatusCode {
        match self {
            RangedResponse::Full { .. } => StatusCode::OK,
            RangedResponse::Partial { .. } => StatusCode::PARTIAL_CONTENT,
        }
    }

    pub fn content_length(&self) -> u64 {
        match self {
            RangedResponse::Full { content_length, .. }
            | RangedResponse::Partial { content_length, .. } => content_length.0,
        }
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        let accept_ranges = TypedHeader(AcceptRanges::bytes());

        match self {
            RangedResponse::Full { content_length, stream, content_type } => {
                let content_type = TypedHeader(ContentType::from(content_type));
                (StatusCode::OK, accept_ranges, TypedHeader(content_length), content_type, stream)
                    .into_response()
            }
            RangedResponse::Partial { content_range, content_length, stream, content_type } => {
                let content_type = TypedHeader(ContentType::from(content_type));
                (
                    StatusCode::PARTIAL_CONTENT,
                    accept_ranges,
                    TypedHeader(content_range),
                    TypedHeader(content_length),
                    content_type,
                    stream,
                )
                    .into_response()
            }
        }
    }
}
