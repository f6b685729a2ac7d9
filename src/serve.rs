use crate::error::ServeError;
use crate::store::{MediaSource, ResourceId, ResourceStore, StoreError};
use crate::{KnownSize, Ranged, RangedResponse};

/// Body type produced by [`serve`].
pub type MediaBody = KnownSize<Box<dyn MediaSource>>;

/// Successful outcome of [`serve`]: a `200` or `206` with a lazy body.
pub type MediaResponse = RangedResponse<MediaBody>;

/// A request for a resource, optionally restricted by a raw `Range` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRequest {
    pub resource_id: String,
    pub range: Option<String>,
}

impl MediaRequest {
    pub fn new(resource_id: impl Into<String>) -> Self {
        MediaRequest { resource_id: resource_id.into(), range: None }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Resolve `request` against `store` and produce the response head and body.
///
/// The identifier is validated before the store is consulted. Nothing is
/// cached between calls, so concurrent calls for the same resource each
/// get an independent body.
pub async fn serve<S>(store: &S, request: &MediaRequest) -> Result<MediaResponse, ServeError>
where
    S: ResourceStore + ?Sized,
{
    let id = ResourceId::parse(&request.resource_id).inspect_err(|e| {
        tracing::debug!(error = %e, "rejecting resource identifier");
    })?;

    let resource = match store.open(&id).await {
        Ok(resource) => resource,
        Err(StoreError::NotFound) => {
            tracing::debug!(resource = %id, "resource not found");
            return Err(ServeError::NotFound(id.to_string()));
        }
        Err(StoreError::OutsideRoot) => {
            tracing::debug!(resource = %id, "resource resolves outside the storage root");
            return Err(crate::InvalidIdentifier(id.to_string()).into());
        }
        Err(StoreError::Io(source)) => {
            tracing::error!(
                resource = %id,
                range = ?request.range,
                error = %source,
                "storage failure opening resource"
            );
            return Err(ServeError::StorageFailure { resource_id: id.to_string(), source });
        }
    };

    let total_size = resource.total_size;
    let body = KnownSize::sized(resource.body, total_size);
    let response = Ranged::new(request.range.clone(), body, resource.content_type).try_respond()?;

    tracing::debug!(
        resource = %id,
        range = ?request.range,
        status = response.status().as_u16(),
        content_length = response.content_length(),
        total_size,
        "serving resource"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum_extra::headers::{ContentLength, ContentRange};
    use futures::StreamExt;

    use super::*;
    use crate::store::{MemoryStore, Resource};

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn store_with(id: &str, data: Vec<u8>) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(id, data);
        store
    }

    async fn body_bytes(response: MediaResponse) -> Vec<u8> {
        let stream = match response {
            RangedResponse::Full { stream, .. } | RangedResponse::Partial { stream, .. } => stream,
        };
        let chunks: Vec<_> = stream.collect().await;
        chunks.into_iter().flat_map(|chunk| chunk.unwrap()).collect()
    }

    /// Counts lookups and fails each one with the configured error.
    struct FailingStore {
        calls: AtomicUsize,
        kind: io::ErrorKind,
    }

    #[async_trait]
    impl ResourceStore for FailingStore {
        async fn open(&self, _id: &ResourceId) -> Result<Resource, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(io::Error::new(self.kind, "disk on fire")))
        }
    }

    #[tokio::test]
    async fn test_full_resource() {
        let data = sample(1000);
        let store = store_with("book.mp3", data.clone());

        let response = serve(&store, &MediaRequest::new("book.mp3")).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(1000, response.content_length());
        assert_eq!(data, body_bytes(response).await);
    }

    #[tokio::test]
    async fn test_partial_resource() {
        let data = sample(1000);
        let store = store_with("book.mp3", data.clone());

        let request = MediaRequest::new("book.mp3").with_range("bytes=500-999");
        let response = serve(&store, &request).await.unwrap();
        match response {
            RangedResponse::Partial { content_range, content_length, stream, content_type } => {
                assert_eq!(ContentLength(500), content_length);
                assert_eq!(ContentRange::bytes(500..1000, 1000).unwrap(), content_range);
                assert_eq!("audio/mpeg", content_type.essence_str());
                let chunks: Vec<_> = stream.collect().await;
                let bytes: Vec<u8> = chunks.into_iter().flat_map(|chunk| chunk.unwrap()).collect();
                assert_eq!(&data[500..], &bytes[..]);
            }
            other => panic!("Expected a partial response: {:?}", other.status()),
        }
    }

    #[tokio::test]
    async fn test_every_window_of_small_resource() {
        let data = sample(13);
        let store = store_with("tiny.bin", data.clone());

        for start in 0..13usize {
            for end in start..13usize {
                let request = MediaRequest::new("tiny.bin").with_range(format!("bytes={start}-{end}"));
                let response = serve(&store, &request).await.unwrap();
                assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
                assert_eq!((end - start + 1) as u64, response.content_length());
                assert_eq!(&data[start..=end], &body_bytes(response).await[..]);
            }
        }
    }

    #[tokio::test]
    async fn test_unsatisfiable_ranges() {
        let store = store_with("book.mp3", sample(1000));

        for header in ["bytes=900-1000", "bytes=1000-", "bytes=600-500", "bytes=abc", "bytes=-0"] {
            let request = MediaRequest::new("book.mp3").with_range(header);
            let err = serve(&store, &request).await.unwrap_err();
            assert_matches!(&err, ServeError::UnsatisfiableRange(_), "header {header:?}");

            let response = err.into_response();
            assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
            assert_eq!("bytes */1000", response.headers()["content-range"]);
        }
    }

    #[tokio::test]
    async fn test_missing_resource_ignores_range() {
        let store = store_with("book.mp3", sample(10));

        for range in [None, Some("bytes=0-4"), Some("bytes=900-1000")] {
            let request = MediaRequest { resource_id: "other.mp3".into(), range: range.map(String::from) };
            let err = serve(&store, &request).await.unwrap_err();
            assert_matches!(err, ServeError::NotFound(id) if id == "other.mp3");
        }
    }

    #[tokio::test]
    async fn test_traversal_never_reaches_store() {
        let store = FailingStore { calls: AtomicUsize::new(0), kind: io::ErrorKind::Other };

        for id in ["../secret.mp3", "audio/../../etc/passwd", "..", ""] {
            let request = MediaRequest::new(id).with_range("bytes=0-1");
            let err = serve(&store, &request).await.unwrap_err();
            assert_eq!(StatusCode::BAD_REQUEST, err.status());
        }
        assert_eq!(0, store.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let store = FailingStore { calls: AtomicUsize::new(0), kind: io::ErrorKind::PermissionDenied };

        let err = serve(&store, &MediaRequest::new("book.mp3")).await.unwrap_err();
        assert_matches!(
            &err,
            ServeError::StorageFailure { resource_id, source }
                if resource_id == "book.mp3" && source.kind() == io::ErrorKind::PermissionDenied
        );
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, err.into_response().status());
        assert_eq!(1, store.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disjoint_ranges_cover_resource() {
        let data = sample(1000);
        let store = store_with("book.mp3", data.clone());

        for k in [0usize, 1, 499, 998] {
            let head = MediaRequest::new("book.mp3").with_range(format!("bytes=0-{k}"));
            let tail = MediaRequest::new("book.mp3").with_range(format!("bytes={}-999", k + 1));
            let mut joined = body_bytes(serve(&store, &head).await.unwrap()).await;
            joined.extend(body_bytes(serve(&store, &tail).await.unwrap()).await);
            assert_eq!(data, joined);
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let data = sample(4096);
        let store = store_with("book.mp3", data.clone());

        let requests: Vec<_> = (0..16u64)
            .map(|i| MediaRequest::new("book.mp3").with_range(format!("bytes={}-{}", i * 256, i * 256 + 255)))
            .collect();
        let bodies = futures::future::join_all(requests.iter().map(|request| async {
            body_bytes(serve(&store, request).await.unwrap()).await
        }))
        .await;

        assert_eq!(data, bodies.concat());
    }

    #[tokio::test]
    async fn test_empty_resource() {
        let store = store_with("empty.mp3", Vec::new());

        let response = serve(&store, &MediaRequest::new("empty.mp3")).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(0, response.content_length());
        assert!(body_bytes(response).await.is_empty());

        let request = MediaRequest::new("empty.mp3").with_range("bytes=0-");
        assert_matches!(serve(&store, &request).await, Err(ServeError::UnsatisfiableRange(_)));
    }
}
