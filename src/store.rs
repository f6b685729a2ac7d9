//! Resource identifiers and the storage lookups that back them.
//!
//! A [`ResourceStore`] maps a validated [`ResourceId`] to an open,
//! seekable body plus its size and content type. The server only reads
//! through this interface; creating and deleting media belongs elsewhere.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mime_guess::mime::Mime;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

/// Object-safe bound for resource bodies handed out by a [`ResourceStore`].
pub trait MediaSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> MediaSource for T {}

/// A caller-supplied resource identifier that is safe to resolve against
/// a storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

/// The identifier was empty or could escape the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource identifier {0:?}")]
pub struct InvalidIdentifier(pub String);

impl ResourceId {
    /// Validate a raw identifier. Rejects empty ids, anything containing
    /// `..`, absolute paths, backslashes and NUL bytes.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = raw.is_empty()
            || raw.contains("..")
            || raw.starts_with('/')
            || raw.contains('\\')
            || raw.contains('\0');
        if invalid {
            return Err(InvalidIdentifier(raw.to_owned()));
        }
        Ok(ResourceId(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content type guessed from the identifier's extension.
    pub fn guess_content_type(&self) -> Mime {
        mime_guess::from_path(&self.0).first_or_octet_stream()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open resource ready to be streamed.
pub struct Resource {
    pub body: Box<dyn MediaSource>,
    pub total_size: u64,
    pub content_type: Mime,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("total_size", &self.total_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Errors a [`ResourceStore`] reports while resolving a resource.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    /// The identifier resolved to a location outside the store's root.
    #[error("resource resolves outside the storage root")]
    OutsideRoot,

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Lookup from identifiers to readable resources.
///
/// Implementations must not share read state between calls: every
/// `open` returns an independent body.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn open(&self, id: &ResourceId) -> Result<Resource, StoreError>;
}

/// Serves files below a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Canonicalizes `root`, which must be an existing directory.
    pub async fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = tokio::fs::canonicalize(root).await?;
        if !tokio::fs::metadata(&root).await?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("media root {} is not a directory", root.display()),
            ));
        }
        Ok(FsStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, id: &ResourceId) -> Result<PathBuf, StoreError> {
        let path = match tokio::fs::canonicalize(self.root.join(id.as_str())).await {
            Ok(path) => path,
            Err(e) if is_not_found(&e) => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::Io(e)),
        };
        // symlinks may still point elsewhere
        if !path.starts_with(&self.root) {
            return Err(StoreError::OutsideRoot);
        }
        Ok(path)
    }
}

#[async_trait]
impl ResourceStore for FsStore {
    async fn open(&self, id: &ResourceId) -> Result<Resource, StoreError> {
        let path = self.resolve(id).await?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if is_not_found(&e) => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound);
        }
        Ok(Resource {
            body: Box::new(file),
            total_size: metadata.len(),
            content_type: id.guess_content_type(),
        })
    }
}

fn is_not_found(e: &io::Error) -> bool {
    // a path component that is a regular file reports NotADirectory
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

/// Keeps resources in memory. Each `open` hands out a fresh cursor over
/// shared, immutable bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    resources: HashMap<String, (Bytes, Mime)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, guessing its content type from the identifier.
    pub fn insert(&mut self, id: impl Into<String>, data: impl Into<Bytes>) {
        let id = id.into();
        let content_type = mime_guess::from_path(&id).first_or_octet_stream();
        self.insert_typed(id, data, content_type);
    }

    pub fn insert_typed(&mut self, id: impl Into<String>, data: impl Into<Bytes>, content_type: Mime) {
        self.resources.insert(id.into(), (data.into(), content_type));
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn open(&self, id: &ResourceId) -> Result<Resource, StoreError> {
        let (data, content_type) = self.resources.get(id.as_str()).ok_or(StoreError::NotFound)?;
        Ok(Resource {
            total_size: data.len() as u64,
            body: Box::new(io::Cursor::new(data.clone())),
            content_type: content_type.clone(),
        })
    }
}
