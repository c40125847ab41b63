//! Owner-scoped blob storage and byte fetching.
//!
//! The pipeline only ever reads through [`BlobStore::public_url`] followed by
//! [`fetch_bytes`], so any store that can hand out a fetchable URL works.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid object name: {0:?}")]
    InvalidName(String),
    #[error("{owner}/{name} not found")]
    NotFound { owner: String, name: String },
    #[error("{owner}/{name} already exists")]
    AlreadyExists { owner: String, name: String },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP {0} while fetching document")]
    Http(u16),
    #[error("connection error: {0}")]
    Connection(String),
}

/// One stored object as returned by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub size: u64,
}

/// Boxed future returned by [`BlobStore`] calls.
pub type StorageFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// An opaque blob store. Every object lives under an owner id.
pub trait BlobStore: Send + Sync {
    fn upload<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        bytes: &'a [u8],
    ) -> StorageFuture<'a, ()>;

    fn list<'a>(&'a self, owner: &'a str) -> StorageFuture<'a, Vec<StoredFile>>;

    /// A URL that [`fetch_bytes`] can read the object from.
    fn public_url(&self, owner: &str, name: &str) -> Result<Url, StorageError>;

    fn remove<'a>(&'a self, owner: &'a str, name: &'a str) -> StorageFuture<'a, ()>;
}

/// Filesystem store laid out as `<root>/<owner>/<name>`, serving `file://`
/// URLs.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_dir(&self, owner: &str) -> Result<PathBuf, StorageError> {
        check_component(owner)?;
        Ok(self.root.join(owner))
    }

    fn object_path(&self, owner: &str, name: &str) -> Result<PathBuf, StorageError> {
        check_component(name)?;
        Ok(self.owner_dir(owner)?.join(name))
    }
}

/// Owner ids and object names must each be exactly one plain path component.
fn check_component(part: &str) -> Result<(), StorageError> {
    let mut components = Path::new(part).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == part && !part.starts_with('.') => Ok(()),
        _ => Err(StorageError::InvalidName(part.to_string())),
    }
}

impl BlobStore for LocalBlobStore {
    fn upload<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        bytes: &'a [u8],
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.object_path(owner, name)?;
            tokio::fs::create_dir_all(self.owner_dir(owner)?).await?;
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Err(StorageError::AlreadyExists {
                        owner: owner.to_string(),
                        name: name.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            file.write_all(bytes).await?;
            file.flush().await?;
            tracing::debug!(owner, name, bytes = bytes.len(), "stored object");
            Ok(())
        })
    }

    fn list<'a>(&'a self, owner: &'a str) -> StorageFuture<'a, Vec<StoredFile>> {
        Box::pin(async move {
            let dir = self.owner_dir(owner)?;
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut files = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if !meta.is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                files.push(StoredFile {
                    id: format!("{}/{}", owner, name),
                    name,
                    size: meta.len(),
                });
            }
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        })
    }

    fn public_url(&self, owner: &str, name: &str) -> Result<Url, StorageError> {
        let path = std::path::absolute(self.object_path(owner, name)?)?;
        Url::from_file_path(&path)
            .map_err(|_| StorageError::InvalidName(path.display().to_string()))
    }

    fn remove<'a>(&'a self, owner: &'a str, name: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.object_path(owner, name)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(owner, name, "removed object");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                    owner: owner.to_string(),
                    name: name.to_string(),
                }),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Read the bytes behind a `file://` or `http(s)://` URL.
pub async fn fetch_bytes(url: &Url, client: &reqwest::Client) -> Result<Vec<u8>, FetchError> {
    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "not a local path".into(),
            })?;
            tokio::fs::read(&path)
                .await
                .map_err(|source| FetchError::Io { path, source })
        }
        "http" | "https" => {
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::Connection(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(FetchError::Http(resp.status().as_u16()));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| FetchError::Connection(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}
