//! Asset fetch collaborator.
//!
//! Locations are either `http(s)://` URLs (fetched with `reqwest`) or paths,
//! read from disk relative to an asset root.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use runtime::BoxFuture;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    NotFound { location: String },
    Status { location: String, status: u16 },
    Transport { location: String, message: String },
}

impl FetchError {
    pub fn location(&self) -> &str {
        match self {
            FetchError::NotFound { location }
            | FetchError::Status { location, .. }
            | FetchError::Transport { location, .. } => location,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound { location } => write!(f, "{location}: not found"),
            FetchError::Status { location, status } => {
                write!(f, "{location}: unexpected status {status}")
            }
            FetchError::Transport { location, message } => write!(f, "{location}: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Fetches raw asset bytes.
///
/// Implementations must be `Send + Sync`; methods return boxed futures for
/// dyn-compatibility.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, FetchError>>;

    fn fetch_text(&self, location: &str) -> BoxFuture<'static, Result<String, FetchError>> {
        let bytes = self.fetch(location);
        let location = location.to_string();
        Box::pin(async move {
            let bytes = bytes.await?;
            String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::Transport {
                location,
                message: format!("not UTF-8: {e}"),
            })
        })
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn transport_error(location: String, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        location,
        message: err.to_string(),
    }
}

/// Root directory for relative asset locations, defaulting to the working
/// directory.
pub const ENV_ASSET_ROOT: &str = "WALKTHROUGH_ASSET_ROOT";

/// HTTP for URLs, the filesystem for everything else.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: reqwest::Client,
    asset_root: PathBuf,
}

impl DefaultFetcher {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            asset_root: asset_root.into(),
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var(ENV_ASSET_ROOT).unwrap_or_else(|_| ".".to_string());
        Self::new(root)
    }

    fn local_path(&self, location: &str) -> PathBuf {
        let trimmed = location.strip_prefix("./").unwrap_or(location);
        self.asset_root.join(trimmed)
    }
}

impl AssetFetcher for DefaultFetcher {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        let location = location.to_string();

        if is_remote(&location) {
            let http = self.http.clone();
            return Box::pin(async move {
                debug!(%location, "GET");
                let resp = match http.get(&location).send().await {
                    Ok(resp) => resp,
                    Err(err) => return Err(transport_error(location, err)),
                };
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound { location });
                }
                if !status.is_success() {
                    return Err(FetchError::Status {
                        location,
                        status: status.as_u16(),
                    });
                }
                match resp.bytes().await {
                    Ok(bytes) => Ok(bytes),
                    Err(err) => Err(transport_error(location, err)),
                }
            });
        }

        let path = self.local_path(&location);
        Box::pin(async move {
            debug!(path = %path.display(), "read");
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(FetchError::NotFound { location })
                }
                Err(err) => Err(FetchError::Transport {
                    location,
                    message: err.to_string(),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetFetcher, DefaultFetcher, FetchError, is_remote};

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://cdn/x.jpg"));
        assert!(is_remote("http://cdn/x.jpg"));
        assert!(!is_remote("./data/paths/Roof.svg"));
    }

    #[tokio::test]
    async fn reads_relative_paths_from_asset_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("data/paths")).expect("mkdir");
        std::fs::write(dir.path().join("data/paths/Roof.svg"), "<svg/>").expect("write");

        let fetcher = DefaultFetcher::new(dir.path());
        let text = fetcher
            .fetch_text("./data/paths/Roof.svg")
            .await
            .expect("read");
        assert_eq!(text, "<svg/>");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = DefaultFetcher::new(dir.path());
        let err = fetcher.fetch("nope.jpg").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::NotFound {
                location: "nope.jpg".to_string()
            }
        );
        assert_eq!(err.location(), "nope.jpg");
    }
}
