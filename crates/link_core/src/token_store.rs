use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::AuthTokenStore;

/// Token persistence as a plain file. A missing file or empty content
/// reads as "no token"; storing overwrites the previous value.
#[derive(Debug, Clone)]
pub struct FileAuthTokenStore {
    path: PathBuf,
}

impl FileAuthTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuthTokenStore for FileAuthTokenStore {
    async fn has_token(&self) -> bool {
        match self.load_token().await {
            Ok(token) => token.is_some(),
            Err(err) => {
                warn!("link: auth token store unreadable: {err:#}");
                false
            }
        }
    }

    async fn load_token(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("reading auth token file {}", self.path.display())),
        }
    }

    async fn store_token(&self, token: &str) -> Result<()> {
        tokio::fs::write(&self.path, token)
            .await
            .with_context(|| format!("writing auth token file {}", self.path.display()))
    }
}
