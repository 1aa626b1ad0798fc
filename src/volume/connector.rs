//! Local file connector
//!
//! Opens volumes stored as JSON [`VolumeDocument`]s. Urls are either plain
//! paths or `file://` urls. When a token is configured every sas token must
//! match it; otherwise any token is accepted.

use super::memory::{InMemoryVolume, VolumeDocument};
use super::{Connector, DataSourceHandle};
use crate::error::{VdsError, VdsResult};
use crate::request::RequestedResource;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Filesystem path of a volume url
pub fn url_to_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}

#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    required_token: Option<String>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept requests whose sas tokens equal `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            required_token: Some(token.into()),
        }
    }

    async fn load(url: &str) -> VdsResult<InMemoryVolume> {
        let open_error = |reason: String| VdsError::DataSourceOpen {
            url: url.to_string(),
            reason,
        };

        let content = fs::read_to_string(url_to_path(url))
            .await
            .map_err(|e| open_error(e.to_string()))?;
        let document: VolumeDocument =
            serde_json::from_str(&content).map_err(|e| open_error(e.to_string()))?;
        InMemoryVolume::from_document(document).map_err(|e| open_error(e.to_string()))
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn authorize(&self, resource: &RequestedResource) -> VdsResult<()> {
        if resource.sas.len() != resource.vds.len() {
            return Err(VdsError::invalid(
                "Every vds url needs exactly one sas token",
            ));
        }

        for (url, sas) in resource.vds.iter().zip(&resource.sas) {
            if let Some(token) = &self.required_token {
                if sas != token {
                    return Err(VdsError::Unauthorized(url.clone()));
                }
            }

            let exists = fs::try_exists(url_to_path(url))
                .await
                .map_err(|e| VdsError::io(format!("checking {}", url), e))?;
            if !exists {
                return Err(VdsError::DataSourceOpen {
                    url: url.clone(),
                    reason: "no such volume".to_string(),
                });
            }
        }

        Ok(())
    }

    async fn open(&self, resource: &RequestedResource) -> VdsResult<DataSourceHandle> {
        self.authorize(resource).await?;

        let mut volumes = Vec::with_capacity(resource.vds.len());
        for url in &resource.vds {
            volumes.push(Self::load(url).await?);
        }

        let volume = match (volumes.as_slice(), resource.operator()?) {
            ([single], None) => single.clone(),
            ([left, right], Some(op)) => left.combine(right, op)?,
            _ => {
                return Err(VdsError::invalid(
                    "Expected one vds url, or two urls with a binary operator",
                ))
            }
        };

        let url = resource.vds.join(" ");
        debug!("Opened data source {}", url);
        Ok(DataSourceHandle::new(url, Box::new(volume)))
    }
}
