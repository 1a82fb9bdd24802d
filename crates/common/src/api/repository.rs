//! Repository containers, archival groups, stored content and IIIF

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

use super::models::{ArchivalGroup, Container};
use super::{check_status, join_url, ApiContext};
use crate::error::Result;
use crate::poll::{Observation, StatusSource};

/// Raw content returned by the Storage API
#[derive(Debug, Clone)]
pub struct StoredContent {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ApiContext {
    fn repository_url(&self, path: &str) -> String {
        self.url(&format!("repository/{}", path.trim_matches('/')))
    }

    /// `GET /repository/{path}` for a container
    pub async fn get_container(&self, path: &str) -> Result<Container> {
        self.get_json(&self.repository_url(path)).await
    }

    /// Like [`ApiContext::get_container`], with 404 mapped to `None`
    pub async fn try_get_container(&self, path: &str) -> Result<Option<Container>> {
        self.try_get_json(&self.repository_url(path)).await
    }

    /// `PUT /repository/{path}` creating an empty container
    pub async fn create_container(&self, path: &str, name: &str) -> Result<Container> {
        let url = self.repository_url(path);
        let resp = self
            .request(Method::PUT, &url)
            .await?
            .json(&json!({ "type": "Container", "name": name }))
            .send()
            .await?;
        let container: Container = check_status(resp, &Method::PUT, &url).await?.json().await?;
        info!("Created container {}", path);
        Ok(container)
    }

    /// `DELETE /repository/{path}`
    pub async fn delete_container(&self, path: &str) -> Result<()> {
        let url = self.repository_url(path);
        let resp = self.request(Method::DELETE, &url).await?.send().await?;
        check_status(resp, &Method::DELETE, &url).await?;
        info!("Deleted container {}", path);
        Ok(())
    }

    /// `GET /repository/{path}` for a preserved archival group
    pub async fn get_archival_group(&self, path: &str) -> Result<ArchivalGroup> {
        self.get_json(&self.repository_url(path)).await
    }

    /// Binary content from the Storage API
    pub async fn storage_content(&self, path: &str) -> Result<StoredContent> {
        let url = join_url(
            &self.config.storage_url,
            &format!("content/{}", path.trim_start_matches('/')),
        );
        let resp = self.request(Method::GET, &url).await?.send().await?;
        let resp = check_status(resp, &Method::GET, &url).await?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        Ok(StoredContent {
            content_type,
            bytes: resp.bytes().await?,
        })
    }

    /// URL of the published IIIF manifest for an archival group path
    pub fn iiif_manifest_url(&self, path: &str) -> String {
        join_url(&self.config.iiif_url, path)
    }

    /// Published IIIF manifest, or `None` while it is not yet published
    pub async fn iiif_manifest(&self, path: &str) -> Result<Option<Value>> {
        self.try_get_json(&self.iiif_manifest_url(path)).await
    }
}

/// Observes whether an IIIF manifest has been published.
///
/// Reports the manifest's `type` (`Manifest` for IIIF Presentation 3).
pub struct IiifManifestSource<'a> {
    pub api: &'a ApiContext,
    pub path: String,
}

#[async_trait]
impl<'a> StatusSource for IiifManifestSource<'a> {
    fn describe(&self) -> String {
        format!("IIIF manifest {}", self.api.iiif_manifest_url(&self.path))
    }

    async fn observe(&self) -> Result<Observation> {
        Ok(match self.api.iiif_manifest(&self.path).await? {
            Some(manifest) => Observation::Status(
                manifest
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            None => Observation::Missing,
        })
    }
}
