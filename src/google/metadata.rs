//! Client for the GCE metadata server.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::GoogleComputeError;
use crate::compute::HostIdentity;

/// Root of the v1 metadata tree.
pub const METADATA_ROOT: &str = "http://metadata.google.internal/computeMetadata/v1";

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

/// Reads identity, tokens and licenses of the current host.
#[derive(Clone, Debug)]
pub struct MetadataServer {
    http: reqwest::Client,
    base: String,
}

impl Default for MetadataServer {
    fn default() -> Self {
        Self::with_base(METADATA_ROOT)
    }
}

impl MetadataServer {
    /// Points the client at an alternative metadata root.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "metadata client setup failed; requests have no timeout");
                reqwest::Client::new()
            });
        Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    /// Fetches `path` and returns the body without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when the server cannot be
    /// reached or answers with a non-success status.
    pub async fn get(&self, path: &str) -> Result<String, GoogleComputeError> {
        let failed = |message: String| GoogleComputeError::Metadata {
            path: path.to_owned(),
            message,
        };
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .map_err(|err| failed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .text()
            .await
            .map_err(|err| failed(err.to_string()))?;
        Ok(body.trim_end_matches('\n').to_owned())
    }

    /// Reads the identity of the current host.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when any lookup fails.
    pub async fn identity(&self) -> Result<HostIdentity, GoogleComputeError> {
        let project = self.get("/project/project-id").await?;
        let zone = basename(&self.get("/instance/zone").await?);
        let network = basename(&self.get("/instance/network-interfaces/0/network").await?);
        let name = self.get("/instance/name").await?;
        let id = self.get("/instance/id").await?;
        debug!(%project, %zone, %network, %name, "resolved host identity");
        Ok(HostIdentity {
            project,
            zone,
            network,
            name,
            id,
        })
    }

    /// Fetches an OAuth access token for the default service account.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when the token cannot be
    /// fetched or decoded.
    pub async fn access_token(&self) -> Result<String, GoogleComputeError> {
        let path = "/instance/service-accounts/default/token";
        let body = self.get(path).await?;
        serde_json::from_str::<AccessToken>(&body)
            .map(|token| token.access_token)
            .map_err(|err| GoogleComputeError::Metadata {
                path: path.to_owned(),
                message: err.to_string(),
            })
    }

    /// Reports whether any license attached to the host has `license_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when the license listing
    /// cannot be read. Unreadable individual entries count as non-matching.
    pub async fn has_license(&self, license_id: &str) -> Result<bool, GoogleComputeError> {
        let listing = self.get("/instance/licenses/").await?;
        for entry in listing.lines().filter(|entry| !entry.is_empty()) {
            match self.get(&format!("/instance/licenses/{entry}id")).await {
                Ok(id) if id == license_id => return Ok(true),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "skipping unreadable license entry"),
            }
        }
        Ok(false)
    }
}

fn basename(value: &str) -> String {
    value.rsplit('/').next().unwrap_or(value).to_owned()
}
