//! Helper-instance identity lookup via the local metadata service.
//!
//! The workflow runs on the helper instance itself and needs that instance's
//! identifier to use it as the attachment point for the copy.

use std::sync::LazyLock;
use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendFuture;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default base URL of the instance metadata service.
pub const DEFAULT_METADATA_BASE_URL: &str = "http://169.254.169.254";

const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Errors raised while resolving the helper instance identity.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MetadataError {
    /// Raised when the metadata endpoint cannot be reached or answers with a
    /// non-success status.
    #[error("metadata lookup failed: {0}")]
    Http(String),
    /// Raised when the endpoint answers with an empty body.
    #[error("metadata endpoint returned an empty instance id")]
    Empty,
}

/// Capability that reports the identifier of the instance the current process
/// runs on.
pub trait IdentitySource {
    /// Resolves the local instance identifier.
    fn local_instance_id(&self) -> BackendFuture<'_, String, MetadataError>;
}

/// Identity source backed by the HTTP instance metadata service.
#[derive(Clone, Debug)]
pub struct ImdsClient {
    base_url: String,
}

impl ImdsClient {
    /// Creates a client against `base_url`, trimming any trailing slash.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            base_url: base.trim_end_matches('/').to_owned(),
        }
    }

    fn instance_id_url(&self) -> String {
        format!("{}{INSTANCE_ID_PATH}", self.base_url)
    }
}

impl Default for ImdsClient {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_BASE_URL)
    }
}

impl IdentitySource for ImdsClient {
    fn local_instance_id(&self) -> BackendFuture<'_, String, MetadataError> {
        Box::pin(async move {
            let response = HTTP_CLIENT
                .get(self.instance_id_url())
                .send()
                .await
                .map_err(|err| MetadataError::Http(err.to_string()))?;

            if !response.status().is_success() {
                return Err(MetadataError::Http(format!(
                    "unexpected status {}",
                    response.status()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|err| MetadataError::Http(err.to_string()))?;
            let instance_id = body.trim();
            if instance_id.is_empty() {
                return Err(MetadataError::Empty);
            }
            Ok(instance_id.to_owned())
        })
    }
}
