//! Per-task credential provisioning
//!
//! Some media hosts require an authenticated session, provided to the engine
//! as a cookie jar inside the task workspace. Acquisition and release happen
//! around every fetch, on all exit paths, so no credential material outlives
//! its task.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Handle to a provisioned credential, returned to the provider on release.
#[derive(Clone, Debug)]
pub struct CredentialHandle {
    /// Path of the provisioned credential file inside the workspace
    pub path: PathBuf,
}

/// Abstraction over per-task credential provisioning.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provision credentials into `workspace`.
    ///
    /// Returns `None` when no credentials are configured — downloads proceed
    /// unauthenticated.
    async fn acquire(&self, workspace: &Path) -> Result<Option<CredentialHandle>>;

    /// Release a previously acquired credential.
    async fn release(&self, handle: CredentialHandle);
}

/// Copies a configured cookie jar into each task workspace.
///
/// The source file is typically an exported browser session; hosted
/// deployments point this at a secrets mount. A missing source file is not
/// an error — the task simply runs without credentials.
pub struct CookieJarProvider {
    source: PathBuf,
}

impl CookieJarProvider {
    /// Cookie jar filename inside the workspace
    const JAR_NAME: &'static str = "cookies.txt";

    /// Create a provider reading from `source`.
    pub fn new(source: PathBuf) -> Self {
        Self { source }
    }

    /// Build a provider from [`Config::cookie_file`], if one is configured.
    pub fn from_config(config: &crate::config::Config) -> Option<Self> {
        config.cookie_file.clone().map(Self::new)
    }
}

#[async_trait::async_trait]
impl CredentialProvider for CookieJarProvider {
    async fn acquire(&self, workspace: &Path) -> Result<Option<CredentialHandle>> {
        if !tokio::fs::try_exists(&self.source).await.unwrap_or(false) {
            return Ok(None);
        }
        let dest = workspace.join(Self::JAR_NAME);
        tokio::fs::copy(&self.source, &dest).await?;
        tracing::debug!(path = %dest.display(), "Provisioned cookie jar");
        Ok(Some(CredentialHandle { path: dest }))
    }

    async fn release(&self, handle: CredentialHandle) {
        crate::artifact::remove_file_quiet(&handle.path).await;
    }
}

/// Provider used when no credentials are configured.
pub struct NoCredentialProvider;

#[async_trait::async_trait]
impl CredentialProvider for NoCredentialProvider {
    async fn acquire(&self, _workspace: &Path) -> Result<Option<CredentialHandle>> {
        Ok(None)
    }

    async fn release(&self, _handle: CredentialHandle) {}
}
