//! Choosing where generated scripts are saved

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::Result;

/// Asks the host where to save a generated script
#[async_trait]
pub trait DestinationPrompt: Send + Sync {
    /// Pick a destination, starting from `suggested`
    ///
    /// `None` means the user cancelled; nothing is written.
    async fn choose_destination(&self, suggested: &Path) -> Option<PathBuf>;
}

/// Prompt with a fixed answer, for non-interactive hosts
#[derive(Debug, Clone, Default)]
pub struct FixedDestination {
    path: Option<PathBuf>,
}

impl FixedDestination {
    /// Always save to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Always cancel
    #[must_use]
    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl DestinationPrompt for FixedDestination {
    async fn choose_destination(&self, _suggested: &Path) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Write a generated script
pub(crate) async fn persist(path: &Path, script: &str) -> Result<()> {
    tokio::fs::write(path, script).await?;
    info!("Test scripts saved to {}", path.display());
    Ok(())
}
