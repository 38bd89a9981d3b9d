use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chipnotes_core::PlayerProgress;
use chipnotes_system_modes::CampaignSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything persisted between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SavedState {
    /// Lifetime progress.
    pub progress: PlayerProgress,
    /// Campaign unlock state.
    pub campaign: Option<CampaignSnapshot>,
}

/// JSON file store for [`SavedState`].
#[derive(Clone, Debug)]
pub(crate) struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Creates a store backed by the provided file.
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads saved state, starting fresh when the file does not exist yet.
    pub(crate) fn load(&self) -> Result<SavedState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "progress_file_missing");
                return Ok(SavedState::default());
            }
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read progress file {}", self.path.display())
                })
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse progress file {}", self.path.display()))
    }

    /// Writes saved state, replacing the previous file in one rename.
    pub(crate) fn save(&self, state: &SavedState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(state).context("failed to encode progress")?;
        let staging = staging_path(&self.path);
        fs::write(&staging, json)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(path = %self.path.display(), "progress_saved");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
