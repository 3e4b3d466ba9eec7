//! JSON file backing the registry.
//!
//! The whole `RegistryState` is one document, rewritten after every mutation.
//! Writes go to a sibling `.tmp` file first and are renamed over the target,
//! so a crash never leaves a truncated document behind.

use crate::error::StoreError;
use crate::models::RegistryState;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    #[cfg(test)]
    saves: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            #[cfg(test)]
            saves: Default::default(),
        }
    }

    /// Successful saves through this adapter and its clones.
    #[cfg(test)]
    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted state, falling back to an empty one.
    ///
    /// A missing file is the normal first-start case. An unreadable or malformed file
    /// is logged and replaced by an empty state on the next save.
    pub fn load(&self) -> RegistryState {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no state file yet, starting empty");
            return RegistryState::default();
        }

        match self.try_load() {
            Ok(state) => {
                tracing::info!(
                    path = %self.path.display(),
                    emergencies = state.emergencies.len(),
                    camps = state.relief_camps.len(),
                    "state loaded"
                );
                state
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable state file, starting empty");
                RegistryState::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<RegistryState, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(RegistryState::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites the state file with `state`.
    pub fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        #[cfg(test)]
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
