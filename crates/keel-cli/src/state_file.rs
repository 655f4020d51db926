//! Persisted reconciliation state, stored next to the resource file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use keel_core::domain::ReconciliationState;

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// `jobs/api.json` → `jobs/api.state.json`
    pub fn for_resource(resource: &Path) -> Self {
        let stem = resource
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resource".to_string());
        Self {
            path: resource.with_file_name(format!("{stem}.state.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Option<ReconciliationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(state))
    }

    pub fn save(&self, state: &ReconciliationState) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}
