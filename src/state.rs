use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::template::Template;

/// Per-machine state between invocations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LocalState {
    pub last_template: Option<String>,
    pub generated_description: Option<String>,
}

/// Manages local state persisted as TOML in the state directory.
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Default state directory: `~/.pr-autofill`, or `./.pr-autofill` without a home.
    pub fn default_dir() -> PathBuf {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::dir_under(&base)
    }

    pub fn dir_under(base: &Path) -> PathBuf {
        base.join(".pr-autofill")
    }

    fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.toml")
    }

    /// Load state from disk. Returns default state if file is missing or corrupted.
    pub fn load(&self) -> LocalState {
        let path = self.state_file();
        if !path.exists() {
            return LocalState::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<LocalState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("corrupted state file {}: {e}, resetting", path.display());
                    LocalState::default()
                }
            },
            Err(e) => {
                warn!(
                    "failed to read state file {}: {e}, resetting",
                    path.display()
                );
                LocalState::default()
            }
        }
    }

    /// Save state to disk.
    pub fn save(&self, state: &LocalState) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Error::State(format!("failed to create state dir: {e}")))?;

        let content = toml::to_string_pretty(state)
            .map_err(|e| Error::State(format!("failed to serialize state: {e}")))?;

        std::fs::write(self.state_file(), content)
            .map_err(|e| Error::State(format!("failed to write state file: {e}")))?;

        Ok(())
    }

    /// Remember the template picked most recently.
    pub fn set_last_template(&self, id: &str) -> Result<()> {
        let mut state = self.load();
        state.last_template = Some(id.to_string());
        self.save(&state)
    }

    /// Store a freshly generated description for a later autofill.
    pub fn set_generated_description(&self, description: &str) -> Result<()> {
        let mut state = self.load();
        state.generated_description = Some(description.to_string());
        self.save(&state)
    }

    pub fn generated_description(&self) -> Option<String> {
        self.load()
            .generated_description
            .filter(|d| !d.trim().is_empty())
    }

    /// The remembered template if it still exists, else the first template.
    pub fn selected_template(&self, templates: &[Template]) -> Option<String> {
        let state = self.load();
        state
            .last_template
            .filter(|id| templates.iter().any(|t| &t.id == id))
            .or_else(|| templates.first().map(|t| t.id.clone()))
    }
}
