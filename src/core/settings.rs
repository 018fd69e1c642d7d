//! Build settings
//!
//! Reads `texpipe.toml` from the document's directory, layered over an
//! optional global `config.toml` in the platform config directory. Project
//! values override global ones field by field.
//!
//! Settings are read at the start of every build and frozen into a
//! [`BuildSettings`] snapshot for the lifetime of that build session.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    APP_DIR_NAME, DEFAULT_CLEAN_AND_RETRY, DEFAULT_CLEAN_ARGS, DEFAULT_CLEAN_ENABLED,
    GLOBAL_SETTINGS_FILE_NAME, LATEXMK, SETTINGS_FILE_NAME,
};
use crate::core::toolchain::{default_toolchain, StepTemplate};
use crate::error::SettingsError;

/// An external command with templated arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Executable to run
    pub command: String,
    /// Arguments; toolchain macros are expanded
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandConfig {
    /// The `latexmk -c` cleaner
    pub fn default_clean() -> Self {
        Self {
            command: LATEXMK.to_string(),
            args: DEFAULT_CLEAN_ARGS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// One settings file, every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    /// Ordered toolchain step templates
    pub toolchain: Option<Vec<StepTemplate>>,

    /// Retry once after cleaning when a step fails
    pub clean_and_retry: Option<bool>,

    /// Clean auxiliary files after a successful build
    pub clean_enabled: Option<bool>,

    /// Cleaner command
    pub clean: Option<CommandConfig>,

    /// Viewer refresh command
    pub viewer: Option<CommandConfig>,
}

impl SettingsFile {
    /// Load a settings file
    ///
    /// A missing file yields empty settings; an unreadable or invalid one is
    /// an error.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            SettingsError::ParseError { error, .. } => SettingsError::ParseError {
                path: path.display().to_string(),
                error,
            },
            other => other,
        })
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::ParseError {
            path: "<inline>".to_string(),
            error: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            toolchain: other.toolchain.or(self.toolchain),
            clean_and_retry: other.clean_and_retry.or(self.clean_and_retry),
            clean_enabled: other.clean_enabled.or(self.clean_enabled),
            clean: other.clean.or(self.clean),
            viewer: other.viewer.or(self.viewer),
        }
    }
}

/// Immutable settings snapshot for one build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    /// Ordered toolchain step templates
    pub toolchain: Vec<StepTemplate>,
    /// Retry once after cleaning when a step fails
    pub clean_and_retry: bool,
    /// Clean after success; also blocks clean-and-retry when set
    pub clean_enabled: bool,
    /// Cleaner command
    pub clean: CommandConfig,
    /// Viewer refresh command
    pub viewer: Option<CommandConfig>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        SettingsFile::default().into()
    }
}

impl From<SettingsFile> for BuildSettings {
    fn from(file: SettingsFile) -> Self {
        Self {
            toolchain: file.toolchain.unwrap_or_else(default_toolchain),
            clean_and_retry: file.clean_and_retry.unwrap_or(DEFAULT_CLEAN_AND_RETRY),
            clean_enabled: file.clean_enabled.unwrap_or(DEFAULT_CLEAN_ENABLED),
            clean: file.clean.unwrap_or_else(CommandConfig::default_clean),
            viewer: file.viewer,
        }
    }
}

impl BuildSettings {
    /// Whether a failed step may be retried after cleaning
    ///
    /// Requires clean-and-retry on and the general clean mode off.
    pub fn allows_clean_and_retry(&self) -> bool {
        self.clean_and_retry && !self.clean_enabled
    }
}

/// Provider of settings snapshots
pub trait SettingsSource: Send + Sync {
    /// Take a snapshot for a build of `root_file`
    fn snapshot(&self, root_file: &Path) -> Result<BuildSettings, SettingsError>;
}

impl SettingsSource for BuildSettings {
    fn snapshot(&self, _root_file: &Path) -> Result<BuildSettings, SettingsError> {
        Ok(self.clone())
    }
}

/// Settings read from disk on every snapshot
#[derive(Debug, Clone, Default)]
pub struct FileSettings {
    /// Global settings file, if any
    global_path: Option<PathBuf>,
    /// Project settings file overriding the per-document lookup
    project_path: Option<PathBuf>,
}

impl FileSettings {
    /// Use the platform global settings file and per-document project files
    pub fn new() -> Self {
        Self {
            global_path: dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME).join(GLOBAL_SETTINGS_FILE_NAME)),
            project_path: None,
        }
    }

    /// Use an explicit project settings file
    #[must_use]
    pub fn with_project_path(mut self, path: PathBuf) -> Self {
        self.project_path = Some(path);
        self
    }

    /// Use an explicit global settings file (`None` disables it)
    #[must_use]
    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    /// Project settings path for a document
    pub fn project_path_for(&self, root_file: &Path) -> PathBuf {
        self.project_path.clone().unwrap_or_else(|| {
            root_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(SETTINGS_FILE_NAME)
        })
    }
}

impl SettingsSource for FileSettings {
    fn snapshot(&self, root_file: &Path) -> Result<BuildSettings, SettingsError> {
        let global = match &self.global_path {
            Some(path) => SettingsFile::load_from_path(path)?,
            None => SettingsFile::default(),
        };
        let project = SettingsFile::load_from_path(&self.project_path_for(root_file))?;
        Ok(global.merge(project).into())
    }
}
