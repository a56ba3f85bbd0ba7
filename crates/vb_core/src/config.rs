use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{CoreError, CoreErrorCode};

pub const DEFAULT_MAX_BACKPACKS: usize = 10;

/// Well-known files inside the tool's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn id_mapping(&self) -> PathBuf {
        self.root.join("NameIdMapping.json")
    }

    pub fn localization(&self) -> PathBuf {
        self.root.join("Localization.csv")
    }

    pub fn server_config(&self) -> PathBuf {
        self.root.join("Configuration.json")
    }

    pub fn tool_config(&self) -> PathBuf {
        self.root.join("vbm_config.json")
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new("Data")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalBackpackConfig {
    #[serde(rename = "MaxBackpacks", default = "default_max_backpacks")]
    pub max_backpacks: usize,
}

impl Default for PersonalBackpackConfig {
    fn default() -> Self {
        Self {
            max_backpacks: DEFAULT_MAX_BACKPACKS,
        }
    }
}

fn default_max_backpacks() -> usize {
    DEFAULT_MAX_BACKPACKS
}

/// The parts of the game server's `Configuration.json` this tool reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "PersonalBackpack", default)]
    pub personal_backpack: PersonalBackpackConfig,
}

impl RuntimeConfig {
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        match read_optional(path)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Decode,
                    format!("invalid server configuration {}: {e}", path.display()),
                )
            }),
            None => {
                tracing::info!(
                    path = %path.display(),
                    "no server configuration, using {DEFAULT_MAX_BACKPACKS} backpacks"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn max_backpacks(&self) -> usize {
        self.personal_backpack.max_backpacks
    }
}

/// The tool's own persisted preferences (`vbm_config.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vb_path: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl ToolConfig {
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        match read_optional(path)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Decode,
                    format!("invalid tool configuration {}: {e}", path.display()),
                )
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Encode,
                format!("failed to encode tool configuration: {e}"),
            )
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Io,
                    format!("failed to create {}: {e}", parent.display()),
                )
            })?;
        }
        fs::write(path, text).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to write {}: {e}", path.display()),
            )
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, CoreError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::new(
            CoreErrorCode::Io,
            format!("failed to read {}: {e}", path.display()),
        )),
    }
}
