//! Settings file schema
//!
//! ```toml
//! [recorder]
//! stall_timeout = 45
//! segment_max_duration = 1800
//!
//! [shows.NEWS]
//! stream = "http://radio.example.com/live.mp3"
//! saveto = "/srv/archive"
//! savetoflat = "/srv/latest"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::recorder::RecorderConfig;
use crate::utils::error::{AppError, AppResult};

/// Top-level settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Overrides for the recording core
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Shows keyed by name
    #[serde(default)]
    pub shows: HashMap<String, ShowSettings>,
}

/// One `[shows.<NAME>]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSettings {
    /// Stream locator handed to the capture tool
    pub stream: String,

    /// Root of the `<name>/<year>/<month> - <Mon>` archive tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saveto: Option<String>,

    /// Directory receiving a flat copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savetoflat: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| AppError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| AppError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Case-insensitive show lookup
    pub fn show(&self, name: &str) -> Option<&ShowSettings> {
        self.shows
            .get(name)
            .or_else(|| {
                self.shows
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, show)| show)
            })
    }
}

impl ShowSettings {
    /// Archive root, empty values treated as unset
    pub fn saveto(&self) -> Option<&str> {
        non_empty(self.saveto.as_deref())
    }

    /// Flat copy directory, empty values treated as unset
    pub fn savetoflat(&self) -> Option<&str> {
        non_empty(self.savetoflat.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
