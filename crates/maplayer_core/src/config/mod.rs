//! File-based configuration for the layer core.
//!
//! # Responsibility
//! - Parse the TOML config (`[store]`, `[logging]`, `[profile]`).
//! - Resolve the schema profile from a preset name or inline fields.
//!
//! # Invariants
//! - Every section has defaults; an empty file is a valid config.
//! - A config returned by [`load_config`] always resolves to a valid profile.

pub mod profile;

use crate::db::DEFAULT_BUSY_TIMEOUT;
use profile::{ProfileError, SchemaProfile};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub profile: ProfileConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Required by callers that open a store.
    pub path: Option<PathBuf>,
    /// Lock-wait bound for every statement, including the catalog load.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; build-mode default when unset.
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub dir: Option<PathBuf>,
}

/// `[profile]` section: a preset name, or inline profile fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub preset: Option<String>,
    #[serde(flatten)]
    pub inline: SchemaProfile,
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.schema_profile()?;
        Ok(config)
    }

    /// Resolves the effective schema profile.
    pub fn schema_profile(&self) -> Result<SchemaProfile, ConfigError> {
        let profile = match self.profile.preset.as_deref() {
            Some(name) => SchemaProfile::preset(name)
                .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?,
            None => self.profile.inline.clone(),
        };
        profile.validate().map_err(ConfigError::InvalidProfile)?;
        Ok(profile)
    }
}

/// Reads and validates a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    CoreConfig::from_toml_str(&content)
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    UnknownPreset(String),
    InvalidProfile(ProfileError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::UnknownPreset(name) => write!(
                f,
                "unknown profile preset `{name}`; expected {}|{}",
                profile::PRESET_BASIC,
                profile::PRESET_EXTENDED
            ),
            Self::InvalidProfile(err) => write!(f, "invalid schema profile: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidProfile(err) => Some(err),
            Self::UnknownPreset(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, ConfigError, CoreConfig};
    use crate::config::profile::SchemaProfile;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoreConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config.store.path, None);
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.dir, None);
        assert_eq!(config.schema_profile().unwrap(), SchemaProfile::basic());
    }

    #[test]
    fn preset_selects_builtin_profile() {
        let config = CoreConfig::from_toml_str(
            r#"
            [store]
            path = "/tmp/maps.sqlite3"
            busy_timeout_ms = 250

            [profile]
            preset = "extended"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.schema_profile().unwrap(), SchemaProfile::extended());
    }

    #[test]
    fn inline_profile_fields_are_parsed_in_order() {
        let config = CoreConfig::from_toml_str(
            r#"
            [profile]
            key_fields = ["name", "type", "url"]
            label_field = "type"

            [profile.load_filter]
            field = "type"
            equals = "xyz"

            [profile.on_insert]
            layer_order = 2
            is_base_map = true

            [[profile.derived]]
            field = "group_layer"
            template = "BACKGROUND:{name}"
            transliterate = true
            "#,
        )
        .unwrap();

        let profile = config.schema_profile().unwrap();
        assert_eq!(profile.key_fields.fields(), ["name", "type", "url"]);
        assert_eq!(
            profile.load_filter.as_ref().map(|filter| &filter.equals),
            Some(&json!("xyz"))
        );
        let on_insert: Vec<&str> = profile.on_insert.keys().map(String::as_str).collect();
        assert_eq!(on_insert, ["layer_order", "is_base_map"]);
        assert!(profile.derived[0].transliterate);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = CoreConfig::from_toml_str("[profile]\npreset = \"legacy\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(name) if name == "legacy"));
    }

    #[test]
    fn invalid_inline_profile_is_rejected() {
        let err = CoreConfig::from_toml_str("[profile]\nkey_fields = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProfile(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/maplayer.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/maplayer.toml"));
    }
}
