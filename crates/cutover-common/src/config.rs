//! ---
//! cutover_section: "01-common"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Typed install settings assembled from layered sources."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::logging::LoggingConfig;
use crate::settings::{RawSettings, SettingsError};

/// Registry, data and secure ports handed to the admin `ports` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub registry: u16,
    pub tcp: u16,
    pub ssl: u16,
}

/// Fully resolved settings for one install or upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    pub ports: PortSettings,
    /// Stable pointer naming the active instance.
    pub sym: PathBuf,
    pub skip_web: bool,
    pub skip_delete: bool,
    pub skip_delete_zip: bool,
    /// Environment variable names recorded after a successful upgrade.
    pub save_vars: Vec<String>,
    pub save_vars_file: PathBuf,
    /// Admin executable, relative to an instance directory.
    pub admin_binary: PathBuf,
    /// Service configuration file, relative to an instance directory.
    pub config_file: PathBuf,
    /// Destination for extracted release archives.
    pub unzip_dir: PathBuf,
    pub logging: LoggingConfig,
}

/// Settings together with the file they were read from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: InstallSettings,
    pub source: Option<PathBuf>,
    /// Resolved string values, kept for diagnostics.
    pub resolved: IndexMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(flatten)]
    values: IndexMap<String, toml::Value>,
}

impl InstallSettings {
    pub const ENV_CONFIG_PATH: &'static str = "CUTOVER_CONFIG";

    /// Load settings with precedence defaults < file < environment < overrides.
    ///
    /// The file is `file` when given, otherwise `CUTOVER_CONFIG` from `env`
    /// when set and non-empty. Running without any file is valid.
    pub fn load(
        file: Option<&Path>,
        env: &IndexMap<String, String>,
        overrides: &IndexMap<String, String>,
    ) -> Result<LoadedSettings> {
        let mut raw = RawSettings::defaults();
        let mut logging = LoggingConfig::default();

        let source = file.map(Path::to_path_buf).or_else(|| {
            env.get(Self::ENV_CONFIG_PATH)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = &source {
            logging = apply_file(&mut raw, path)?;
        }

        raw.apply_env(env.iter().map(|(k, v)| (k.as_str(), v.clone())));
        for (key, value) in overrides {
            raw.set(key, value.clone())
                .with_context(|| format!("invalid command-line override '{key}'"))?;
        }

        let resolved = raw.resolve()?;
        let settings = Self::from_resolved(&resolved, logging)?;
        Ok(LoadedSettings {
            settings,
            source,
            resolved,
        })
    }

    /// Build typed settings from already-resolved values.
    pub fn from_resolved(
        resolved: &IndexMap<String, String>,
        logging: LoggingConfig,
    ) -> Result<Self, SettingsError> {
        let get = |key: &str| {
            resolved
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| SettingsError::Missing(key.to_owned()))
        };
        Ok(Self {
            ports: PortSettings {
                registry: parse_port("registry", get("registry")?)?,
                tcp: parse_port("tcp", get("tcp")?)?,
                ssl: parse_port("ssl", get("ssl")?)?,
            },
            sym: PathBuf::from(get("sym")?),
            skip_web: parse_bool("skipweb", get("skipweb")?)?,
            skip_delete: parse_bool("skipdelete", get("skipdelete")?)?,
            skip_delete_zip: parse_bool("skipdeletezip", get("skipdeletezip")?)?,
            save_vars: get("savevars")?
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            save_vars_file: PathBuf::from(get("savevarsfile")?),
            admin_binary: PathBuf::from(get("admin_binary")?),
            config_file: PathBuf::from(get("config_file")?),
            unzip_dir: PathBuf::from(get("unzipdir")?),
            logging,
        })
    }

    /// Settings built from the defaults alone.
    pub fn defaults() -> Result<Self, SettingsError> {
        let resolved = RawSettings::defaults().resolve()?;
        Self::from_resolved(&resolved, LoggingConfig::default())
    }
}

fn apply_file(raw: &mut RawSettings, path: &Path) -> Result<LoggingConfig> {
    debug!(config_path = %path.display(), "loading settings file");
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file {}", path.display()))?;
    let file: SettingsFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    for (key, value) in &file.values {
        let text = toml_value_to_setting(key, value)?;
        raw.set(key, text)
            .with_context(|| format!("invalid entry in settings file {}", path.display()))?;
    }
    Ok(file.logging)
}

fn toml_value_to_setting(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.clone()),
                other => Err(anyhow!(
                    "setting '{key}' must be a list of strings, found {}",
                    other.type_str()
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(|parts| parts.join(" ")),
        other => Err(anyhow!(
            "setting '{key}' has unsupported type {}",
            other.type_str()
        )),
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, SettingsError> {
    value.trim().parse::<u16>().map_err(|_| SettingsError::Invalid {
        key: key.to_owned(),
        expected: "port number",
        value: value.to_owned(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(SettingsError::Invalid {
            key: key.to_owned(),
            expected: "boolean",
            value: value.to_owned(),
        }),
    }
}
