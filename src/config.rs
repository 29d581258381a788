use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::YamasError;

pub const CONFIG_FILE: &str = "yamas.json";
pub const DEFAULT_THREADS: usize = 12;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub keep_raw: Option<bool>,
    #[serde(default)]
    pub profiler_database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Directory under which `<dataset>` workspaces are created.
    pub base_dir: Utf8PathBuf,
    pub threads: usize,
    pub keep_raw: bool,
    pub profiler_database: Option<Utf8PathBuf>,
    /// File the values came from; `None` when only defaults apply.
    pub source: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            base_dir: Utf8PathBuf::from("."),
            threads: DEFAULT_THREADS,
            keep_raw: false,
            profiler_database: None,
            source: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Otherwise `./yamas.json`, then the user config
    /// directory, then built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, YamasError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::candidates().into_iter().find(|path| path.is_file()),
        };
        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(ResolvedConfig::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| YamasError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| YamasError::ConfigParse(err.to_string()))?;
        tracing::debug!(config = %config_path.display(), "loaded config");

        let mut resolved = Self::resolve_config(config)?;
        resolved.source = Some(config_path);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, YamasError> {
        let defaults = ResolvedConfig::default();
        let threads = config.threads.unwrap_or(defaults.threads);
        if threads == 0 {
            return Err(YamasError::ConfigParse(
                "threads must be at least 1".to_string(),
            ));
        }
        let base_dir = match config.specific_location {
            Some(location) if !location.trim().is_empty() => Utf8PathBuf::from(location.trim()),
            _ => defaults.base_dir,
        };

        Ok(ResolvedConfig {
            base_dir,
            threads,
            keep_raw: config.keep_raw.unwrap_or(defaults.keep_raw),
            profiler_database: config
                .profiler_database
                .filter(|db| !db.trim().is_empty())
                .map(Utf8PathBuf::from),
            source: None,
        })
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("", "", "yamas") {
            candidates.push(dirs.config_dir().join(CONFIG_FILE));
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved, ResolvedConfig::default());
        assert_eq!(resolved.threads, 12);
    }

    #[test]
    fn blank_location_falls_back_to_current_dir() {
        let config = Config {
            specific_location: Some("  ".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.base_dir, Utf8PathBuf::from("."));
    }
}
