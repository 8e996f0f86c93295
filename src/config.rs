use crate::metrics::Options;
use crate::parser::{DEFAULT_EXCLUDE_DIRS, DEFAULT_EXTENSIONS};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = ".depmetric.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub exclude_packages: Vec<String>,
    pub analyzer_paths: Vec<PathBuf>,
    pub parallel: bool,
    pub cascade_disabled: bool,
    pub cache_dir: Option<PathBuf>,
    pub options: Options,
    /// Report id to output target (`-` for stdout), in declaration order.
    pub reports: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    sources: Option<Vec<PathBuf>>,
    extensions: Option<Vec<String>>,
    exclude_dirs: Option<Vec<String>>,
    exclude_packages: Option<Vec<String>>,
    analyzer_paths: Option<Vec<PathBuf>>,
    parallel: Option<bool>,
    cascade_disabled: Option<bool>,
    cache_dir: Option<PathBuf>,
    options: Option<BTreeMap<String, String>>,
    reports: Option<IndexMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_packages: Vec::new(),
            analyzer_paths: Vec::new(),
            parallel: false,
            cascade_disabled: false,
            cache_dir: None,
            options: Options::new(),
            reports: IndexMap::new(),
        }
    }
}

impl Config {
    /// Loads `.depmetric.toml` from `project_path`, or the defaults when
    /// there is none.
    pub fn load(project_path: &Path) -> Result<Self, ConfigError> {
        let config_path = project_path.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_file(&config_path)
    }

    /// Loads an explicit config file. Relative paths inside it are resolved
    /// against the file's directory.
    pub fn load_file(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path)?;
        let base = config_path.parent().unwrap_or(Path::new(""));
        let config = Self::from_toml(&content, base)?;
        tracing::debug!(path = %config_path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let defaults = Self::default();
        let resolve = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
            paths.into_iter().map(|p| base.join(p)).collect()
        };

        Ok(Self {
            sources: raw.sources.map(resolve).unwrap_or_default(),
            extensions: raw.extensions.unwrap_or(defaults.extensions),
            exclude_dirs: raw.exclude_dirs.unwrap_or(defaults.exclude_dirs),
            exclude_packages: raw.exclude_packages.unwrap_or_default(),
            analyzer_paths: raw.analyzer_paths.map(resolve).unwrap_or_default(),
            parallel: raw.parallel.unwrap_or(false),
            cascade_disabled: raw.cascade_disabled.unwrap_or(false),
            cache_dir: raw.cache_dir.map(|dir| base.join(dir)),
            options: raw
                .options
                .map(|map| map.into_iter().collect())
                .unwrap_or_default(),
            reports: raw
                .reports
                .map(|reports| {
                    reports
                        .into_iter()
                        .map(|(id, target)| {
                            let target = match target.trim() {
                                "-" => target,
                                path => base.join(path).display().to_string(),
                            };
                            (id, target)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
