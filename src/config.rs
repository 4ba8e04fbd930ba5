use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::app::MirrorOptions;
use crate::download::RetryPolicy;
use crate::error::MirrorError;
use crate::extract::SiteLayout;

pub const DEFAULT_CONFIG_FILE: &str = "smirror.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog_dir: Option<String>,
    #[serde(default)]
    pub library_dir: Option<String>,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub layout: SiteLayout,
    #[serde(default)]
    pub oldest_first: Option<bool>,
    #[serde(default)]
    pub probe_items: Option<bool>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Where the polling loop finds works. `{page}` in the template is replaced
/// by 1..=pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url_template: String,
    pub pages: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url_template: "https://asuratoon.com/manga/?page={page}&order=update".to_string(),
            pages: 9,
        }
    }
}

impl IndexConfig {
    pub fn page_urls(&self) -> Vec<String> {
        (1..=self.pages)
            .map(|page| self.url_template.replace("{page}", &page.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog_dir: Utf8PathBuf,
    pub library_dir: Utf8PathBuf,
    pub index: IndexConfig,
    pub layout: SiteLayout,
    pub options: MirrorOptions,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `smirror.json` in the current directory. Without an
    /// explicit path a missing file means "all defaults".
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MirrorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MirrorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MirrorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MirrorError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let catalog_dir = match config.catalog_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_dir()?.join("catalog"),
        };
        let library_dir = match config.library_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_dir()?.join("library"),
        };
        if config.index.pages > 0 && !config.index.url_template.contains("{page}") {
            return Err(MirrorError::ConfigParse(
                "index.url_template must contain {page}".to_string(),
            ));
        }
        let retry = config.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(MirrorError::ConfigParse(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            catalog_dir,
            library_dir,
            index: config.index,
            layout: config.layout,
            options: MirrorOptions {
                oldest_first: config.oldest_first.unwrap_or(true),
                probe_items: config.probe_items.unwrap_or(true),
                retry,
            },
            poll_interval: Duration::from_secs(config.poll_interval_secs.unwrap_or(60)),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(30)),
        })
    }
}

fn default_data_dir() -> Result<Utf8PathBuf, MirrorError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("serial-mirror")).ok()
        })
        .ok_or_else(|| MirrorError::Filesystem("unable to resolve data directory".to_string()))
}
