//! Config file loading and per-source settings. Search order: `--config` path if given, else
//! ./mangarss.toml, then $XDG_CONFIG_HOME/mangarss/config.toml (or ~/.config/mangarss/config.toml).

use crate::model::FeedMetadata;
use crate::scraper::{DEFAULT_MAX_CHAPTERS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_CHAPTER_SELECTOR: &str = "div.comics-chapters";
pub const DEFAULT_DATE_SELECTOR: &str = "span.comic-update";

const BUILTIN_NAME: &str = "yirenzhixia";
const BUILTIN_URL: &str = "https://www.baozimh.com/comic/yirenzhixia-dongmantang";
const BUILTIN_TITLE: &str = "一人之下 - 包子漫画";
const BUILTIN_DESCRIPTION: &str = "一人之下漫画更新订阅";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Unknown source '{name}'. Configured sources: {known}")]
    UnknownSource { name: String, known: String },

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },
}

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory feeds are written to. Relative paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Page fetch timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Wall-clock limit for one source when running `all`.
    pub source_timeout_secs: Option<u64>,
    pub sources: Vec<SourceConfig>,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SourceConfig {
    /// Feed file stem and the name used on the command line.
    pub name: String,
    /// Comic page to scrape.
    pub url: String,
    /// Base for relative chapter links. Defaults to the scheme and host of `url`.
    pub origin: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    /// CSS selector for chapter containers (primary strategy).
    pub chapter_selector: Option<String>,
    /// Regex on anchor hrefs (fallback strategy). Defaults to `/comic/chapter/<slug>/`.
    pub chapter_link_pattern: Option<String>,
    /// CSS selector for the date element near each chapter link.
    pub date_selector: Option<String>,
    pub max_chapters: Option<usize>,
    /// Public URL of the feed, used for the Atom self link.
    pub feed_url: Option<String>,
}

/// A source with every default filled in, ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub origin: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub chapter_selector: String,
    pub chapter_link_pattern: String,
    pub date_selector: String,
    pub max_chapters: usize,
    pub feed_url: Option<String>,
    pub output_path: PathBuf,
}

impl Source {
    /// Channel metadata for this source. The self link is `feed_url` or the absolute output path.
    pub fn feed_metadata(&self) -> FeedMetadata {
        let self_url = self.feed_url.clone().unwrap_or_else(|| {
            let absolute = std::path::absolute(&self.output_path)
                .unwrap_or_else(|_| self.output_path.clone());
            format!("file://{}", absolute.display())
        });
        FeedMetadata {
            title: self.title.clone(),
            link: self.url.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            output_path: self.output_path.clone(),
            self_url,
        }
    }
}

fn builtin_source() -> SourceConfig {
    SourceConfig {
        name: BUILTIN_NAME.to_string(),
        url: BUILTIN_URL.to_string(),
        title: Some(BUILTIN_TITLE.to_string()),
        description: Some(BUILTIN_DESCRIPTION.to_string()),
        ..SourceConfig::default()
    }
}

/// Last non-empty path segment of the comic URL, e.g. `yirenzhixia-dongmantang`.
fn comic_slug(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(String::from)
}

impl SourceConfig {
    /// Fill in defaults. The output file is `<output_dir>/<name>.xml`.
    pub fn resolve(&self, output_dir: &Path) -> Result<Source, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSource {
            name: self.name.clone(),
            reason,
        };
        let name = self.name.trim();
        if name.is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(invalid("name must be a plain file stem".to_string()));
        }
        let url = Url::parse(&self.url).map_err(|e| invalid(format!("url {:?}: {}", self.url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid(format!("url {:?} has no host", self.url)))?;
        let origin = match &self.origin {
            Some(o) => o.clone(),
            None => match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            },
        };
        let chapter_link_pattern = match &self.chapter_link_pattern {
            Some(p) => p.clone(),
            None => {
                let slug = comic_slug(&url)
                    .ok_or_else(|| invalid("cannot derive chapter_link_pattern from url".to_string()))?;
                format!("/comic/chapter/{}/", regex::escape(&slug))
            }
        };
        let max_chapters = self.max_chapters.unwrap_or(DEFAULT_MAX_CHAPTERS);
        if max_chapters == 0 {
            return Err(invalid("max_chapters must be at least 1".to_string()));
        }
        Ok(Source {
            name: name.to_string(),
            url: self.url.clone(),
            origin,
            title: self.title.clone().unwrap_or_else(|| name.to_string()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| format!("{} updates", self.title.as_deref().unwrap_or(name))),
            language: self
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            chapter_selector: self
                .chapter_selector
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAPTER_SELECTOR.to_string()),
            chapter_link_pattern,
            date_selector: self
                .date_selector
                .clone()
                .unwrap_or_else(|| DEFAULT_DATE_SELECTOR.to_string()),
            max_chapters,
            feed_url: self.feed_url.clone(),
            output_path: output_dir.join(format!("{}.xml", name)),
        })
    }
}

impl Config {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn source_timeout_secs(&self) -> u64 {
        self.source_timeout_secs
            .unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS)
    }

    /// Configured sources, or the built-in one when none are configured.
    pub fn source_configs(&self) -> Vec<SourceConfig> {
        if self.sources.is_empty() {
            vec![builtin_source()]
        } else {
            self.sources.clone()
        }
    }

    /// All sources, resolved, in config order. Two sources with the same name are an error.
    pub fn resolve_sources(&self) -> Result<Vec<Source>, ConfigError> {
        let dir = self.output_dir();
        let configs = self.source_configs();
        check_unique_names(&configs)?;
        configs.iter().map(|s| s.resolve(&dir)).collect()
    }

    /// Resolve one source by name, or the first source when `name` is None.
    pub fn source(&self, name: Option<&str>) -> Result<Source, ConfigError> {
        let configs = self.source_configs();
        check_unique_names(&configs)?;
        let found = match name {
            None => configs.first(),
            Some(n) => configs.iter().find(|s| s.name.trim() == n),
        };
        match found {
            Some(s) => s.resolve(&self.output_dir()),
            None => Err(ConfigError::UnknownSource {
                name: name.unwrap_or_default().to_string(),
                known: configs
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Each name maps to one output file and one `run <name>` invocation.
fn check_unique_names(configs: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for s in configs {
        let name = s.name.trim();
        if !seen.insert(name) {
            return Err(ConfigError::InvalidSource {
                name: name.to_string(),
                reason: "duplicate source name".to_string(),
            });
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&s).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load config. An explicit path must exist. Otherwise the search order above applies and a
/// missing file yields the defaults. Invalid TOML or an unreadable present file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return read_config(path);
    }
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
    let mut paths = vec![cwd.join("mangarss.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mangarss").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            log::debug!("Using config {}", path.display());
            return read_config(path);
        }
    }
    Ok(Config::default())
}
