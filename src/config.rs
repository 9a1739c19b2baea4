// Project configuration for devboot
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, DevbootError, Result};

pub const CONFIG_FILE_NAME: &str = "devboot.toml";
pub const DATA_DIR_ENV: &str = "DEVBOOT_DATA_DIR";
pub const CACHE_DIR_ENV: &str = "DEVBOOT_CACHE_DIR";

const DEFAULT_DESCRIPTORS_DIR: &str = "devboot";
const DEFAULT_RECORDS_DIR: &str = ".devboot/records";
const APP_DIR_NAME: &str = "devboot";

/// On-disk shape of `devboot.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub http: HttpSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub descriptors: Option<PathBuf>,
    pub records: Option<PathBuf>,
    pub installations: Option<PathBuf>,
    pub cache: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct HttpSection {
    pub max_attempts: Option<u32>,
    pub max_retry_after_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

/// HTTP retrieval settings after defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub max_attempts: u32,
    pub max_retry_after: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_retry_after: Duration::from_secs(120),
            timeout: Duration::from_secs(300),
            user_agent: format!("devboot/{}", crate::VERSION),
        }
    }
}

/// Resolved configuration: every path is absolute or project-relative joined
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub descriptors_dir: PathBuf,
    pub records_dir: PathBuf,
    pub installations_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub http: HttpSettings,
}

impl Config {
    /// Load configuration for a project.
    ///
    /// An explicitly given config file must exist; the default
    /// `devboot.toml` in the project directory is optional.
    pub fn load(project_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let (path, required) = match config_path {
            Some(path) if path.is_absolute() => (path.to_path_buf(), true),
            Some(path) => (project_dir.join(path), true),
            None => (project_dir.join(CONFIG_FILE_NAME), false),
        };

        let file = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            Self::parse_file(&content, Some(&path))?
        } else if required {
            return Err(DevbootError::Config(Box::new(ConfigError::NotFound {
                path,
                suggestion: Some(format!(
                    "Create {CONFIG_FILE_NAME} in the project root or omit --config"
                )),
            })));
        } else {
            ConfigFile::default()
        };

        Self::resolve(project_dir, file, |key| std::env::var(key).ok())
    }

    pub fn from_toml(project_dir: &Path, toml: &str) -> Result<Self> {
        let file = Self::parse_file(toml, None)?;
        Self::resolve(project_dir, file, |key| std::env::var(key).ok())
    }

    fn parse_file(content: &str, file_path: Option<&Path>) -> Result<ConfigFile> {
        toml::from_str(content).map_err(|e| {
            let mut config_error = *Box::<ConfigError>::from(e);
            if let ConfigError::InvalidToml {
                file_path: ref mut slot,
                ..
            } = config_error
            {
                *slot = file_path.map(Path::to_path_buf);
            }
            DevbootError::Config(Box::new(config_error))
        })
    }

    /// Apply defaults and environment overrides to a parsed file.
    pub fn resolve<F>(project_dir: &Path, file: ConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_dir = project_dir.to_path_buf();
        let anchor = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                project_dir.join(path)
            }
        };

        let descriptors_dir = anchor(
            file.paths
                .descriptors
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESCRIPTORS_DIR)),
        );
        let records_dir = anchor(
            file.paths
                .records
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDS_DIR)),
        );

        let installations_dir = match env(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(data_dir) => PathBuf::from(data_dir).join("installations"),
            None => match file.paths.installations {
                Some(path) => anchor(path),
                None => default_data_dir()?.join("installations"),
            },
        };

        let cache_dir = match env(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(cache_dir) => PathBuf::from(cache_dir),
            None => match file.paths.cache {
                Some(path) => anchor(path),
                None => default_cache_dir()?,
            },
        };

        let defaults = HttpSettings::default();
        let http = HttpSettings {
            max_attempts: file.http.max_attempts.unwrap_or(defaults.max_attempts),
            max_retry_after: file
                .http
                .max_retry_after_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_retry_after),
            timeout: file
                .http
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: file.http.user_agent.unwrap_or(defaults.user_agent),
        };

        let config = Self {
            project_dir,
            descriptors_dir,
            records_dir,
            installations_dir,
            cache_dir,
            http,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.http.max_attempts == 0 {
            return Err(DevbootError::Config(Box::new(ConfigError::InvalidValue {
                field: "http.max-attempts".to_string(),
                value: "0".to_string(),
                expected: "a positive attempt count".to_string(),
            })));
        }
        if self.http.timeout.is_zero() {
            return Err(DevbootError::Config(Box::new(ConfigError::InvalidValue {
                field: "http.timeout-secs".to_string(),
                value: "0".to_string(),
                expected: "a positive number of seconds".to_string(),
            })));
        }
        Ok(())
    }

    /// `{descriptors_dir}/{language}.toml`
    pub fn descriptor_document(&self, language: &str) -> PathBuf {
        self.descriptors_dir.join(format!("{language}.toml"))
    }

    /// `{records_dir}/{language}`
    pub fn records_dir_for(&self, language: &str) -> PathBuf {
        self.records_dir.join(language)
    }

    /// `{installations_dir}/{language}/{provider}`
    pub fn installations_root(&self, language: &str, provider: &str) -> PathBuf {
        self.installations_dir.join(language).join(provider)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Checkouts of auxiliary tool repositories
    pub fn tools_dir(&self) -> PathBuf {
        self.cache_dir.join("tools")
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            DevbootError::Config(Box::new(ConfigError::DirectoryUnavailable {
                what: "data".to_string(),
                suggestion: Some(format!("Set {DATA_DIR_ENV}")),
            }))
        })
}

fn default_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            DevbootError::Config(Box::new(ConfigError::DirectoryUnavailable {
                what: "cache".to_string(),
                suggestion: Some(format!("Set {CACHE_DIR_ENV}")),
            }))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(toml: &str) -> ConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_defaults_are_project_relative() {
        let config = Config::resolve(
            Path::new("/work/project"),
            ConfigFile::default(),
            env_from(&[(DATA_DIR_ENV, "/data"), (CACHE_DIR_ENV, "/cache")]),
        )
        .unwrap();

        assert_eq!(config.descriptors_dir, PathBuf::from("/work/project/devboot"));
        assert_eq!(
            config.records_dir,
            PathBuf::from("/work/project/.devboot/records")
        );
        assert_eq!(config.installations_dir, PathBuf::from("/data/installations"));
        assert_eq!(config.cache_dir, PathBuf::from("/cache"));
        assert_eq!(config.http, HttpSettings::default());
    }

    #[test]
    fn test_file_values_apply() {
        let file = parse(
            r#"
[paths]
descriptors = "config/languages"
installations = "/opt/runtimes"
cache = "cache"

[http]
max-attempts = 3
max-retry-after-secs = 60
"#,
        );
        let config = Config::resolve(Path::new("/p"), file, env_from(&[])).unwrap();

        assert_eq!(
            config.descriptor_document("python"),
            PathBuf::from("/p/config/languages/python.toml")
        );
        assert_eq!(config.installations_dir, PathBuf::from("/opt/runtimes"));
        assert_eq!(config.cache_dir, PathBuf::from("/p/cache"));
        assert_eq!(config.http.max_attempts, 3);
        assert_eq!(config.http.max_retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = parse("[paths]\ninstallations = \"/opt/runtimes\"\n");
        let config =
            Config::resolve(Path::new("/p"), file, env_from(&[(DATA_DIR_ENV, "/env")])).unwrap();
        assert_eq!(config.installations_dir, PathBuf::from("/env/installations"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let file = parse("[http]\nmax-attempts = 0\n");
        let error = Config::resolve(Path::new("/p"), file, env_from(&[(DATA_DIR_ENV, "/d")]))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: std::result::Result<ConfigFile, _> = toml::from_str("[paths]\nbogus = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_installation_roots() {
        let config = Config::resolve(
            Path::new("/p"),
            ConfigFile::default(),
            env_from(&[(DATA_DIR_ENV, "/d"), (CACHE_DIR_ENV, "/c")]),
        )
        .unwrap();
        assert_eq!(
            config.installations_root("python", "prebuilt"),
            PathBuf::from("/d/installations/python/prebuilt")
        );
        assert_eq!(
            config.records_dir_for("python"),
            PathBuf::from("/p/.devboot/records/python")
        );
        assert_eq!(config.downloads_dir(), PathBuf::from("/c/downloads"));
    }
}
