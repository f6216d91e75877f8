use crate::error::{Error, Result};

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

pub const CONFIG_DIR_ENV: &str = "PIPELINES_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TmdbApiConfig {
    pub base_url: String,
    pub regions: Vec<String>,
    /// Dotted secrets path of the bearer token.
    pub token_secret: String,
}

impl Default for TmdbApiConfig {
    fn default() -> TmdbApiConfig {
        TmdbApiConfig {
            base_url: "https://api.themoviedb.org/3/".to_owned(),
            regions: vec!["US".to_owned(), "BR".to_owned()],
            token_secret: "sources.api.tmdb.token".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiSourcesConfig {
    pub tmdb: TmdbApiConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub api: ApiSourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> ExtractConfig {
        ExtractConfig { workers: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_factor_ms: u64,
    pub max_delay_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_factor(&self) -> Duration {
        Duration::from_millis(self.backoff_factor_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> HttpConfig {
        HttpConfig {
            timeout_secs: 60,
            max_attempts: 5,
            backoff_factor_ms: 1000,
            max_delay_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Mongodb { host: String },
    Memory,
}

impl Default for DestinationConfig {
    fn default() -> DestinationConfig {
        DestinationConfig::Mongodb {
            host: "localhost:27017".to_owned(),
        }
    }
}

/// Secrets addressed by dotted path (`sources.api.tmdb.token`).
///
/// An environment variable named after the path (upper-cased, dots replaced
/// by `__`) takes precedence over the file.
#[derive(Debug, Clone)]
pub struct Secrets {
    table: toml::Value,
}

impl Secrets {
    pub fn parse(contents: &str) -> Result<Secrets> {
        let table: toml::Value = toml::from_str(contents)?;

        Ok(Secrets { table })
    }

    pub fn from_file(filename: impl AsRef<Path>) -> Result<Secrets> {
        let filename = filename.as_ref();
        if !filename.exists() {
            warn!("No secrets file at {}.", filename.display());
            return Ok(Secrets::default());
        }

        let contents = fs::read_to_string(filename)?;
        Self::parse(&contents)
    }

    pub fn env_key(path: &str) -> String {
        path.replace('.', "__").to_uppercase()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        if let Ok(value) = std::env::var(Self::env_key(path)) {
            if !value.is_empty() {
                return Some(value);
            }
        }

        path.split('.')
            .try_fold(&self.table, |value, key| value.get(key))
            .and_then(|value| value.as_str())
            .map(ToOwned::to_owned)
    }
}

impl Default for Secrets {
    fn default() -> Secrets {
        Secrets {
            table: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub extract: ExtractConfig,
    pub http: HttpConfig,
    pub destination: DestinationConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

impl Config {
    pub fn parse(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(filename: impl AsRef<Path>) -> Result<Config> {
        let contents = fs::read_to_string(filename.as_ref()).map_err(|err| {
            Error::Config(format!(
                "Could not read {}: {}",
                filename.as_ref().display(),
                err
            ))
        })?;

        Self::parse(&contents)
    }

    /// Reads `config.toml` and `secrets.toml` from `dir`. Either file may be
    /// missing.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let filename = dir.join("config.toml");
        let mut config = if filename.exists() {
            Self::from_file(filename)?
        } else {
            warn!("No config file at {}, using defaults.", filename.display());
            Config::default()
        };
        config.secrets = Secrets::from_file(dir.join("secrets.toml"))?;
        debug!("Loaded config from {}.", dir.display());

        Ok(config)
    }

    pub fn dir_from_env() -> PathBuf {
        std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
    }

    fn validate(&self) -> Result<()> {
        if self.extract.workers == 0 {
            return Err(Error::Config("extract.workers must be at least 1".to_owned()));
        }
        if self.http.max_attempts == 0 {
            return Err(Error::Config("http.max_attempts must be at least 1".to_owned()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file() {
        let config = Config::from_file("config/config.toml").unwrap();
        assert_eq!(
            config.sources.api.tmdb.base_url,
            "https://api.themoviedb.org/3/"
        );
        assert_eq!(config.sources.api.tmdb.regions, vec!["US", "BR"]);
        assert_eq!(config.sources.api.tmdb.token_secret, "sources.api.tmdb.token");
        assert_eq!(config.extract.workers, 5);
    }

    #[test]
    fn test_from_dir() {
        let config = Config::from_dir("config").unwrap();
        assert_eq!(config.extract.workers, 5);
    }

    #[test]
    fn test_from_dir_without_files_uses_defaults() {
        let config = Config::from_dir("config/does_not_exist").unwrap();
        assert_eq!(config.sources.api.tmdb.base_url, TmdbApiConfig::default().base_url);
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.destination, DestinationConfig::default());
        assert_eq!(config.secrets.get("sources.api.from_dir_test.token"), None);
    }

    #[test]
    fn test_from_dir_without_config_reads_env_token() {
        let path = "sources.api.from_dir_env_test.token";
        std::env::set_var(Secrets::env_key(path), "env-token");
        let config = Config::from_dir("config/does_not_exist").unwrap();
        assert_eq!(config.secrets.get(path), Some("env-token".to_owned()));
        std::env::remove_var(Secrets::env_key(path));
    }

    #[test]
    fn test_from_file_failure() {
        let err = Config::from_file("should_fail.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.destination, DestinationConfig::default());
    }

    #[test]
    fn test_parse_memory_destination() {
        let config = Config::parse(
            r#"
            [destination]
            kind = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.destination, DestinationConfig::Memory);
    }

    #[test]
    fn test_parse_rejects_zero_workers() {
        let err = Config::parse("[extract]\nworkers = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_secrets_dotted_path() {
        let secrets = Secrets::parse(
            r#"
            [sources.api.secrets_test]
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(
            secrets.get("sources.api.secrets_test.token"),
            Some("abc".to_owned())
        );
        assert_eq!(secrets.get("sources.api.secrets_test.missing"), None);
        assert_eq!(secrets.get("sources.other.token"), None);
    }

    #[test]
    fn test_secrets_env_override() {
        let path = "sources.api.secrets_env_test.token";
        std::env::set_var(Secrets::env_key(path), "from-env");
        let secrets = Secrets::parse("[sources.api.secrets_env_test]\ntoken = \"from-file\"").unwrap();
        assert_eq!(secrets.get(path), Some("from-env".to_owned()));
        std::env::remove_var(Secrets::env_key(path));
    }

    #[test]
    fn test_secrets_missing_file() {
        let secrets = Secrets::from_file("config/does_not_exist.toml").unwrap();
        assert_eq!(secrets.get("sources.api.missing_file_test.token"), None);
    }

    #[test]
    fn test_env_key() {
        assert_eq!(
            Secrets::env_key("sources.api.tmdb.token"),
            "SOURCES__API__TMDB__TOKEN"
        );
    }
}
