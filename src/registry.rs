use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::pipeline::{LoadInfo, Pipeline};
use crate::resource::Source;
use crate::sources::TmdbAPI;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::debug;

pub type Factory = fn(&Config) -> Result<(Pipeline, Source)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(LoadInfo),
    NotFound { name: String, available: Vec<String> },
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Outcome::Completed(load_info) => write!(f, "{}", load_info),
            Outcome::NotFound { name, available } => write!(
                f,
                "Pipeline '{}' not found. Available pipelines: {}",
                name,
                available.join(", ")
            ),
        }
    }
}

/// TMDB movies, TV shows, genres and watch providers.
pub fn tmdb(config: &Config) -> Result<(Pipeline, Source)> {
    let destination = db::from_config(&config.destination)?;
    let pipeline = Pipeline::new("api_tmdb", "dlt", destination).workers(config.extract.workers);
    let source = TmdbAPI::new(config).source()?;

    Ok((pipeline, source))
}

pub struct Registry {
    factories: BTreeMap<&'static str, Factory>,
}

impl Registry {
    pub fn new(entries: &[(&'static str, Factory)]) -> Result<Registry> {
        let mut factories = BTreeMap::new();

        for (name, factory) in entries {
            if name.trim().is_empty() {
                return Err(Error::Registry("Pipeline names cannot be empty.".to_owned()));
            }
            if factories.insert(*name, *factory).is_some() {
                return Err(Error::Registry(format!(
                    "Pipeline {} is registered more than once.",
                    name
                )));
            }
        }

        Ok(Registry { factories })
    }

    pub fn builtin() -> Result<Registry> {
        Registry::new(PIPELINES)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().map(|name| name.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn not_found(&self, name: &str) -> Outcome {
        Outcome::NotFound {
            name: name.to_owned(),
            available: self.names(),
        }
    }

    /// Unknown names are reported, not raised; nothing is built or fetched.
    pub async fn run(&self, name: &str, config: &Config) -> Result<Outcome> {
        let factory = match self.factories.get(name) {
            Some(factory) => factory,
            None => return Ok(self.not_found(name)),
        };

        debug!("Building pipeline {}.", name);
        let (pipeline, source) = factory(config)?;
        let load_info = pipeline.run(&source).await?;

        Ok(Outcome::Completed(load_info))
    }
}

/// Every pipeline this binary ships with.
pub const PIPELINES: &[(&str, Factory)] = &[("tmdb", tmdb)];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationConfig, Secrets};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting(config: &Config) -> Result<(Pipeline, Source)> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        tmdb(config)
    }

    fn memory_config(base_url: &str) -> Config {
        let mut config = Config::default();
        config.sources.api.tmdb.base_url = base_url.to_owned();
        config.destination = DestinationConfig::Memory;
        config.http.max_attempts = 1;
        config.sources.api.tmdb.token_secret = "sources.api.tmdb_registry_test.token".to_owned();
        config.secrets =
            Secrets::parse("[sources.api.tmdb_registry_test]\ntoken = \"test-token\"").unwrap();
        config
    }

    #[test]
    fn test_builtin_names() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.names(), vec!["tmdb"]);
        assert!(registry.contains("tmdb"));
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let err = Registry::new(&[("tmdb", tmdb as Factory), ("tmdb", tmdb as Factory)])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn test_new_rejects_empty_name() {
        assert!(Registry::new(&[(" ", tmdb as Factory)]).is_err());
    }

    #[tokio::test]
    async fn test_tmdb_factory() {
        let config = Config::default();
        let (pipeline, source) = tmdb(&config).unwrap();
        assert_eq!(pipeline.name(), "api_tmdb");
        assert_eq!(pipeline.dataset_name(), "dlt");
        assert_eq!(pipeline.destination().kind(), "mongodb");
        assert_eq!(source.name(), "api_tmdb");
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let registry = Registry::new(&[("counting", counting as Factory), ("tmdb", tmdb as Factory)]).unwrap();
        let config = memory_config(&server.url());
        let outcome = registry.run("nonexistent", &config).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::NotFound {
                name: "nonexistent".to_owned(),
                available: vec!["counting".to_owned(), "tmdb".to_owned()],
            }
        );
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(
            outcome.to_string(),
            "Pipeline 'nonexistent' not found. Available pipelines: counting, tmdb"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_tmdb() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/(movie|tv)/top_rated$".to_owned()))
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(json!({ "page": 1, "total_pages": 1, "results": [{ "id": 7 }] }).to_string())
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/genre/(movie|tv)/list$".to_owned()))
            .with_status(200)
            .with_body(json!({ "genres": [{ "id": 1, "name": "Drama" }] }).to_string())
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/(movie|tv)/7/watch/providers$".to_owned()))
            .with_status(200)
            .with_body(json!({ "id": 7, "results": { "BR": { "link": "br" } } }).to_string())
            .expect(2)
            .create_async()
            .await;

        let registry = Registry::builtin().unwrap();
        let config = memory_config(&server.url());
        let outcome = registry.run("tmdb", &config).await.unwrap();

        let load_info = match outcome {
            Outcome::Completed(load_info) => load_info,
            outcome => panic!("Unexpected outcome: {:?}", outcome),
        };
        assert_eq!(load_info.pipeline_name, "api_tmdb");
        assert_eq!(load_info.dataset_name, "dlt");
        assert_eq!(load_info.destination, "memory");
        assert_eq!(load_info.tables.len(), 6);
        assert_eq!(load_info.rows(), 6);
    }

    #[tokio::test]
    async fn test_run_propagates_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let config = memory_config(&server.url());
        let err = Registry::builtin().unwrap().run("tmdb", &config).await.unwrap_err();

        assert!(err.is_authentication());
    }
}
