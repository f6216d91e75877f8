use crate::db::Destination;
use crate::resource::{Resource, Source, Transformer};
use crate::Result;

use futures::{future::try_join_all, pin_mut, TryStreamExt};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    time::{Duration, Instant},
};
use time::OffsetDateTime;
use tracing::{debug, info};

const DEFAULT_WORKERS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadInfo {
    pub pipeline_name: String,
    pub dataset_name: String,
    pub destination: String,
    pub source_name: String,
    pub load_id: String,
    pub tables: BTreeMap<String, usize>,
    pub elapsed: Duration,
}

impl LoadInfo {
    pub fn rows(&self) -> usize {
        self.tables.values().sum()
    }
}

impl Display for LoadInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(
            f,
            "Pipeline {} load step completed in {:.2?}",
            self.pipeline_name, self.elapsed
        )?;
        write!(
            f,
            "Load package {} loaded {} rows from {} to destination {} and into dataset {}",
            self.load_id,
            self.rows(),
            self.source_name,
            self.destination,
            self.dataset_name
        )?;
        for (table, rows) in &self.tables {
            write!(f, "\n  {}: {} rows", table, rows)?;
        }

        Ok(())
    }
}

/// Runs a source into a destination. One run is one load package.
pub struct Pipeline {
    name: String,
    dataset_name: String,
    destination: Box<dyn Destination>,
    workers: usize,
}

impl Pipeline {
    pub fn new(name: &str, dataset_name: &str, destination: Box<dyn Destination>) -> Pipeline {
        Pipeline {
            name: name.to_owned(),
            dataset_name: dataset_name.to_owned(),
            destination,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn workers(mut self, workers: usize) -> Pipeline {
        self.workers = workers.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    fn new_load_id() -> String {
        let now = OffsetDateTime::now_utc();
        format!("{}.{:06}", now.unix_timestamp(), now.microsecond())
    }

    pub async fn run(&self, source: &Source) -> Result<LoadInfo> {
        let start = Instant::now();
        let load_id = Self::new_load_id();
        info!(
            "Pipeline {} extracting {} into {}.{} (load {}).",
            self.name,
            source.name(),
            self.destination.kind(),
            self.dataset_name,
            load_id
        );

        let (parallel, sequential): (Vec<&Resource>, Vec<&Resource>) =
            source.resources().partition(|resource| resource.is_parallelized());

        let mut counts = try_join_all(
            parallel
                .into_iter()
                .map(|resource| self.extract_resource(source, resource, &load_id)),
        )
        .await?;
        for resource in sequential {
            counts.push(self.extract_resource(source, resource, &load_id).await?);
        }

        let mut tables = BTreeMap::new();
        for (table, rows) in counts.into_iter().flatten() {
            *tables.entry(table).or_insert(0) += rows;
        }

        Ok(LoadInfo {
            pipeline_name: self.name.clone(),
            dataset_name: self.dataset_name.clone(),
            destination: self.destination.kind().to_owned(),
            source_name: source.name().to_owned(),
            load_id,
            tables,
            elapsed: start.elapsed(),
        })
    }

    async fn extract_resource(
        &self,
        source: &Source,
        resource: &Resource,
        load_id: &str,
    ) -> Result<BTreeMap<String, usize>> {
        let client = source.client();
        let transformers: Vec<&Transformer> = source.transformers_of(resource.name()).collect();

        let mut counts = BTreeMap::new();
        counts.insert(resource.name().to_owned(), 0);
        for transformer in &transformers {
            counts.insert(transformer.name().to_owned(), 0);
        }

        let pages = client.paginate(resource.request());
        pin_mut!(pages);

        while let Some(page) = pages.try_next().await? {
            let records = resource.map(page.records);
            self.destination
                .load(&self.dataset_name, resource.name(), load_id, &records)
                .await?;
            *counts.entry(resource.name().to_owned()).or_insert(0) += records.len();
            info!(
                "{}: page {} loaded {} rows.",
                resource.name(),
                page.number,
                records.len()
            );

            for transformer in &transformers {
                let derived = transformer.fan_out(client, &records, self.workers).await?;
                self.destination
                    .load(&self.dataset_name, transformer.name(), load_id, &derived)
                    .await?;
                *counts.entry(transformer.name().to_owned()).or_insert(0) += derived.len();
                debug!(
                    "{}: loaded {} rows for page {} of {}.",
                    transformer.name(),
                    derived.len(),
                    page.number,
                    resource.name()
                );
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BearerTokenAuth, RestClient};
    use crate::config::HttpConfig;
    use crate::db::Memory;
    use crate::paginator::Paginator;
    use crate::selector::DataSelector;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn test_client(url: &str) -> RestClient {
        let config = HttpConfig {
            timeout_secs: 5,
            max_attempts: 1,
            backoff_factor_ms: 1,
            max_delay_ms: 1,
        };
        RestClient::new(url, BearerTokenAuth::new("test-token"), &config).unwrap()
    }

    #[test]
    fn test_load_info_display() {
        let info = LoadInfo {
            pipeline_name: "api_tmdb".to_owned(),
            dataset_name: "dlt".to_owned(),
            destination: "memory".to_owned(),
            source_name: "api_tmdb".to_owned(),
            load_id: "1.000000".to_owned(),
            tables: BTreeMap::from([("movie".to_owned(), 2), ("tv".to_owned(), 3)]),
            elapsed: Duration::from_millis(5),
        };
        let display = info.to_string();
        assert_eq!(info.rows(), 5);
        assert!(display.starts_with("Pipeline api_tmdb load step completed"));
        assert!(display.contains("movie: 2 rows"));
    }

    #[tokio::test]
    async fn test_run_loads_resources_and_transformers() {
        let mut server = Server::new_async().await;
        for page in 1..=2 {
            server
                .mock("GET", "/items")
                .match_query(Matcher::UrlEncoded("page".into(), page.to_string()))
                .with_status(200)
                .with_body(
                    json!({ "total_pages": 2, "results": [{ "id": page }] }).to_string(),
                )
                .expect(1)
                .create_async()
                .await;
        }
        let details = server
            .mock("GET", Matcher::Regex(r"^/items/\d+$".to_owned()))
            .with_status(200)
            .with_body(json!({ "id": 0, "detail": true }).to_string())
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/kinds")
            .with_status(200)
            .with_body(json!({ "kinds": ["a", "b", "c"] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let items = Resource::builder("items", "items")
            .paginator(Paginator::page_number(1, "page", "total_pages").unwrap())
            .data_selector(DataSelector::path("results").unwrap())
            .parallelized(true)
            .build();
        let kinds = Resource::builder("kinds", "kinds")
            .data_selector(DataSelector::path("kinds").unwrap())
            .build();
        let item_details = Transformer::builder("item_details", &items, "items/{id}")
            .add_map(|value| json!({ "detail": value["detail"] }))
            .build();
        let source = Source::new(
            "test",
            test_client(&server.url()),
            vec![items.into(), kinds.into(), item_details.into()],
        )
        .unwrap();

        let memory = Memory::new();
        let pipeline = Pipeline::new("test_pipeline", "test_dataset", Box::new(memory.clone()));
        let info = pipeline.run(&source).await.unwrap();

        assert_eq!(info.tables.get("items"), Some(&2));
        assert_eq!(info.tables.get("kinds"), Some(&3));
        assert_eq!(info.tables.get("item_details"), Some(&2));
        assert_eq!(info.rows(), 7);
        assert_eq!(
            memory.table("test_dataset", "item_details").await,
            vec![json!({ "detail": true }), json!({ "detail": true })]
        );
        assert_eq!(
            memory.table("test_dataset", "items").await,
            vec![json!({ "id": 1 }), json!({ "id": 2 })]
        );
        details.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_aborts_on_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/items")
            .with_status(401)
            .create_async()
            .await;

        let items = Resource::builder("items", "items").build();
        let source = Source::new("test", test_client(&server.url()), vec![items.into()]).unwrap();
        let pipeline = Pipeline::new("test_pipeline", "test_dataset", Box::new(Memory::new()));
        let err = pipeline.run(&source).await.unwrap_err();

        assert!(err.is_authentication());
    }
}
