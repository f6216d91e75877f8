use crate::db::Destination;
use crate::error::{Error, Result};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, ServerAddress};
use serde_json::Value;
use std::{collections::hash_map::DefaultHasher, hash::Hasher};
use tracing::debug;

const APP_NAME: &str = "catalog-pipelines";

#[derive(Debug, Clone)]
pub struct MongoDB {
    pub client: mongodb::Client,
}

impl MongoDB {
    /// Does not connect; the driver connects on first use.
    pub fn new(host: &str) -> Result<MongoDB> {
        let address = ServerAddress::parse(host)
            .map_err(|err| Error::Config(format!("Invalid MongoDB host {}: {}", host, err)))?;
        let options = ClientOptions::builder()
            .hosts(vec![address])
            .app_name(APP_NAME.to_owned())
            .build();
        let client = mongodb::Client::with_options(options)?;

        Ok(MongoDB { client })
    }

    pub fn hash_record(record: &Value) -> String {
        let mut hasher = DefaultHasher::new();
        hasher.write(record.to_string().as_bytes());
        format!("{:x}", hasher.finish())
    }

    pub fn to_document(record: &Value, load_id: &str) -> Result<Document> {
        let mut document = match bson::to_bson(record)? {
            Bson::Document(document) => document,
            value => doc! { "value": value },
        };
        document.insert("_load_id", load_id);
        document.insert("_hash", Self::hash_record(record));

        Ok(document)
    }
}

#[async_trait]
impl Destination for MongoDB {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    async fn load(
        &self,
        dataset: &str,
        table: &str,
        load_id: &str,
        records: &[Value],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let documents = records
            .iter()
            .map(|record| Self::to_document(record, load_id))
            .collect::<Result<Vec<Document>>>()?;

        let collection = self
            .client
            .database(dataset)
            .collection::<Document>(table);
        let result = collection.insert_many(documents, None).await?;
        debug!(
            "Inserted {} documents into {}.{}.",
            result.inserted_ids.len(),
            dataset,
            table
        );

        Ok(())
    }
}
