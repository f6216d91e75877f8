use crate::db::Destination;
use crate::Result;

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

/// In-process tables keyed by `(dataset, table)`. Clones share the tables.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    tables: Arc<Mutex<BTreeMap<(String, String), Vec<Value>>>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    pub async fn table(&self, dataset: &str, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(&(dataset.to_owned(), table.to_owned()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Destination for Memory {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn load(
        &self,
        dataset: &str,
        table: &str,
        _load_id: &str,
        records: &[Value],
    ) -> Result<()> {
        self.tables
            .lock()
            .await
            .entry((dataset.to_owned(), table.to_owned()))
            .or_default()
            .extend_from_slice(records);

        Ok(())
    }
}
