pub mod memory;
pub mod mongodb;

pub use self::memory::Memory;
pub use self::mongodb::MongoDB;

use crate::config::DestinationConfig;
use crate::Result;

use async_trait::async_trait;
use serde_json::Value;

/// Where extracted records end up. Tables are addressed by dataset and table
/// name; every call appends.
#[async_trait]
pub trait Destination: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn load(
        &self,
        dataset: &str,
        table: &str,
        load_id: &str,
        records: &[Value],
    ) -> Result<()>;
}

pub fn from_config(config: &DestinationConfig) -> Result<Box<dyn Destination>> {
    match config {
        DestinationConfig::Mongodb { host } => Ok(Box::new(MongoDB::new(host)?)),
        DestinationConfig::Memory => Ok(Box::new(Memory::new())),
    }
}
