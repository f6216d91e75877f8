pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod paginator;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod selector;
pub mod sources;
pub mod transform;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{LoadInfo, Pipeline};
pub use registry::{Outcome, Registry};
pub use resource::{Resource, Source, Transformer};
pub use transform::watch_providers_selector;
