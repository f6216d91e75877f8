use crate::client::{PageRequest, RestClient};
use crate::error::{Error, Result};
use crate::paginator::Paginator;
use crate::selector::DataSelector;

use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::{collections::HashSet, fmt, sync::Arc};
use tracing::{debug, warn};

pub type MapFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

fn apply_maps(maps: &[MapFn], records: Vec<Value>) -> Vec<Value> {
    if maps.is_empty() {
        return records;
    }

    records
        .into_iter()
        .map(|record| maps.iter().fold(record, |record, map| map(record)))
        .collect()
}

/// A named sequence of records read from one endpoint.
#[derive(Clone)]
pub struct Resource {
    name: String,
    request: PageRequest,
    parallelized: bool,
    maps: Vec<MapFn>,
}

impl Resource {
    pub fn builder(name: &str, path: &str) -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource {
                name: name.to_owned(),
                request: PageRequest::new(path),
                parallelized: false,
                maps: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn is_parallelized(&self) -> bool {
        self.parallelized
    }

    pub fn map(&self, records: Vec<Value>) -> Vec<Value> {
        apply_maps(&self.maps, records)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("request", &self.request)
            .field("parallelized", &self.parallelized)
            .field("maps", &self.maps.len())
            .finish()
    }
}

pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    pub fn paginator(mut self, paginator: Paginator) -> ResourceBuilder {
        self.resource.request.paginator = paginator;
        self
    }

    pub fn data_selector(mut self, data_selector: DataSelector) -> ResourceBuilder {
        self.resource.request.data_selector = data_selector;
        self
    }

    pub fn parallelized(mut self, parallelized: bool) -> ResourceBuilder {
        self.resource.parallelized = parallelized;
        self
    }

    pub fn add_map<F>(mut self, map: F) -> ResourceBuilder
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.resource.maps.push(Arc::new(map));
        self
    }

    pub fn build(self) -> Resource {
        self.resource
    }
}

/// A request path with `{field}` placeholders filled from an upstream record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: &str) -> PathTemplate {
        PathTemplate(template.to_owned())
    }

    /// `None` when the record lacks a placeholder field. Values are
    /// percent-encoded as single path segments.
    pub fn render(&self, record: &Value) -> Option<String> {
        let mut path = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();

        while let Some(start) = rest.find('{') {
            let end = match rest[start + 1..].find('}') {
                Some(end) => start + 1 + end,
                None => break,
            };
            let value = match record.get(&rest[start + 1..end])? {
                Value::String(value) => value.clone(),
                Value::Number(value) => value.to_string(),
                Value::Bool(value) => value.to_string(),
                _ => return None,
            };

            path.push_str(&rest[..start]);
            path.push_str(&urlencoding::encode(&value));
            rest = &rest[end + 1..];
        }
        path.push_str(rest);

        Some(path)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resource fed by another resource: one extra fetch per upstream record.
#[derive(Clone)]
pub struct Transformer {
    name: String,
    upstream: String,
    path: PathTemplate,
    paginator: Paginator,
    data_selector: DataSelector,
    parallelized: bool,
    maps: Vec<MapFn>,
}

impl Transformer {
    pub fn builder(name: &str, upstream: &Resource, path: &str) -> TransformerBuilder {
        TransformerBuilder {
            transformer: Transformer {
                name: name.to_owned(),
                upstream: upstream.name().to_owned(),
                path: PathTemplate::new(path),
                paginator: Paginator::SinglePage,
                data_selector: DataSelector::root(),
                parallelized: false,
                maps: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn is_parallelized(&self) -> bool {
        self.parallelized
    }

    pub fn request_for(&self, record: &Value) -> Option<PageRequest> {
        let path = self.path.render(record)?;

        Some(
            PageRequest::new(&path)
                .paginator(self.paginator.clone())
                .data_selector(self.data_selector.clone()),
        )
    }

    /// Fetches once per upstream record that can fill the path template.
    /// Output order follows `records` unless the transformer is parallelized.
    pub async fn fan_out(
        &self,
        client: &RestClient,
        records: &[Value],
        workers: usize,
    ) -> Result<Vec<Value>> {
        let requests: Vec<PageRequest> = records
            .iter()
            .filter_map(|record| {
                let request = self.request_for(record);
                if request.is_none() {
                    warn!(
                        "Skipping record for {}: cannot fill {} from {}.",
                        self.name, self.path, record
                    );
                }
                request
            })
            .collect();
        debug!("{} fanning out {} requests.", self.name, requests.len());

        let fetches = stream::iter(requests).map(|request| async move {
            let records = client.fetch_all(&request).await?;
            Ok::<_, Error>(apply_maps(&self.maps, records))
        });

        let results: Vec<Vec<Value>> = if self.parallelized {
            fetches.buffer_unordered(workers.max(1)).try_collect().await?
        } else {
            fetches.buffered(1).try_collect().await?
        };

        Ok(results.into_iter().flatten().collect())
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .field("upstream", &self.upstream)
            .field("path", &self.path)
            .field("paginator", &self.paginator)
            .field("data_selector", &self.data_selector)
            .field("parallelized", &self.parallelized)
            .field("maps", &self.maps.len())
            .finish()
    }
}

pub struct TransformerBuilder {
    transformer: Transformer,
}

impl TransformerBuilder {
    pub fn paginator(mut self, paginator: Paginator) -> TransformerBuilder {
        self.transformer.paginator = paginator;
        self
    }

    pub fn data_selector(mut self, data_selector: DataSelector) -> TransformerBuilder {
        self.transformer.data_selector = data_selector;
        self
    }

    pub fn parallelized(mut self, parallelized: bool) -> TransformerBuilder {
        self.transformer.parallelized = parallelized;
        self
    }

    pub fn add_map<F>(mut self, map: F) -> TransformerBuilder
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transformer.maps.push(Arc::new(map));
        self
    }

    pub fn build(self) -> Transformer {
        self.transformer
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Resource(Resource),
    Transformer(Transformer),
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Resource(resource) => resource.name(),
            Step::Transformer(transformer) => transformer.name(),
        }
    }
}

impl From<Resource> for Step {
    fn from(resource: Resource) -> Step {
        Step::Resource(resource)
    }
}

impl From<Transformer> for Step {
    fn from(transformer: Transformer) -> Step {
        Step::Transformer(transformer)
    }
}

/// The ordered list of steps handed to the load runtime, with the client
/// they read through.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    client: RestClient,
    steps: Vec<Step>,
}

impl Source {
    /// Step names must be unique and every transformer must follow its
    /// upstream resource.
    pub fn new(name: &str, client: RestClient, steps: Vec<Step>) -> Result<Source> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut resources: HashSet<&str> = HashSet::new();

        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(Error::Config(format!(
                    "Source {} has more than one step named {}.",
                    name,
                    step.name()
                )));
            }
            match step {
                Step::Resource(resource) => {
                    resources.insert(resource.name());
                }
                Step::Transformer(transformer) => {
                    if !resources.contains(transformer.upstream()) {
                        return Err(Error::Config(format!(
                            "Transformer {} reads from {}, which is not an earlier resource of {}.",
                            transformer.name(),
                            transformer.upstream(),
                            name
                        )));
                    }
                }
            }
        }

        Ok(Source {
            name: name.to_owned(),
            client,
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.steps.iter().filter_map(|step| match step {
            Step::Resource(resource) => Some(resource),
            Step::Transformer(_) => None,
        })
    }

    pub fn transformers_of<'a>(&'a self, upstream: &'a str) -> impl Iterator<Item = &'a Transformer> {
        self.steps.iter().filter_map(move |step| match step {
            Step::Transformer(transformer) if transformer.upstream() == upstream => Some(transformer),
            _ => None,
        })
    }
}
