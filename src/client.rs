use crate::config::{HttpConfig, Secrets};
use crate::error::{Error, Result};
use crate::paginator::{PageCursor, Paginator};
use crate::selector::DataSelector;

use futures::{stream, Stream, TryStreamExt};
use reqwest::{StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct BearerTokenAuth {
    token: Option<String>,
    source: String,
}

impl BearerTokenAuth {
    pub fn new(token: &str) -> BearerTokenAuth {
        BearerTokenAuth {
            token: Some(token.to_owned()),
            source: "token".to_owned(),
        }
    }

    /// A missing secret is not an error here; requests fail authentication.
    pub fn from_secrets(secrets: &Secrets, path: &str) -> BearerTokenAuth {
        BearerTokenAuth {
            token: secrets.get(path),
            source: path.to_owned(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl std::fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuth")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("source", &self.source)
            .finish()
    }
}

/// Exponential backoff between `backoff_factor` and `max_delay`, with
/// `max_attempts` counting the first request.
pub fn retry_policy(config: &HttpConfig) -> ExponentialBackoff {
    let min = config.backoff_factor();
    let max = config.max_delay().max(min);

    ExponentialBackoff::builder()
        .retry_bounds(min, max)
        .build_with_max_retries(config.max_attempts.saturating_sub(1))
}

/// Everything one `paginate` call needs. Built per call and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub path: String,
    pub paginator: Paginator,
    pub data_selector: DataSelector,
}

impl PageRequest {
    pub fn new(path: &str) -> PageRequest {
        PageRequest {
            path: path.to_owned(),
            paginator: Paginator::SinglePage,
            data_selector: DataSelector::root(),
        }
    }

    pub fn paginator(mut self, paginator: Paginator) -> PageRequest {
        self.paginator = paginator;
        self
    }

    pub fn data_selector(mut self, data_selector: DataSelector) -> PageRequest {
        self.data_selector = data_selector;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub path: String,
    pub number: usize,
    pub records: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: Url,
    auth: BearerTokenAuth,
    http: ClientWithMiddleware,
}

impl RestClient {
    pub fn new(base_url: &str, auth: BearerTokenAuth, config: &HttpConfig) -> Result<RestClient> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&base_url)
            .map_err(|err| Error::Config(format!("Invalid base URL {}: {}", base_url, err)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|source| Error::Http {
                path: base_url.to_string(),
                source: source.into(),
            })?;
        let http = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy(config)))
            .build();

        Ok(RestClient {
            base_url,
            auth,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let token = self.auth.token().ok_or_else(|| Error::Authentication {
            path: path.to_owned(),
            message: format!("No bearer token configured ({}).", self.auth.source),
        })?;
        let url = self
            .base_url
            .join(path)
            .map_err(|err| Error::Config(format!("Invalid path {}: {}", path, err)))?;

        debug!("GET {} {:?}.", url, query);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|source| Error::Http {
                path: path.to_owned(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await.map_err(|source| Error::Http {
                path: path.to_owned(),
                source: source.into(),
            })?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                path: path.to_owned(),
                message: format!("{}: {}", status, body),
            });
        }

        Err(Error::Status {
            path: path.to_owned(),
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: PageCursor,
        number: usize,
    ) -> Result<(Page, Option<(PageCursor, usize)>)> {
        let body = self.get(&request.path, &cursor.query()).await?;
        let records = request.data_selector.select(&body);
        debug!(
            "Page {} of {} selected {} records with {}.",
            number,
            request.path,
            records.len(),
            request.data_selector
        );

        let next = cursor
            .advance(&body, records.len())
            .map(|cursor| (cursor, number + 1));
        let page = Page {
            path: request.path.clone(),
            number,
            records,
        };

        Ok((page, next))
    }

    /// Lazily walks every page of `request`. Each call starts from the first
    /// page.
    pub fn paginate<'a>(
        &'a self,
        request: &'a PageRequest,
    ) -> impl Stream<Item = Result<Page>> + Send + 'a {
        stream::try_unfold(
            Some((request.paginator.cursor(), 1)),
            move |state| async move {
                match state {
                    Some((cursor, number)) => self.fetch_page(request, cursor, number).await.map(Some),
                    None => Ok(None),
                }
            },
        )
    }

    pub async fn fetch_all(&self, request: &PageRequest) -> Result<Vec<Value>> {
        self.paginate(request)
            .map_ok(|page| page.records)
            .try_concat()
            .await
    }
}
