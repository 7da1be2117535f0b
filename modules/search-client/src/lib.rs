pub mod error;
pub mod retry;
pub mod types;

pub use error::{Result, SearchError};
pub use retry::RetryPolicy;
pub use types::{
    CardinalityAggregation, Hit, HitList, IndexResponse, MultiTermsAggregation, MultiTermsBucket,
    SearchResponse, ShardStats, TopHitsAggregation, TotalHits,
};

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an Elasticsearch-compatible REST API.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
    request_timeout: Duration,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_basic_auth(mut self, user: String, password: Option<String>) -> Self {
        self.credentials = Some((user, password));
        self
    }

    /// Per-request timeout. A timed-out request surfaces as
    /// [`SearchError::Timeout`], which is retryable.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self
            .client
            .request(method, url)
            .timeout(self.request_timeout);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_deref()),
            None => builder,
        }
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    /// Check that the cluster answers at all.
    pub async fn ping(&self) -> Result<()> {
        let resp = self.request(Method::GET, "/").send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Run a search with a raw JSON body against an index or index pattern.
    ///
    /// Answers with failed or timed-out shards are returned as
    /// [`SearchError::Partial`].
    pub async fn search<A: DeserializeOwned>(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<SearchResponse<A>> {
        let resp = self
            .request(Method::POST, &format!("{index}/_search"))
            .json(body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let bytes = resp.bytes().await?;
        let parsed: SearchResponse<A> = serde_json::from_slice(&bytes)?;
        parsed.ensure_complete()
    }

    /// Create or fully replace the document `id` in `index`.
    pub async fn index_document<T: Serialize + ?Sized>(
        &self,
        index: &str,
        id: &str,
        document: &T,
    ) -> Result<IndexResponse> {
        let resp = self
            .request(Method::PUT, &format!("{index}/_doc/{id}"))
            .json(document)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        tracing::debug!(index, id, "Indexed document");
        Ok(resp.json().await?)
    }

    /// Append a document with a store-assigned id.
    pub async fn append_document<T: Serialize + ?Sized>(
        &self,
        index: &str,
        document: &T,
    ) -> Result<IndexResponse> {
        let resp = self
            .request(Method::POST, &format!("{index}/_doc"))
            .json(document)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
