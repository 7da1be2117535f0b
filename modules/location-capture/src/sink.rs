use async_trait::async_trait;
use chrono::{DateTime, Utc};

use location_common::RawEvent;
use search_client::SearchClient;

use crate::error::Result;

const RAW_INDEX_PREFIX: &str = "job-locations";

/// Monthly raw-event partition for `at`, e.g. `job-locations-2024.03`.
pub fn raw_index(at: DateTime<Utc>) -> String {
    format!("{RAW_INDEX_PREFIX}-{}", at.format("%Y.%m"))
}

#[async_trait]
pub trait RawEventSink: Send + Sync {
    async fn append(&self, event: &RawEvent) -> Result<()>;
}

/// Appends raw events to the search store under store-assigned ids.
pub struct SearchEventSink {
    client: SearchClient,
}

impl SearchEventSink {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RawEventSink for SearchEventSink {
    async fn append(&self, event: &RawEvent) -> Result<()> {
        let index = raw_index(event.timestamp.unwrap_or_else(Utc::now));
        let resp = self.client.append_document(&index, event).await?;
        tracing::debug!(index = %resp.index, id = %resp.id, "Raw event stored");
        Ok(())
    }
}
