use async_trait::async_trait;
use tracing::info;

use location_common::{LocationError, SummaryRecord};

use super::SummarySink;

/// Sink for `--dry-run`: logs each summary instead of writing it.
pub struct LogSink;

#[async_trait]
impl SummarySink for LogSink {
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &SummaryRecord,
    ) -> Result<(), LocationError> {
        let document = serde_json::to_string(record).map_err(|e| LocationError::Write(e.to_string()))?;
        info!(index, id, %document, "Dry run: would upsert summary");
        Ok(())
    }
}
