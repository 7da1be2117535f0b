use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use location_common::{AggregatedGroup, LocationError, SummaryConfig, SummaryRecord};

use crate::enricher::Enricher;
use crate::identity;
use crate::stats::DayReport;
use crate::store::{DayWindow, RawEventSource, SummarySink};

const DEFAULT_GROUP_CAP: usize = 10_000;
const DEFAULT_INDEX_PREFIX: &str = "aggregated-job-locations";

/// A fully prepared summary: where it goes and under which id.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryWrite {
    pub index: String,
    pub id: String,
    pub record: SummaryRecord,
}

/// Summarizes one day of raw events into one record per
/// (organization, subdomain) group.
pub struct DayAggregator {
    source: Arc<dyn RawEventSource>,
    sink: Arc<dyn SummarySink>,
    enricher: Enricher,
    ignored_organizations: HashSet<String>,
    group_cap: usize,
    index_prefix: String,
}

impl DayAggregator {
    pub fn new(
        source: Arc<dyn RawEventSource>,
        sink: Arc<dyn SummarySink>,
        enricher: Enricher,
    ) -> Self {
        Self {
            source,
            sink,
            enricher,
            ignored_organizations: HashSet::new(),
            group_cap: DEFAULT_GROUP_CAP,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
        }
    }

    pub fn from_config(
        source: Arc<dyn RawEventSource>,
        sink: Arc<dyn SummarySink>,
        config: &SummaryConfig,
    ) -> Self {
        Self::new(source, sink, Enricher::new(config.sites.clone()))
            .with_ignored_organizations(config.ignore_organizations.iter().cloned())
            .with_group_cap(config.store.group_cap)
            .with_index_prefix(config.store.summary_index_prefix.clone())
    }

    pub fn with_ignored_organizations(mut self, orgs: impl IntoIterator<Item = String>) -> Self {
        self.ignored_organizations = orgs.into_iter().collect();
        self
    }

    pub fn with_group_cap(mut self, group_cap: usize) -> Self {
        self.group_cap = group_cap;
        self
    }

    pub fn with_index_prefix(mut self, prefix: String) -> Self {
        self.index_prefix = prefix;
        self
    }

    pub fn is_ignored(&self, organization: &str) -> bool {
        self.ignored_organizations.contains(organization)
    }

    /// Pure part of the pipeline: drop ignored groups, enrich the rest and
    /// assign each its partition and id. Returns the writes and the number of
    /// ignored groups.
    pub fn prepare(&self, day: NaiveDate, groups: &[AggregatedGroup]) -> (Vec<SummaryWrite>, u64) {
        let timestamp = identity::end_of_day_timestamp(day);
        let index = identity::summary_index(&self.index_prefix, day);
        let mut ignored = 0u64;

        let writes = groups
            .iter()
            .filter(|group| {
                let skip = self.is_ignored(&group.key.organization);
                if skip {
                    ignored += 1;
                }
                !skip
            })
            .map(|group| {
                let record = self
                    .enricher
                    .enrich(SummaryRecord::from_group(group, timestamp.clone()));
                SummaryWrite {
                    index: index.clone(),
                    id: identity::id_for_timestamp(&record.organization, &record.subdomain, &timestamp),
                    record,
                }
            })
            .collect();

        (writes, ignored)
    }

    /// Query, summarize and upsert one day.
    ///
    /// A query failure fails the day. A write failure (after the sink's own
    /// retries) is logged and counted; the remaining groups are still written.
    pub async fn aggregate_day(&self, day: NaiveDate) -> Result<DayReport, LocationError> {
        let window = DayWindow::for_day(day);
        let fetched = self.source.fetch_day(&window, self.group_cap).await?;

        let mut report = DayReport::new(day);
        report.events = fetched.total_events;
        report.groups = fetched.groups.len() as u64;
        report.overflow = fetched.overflow;

        if let Some(overflow) = &fetched.overflow {
            warn!(
                day = %day,
                group_cap = self.group_cap,
                returned_groups = overflow.returned_groups,
                estimated_groups = overflow.estimated_groups,
                dropped_events = overflow.dropped_events,
                "Group cap exceeded; groups beyond the cap were not summarized"
            );
        }

        let (writes, ignored) = self.prepare(day, &fetched.groups);
        report.ignored = ignored;

        for write in &writes {
            match self.sink.upsert(&write.index, &write.id, &write.record).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    report.write_failures += 1;
                    warn!(
                        day = %day,
                        organization = write.record.organization.as_str(),
                        subdomain = write.record.subdomain.as_str(),
                        id = write.id.as_str(),
                        error = %e,
                        "Failed to upsert summary, skipping group"
                    );
                }
            }
        }

        info!("Day aggregated. {report}");
        Ok(report)
    }
}
