//! In-memory stores for exercising the pipeline without a search cluster.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use location_common::{AggregatedGroup, GroupKey, LocationError, RawEvent, SummaryRecord};

use crate::stats::Overflow;
use crate::store::{DayGroups, DayWindow, RawEventSource, SummarySink};

/// Raw events held in memory, grouped the way the search store groups them:
/// events without a subdomain fall outside every group, buckets are ordered by
/// count (descending) and truncated at the cap.
#[derive(Default)]
pub struct MemoryRawStore {
    events: Mutex<Vec<RawEvent>>,
    failing_days: Mutex<HashSet<NaiveDate>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: RawEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Push `count` identical events for one group at `at`.
    pub fn push_jobs(&self, organization: &str, subdomain: &str, at: DateTime<Utc>, count: usize) {
        for _ in 0..count {
            self.push(RawEvent {
                organization: organization.to_string(),
                subdomain: Some(subdomain.to_string()),
                timestamp: Some(at),
                ..RawEvent::default()
            });
        }
    }

    /// Make queries for `day` fail.
    pub fn fail_day(&self, day: NaiveDate) {
        self.failing_days.lock().unwrap().insert(day);
    }
}

#[async_trait]
impl RawEventSource for MemoryRawStore {
    async fn fetch_day(
        &self,
        window: &DayWindow,
        group_cap: usize,
    ) -> Result<DayGroups, LocationError> {
        if self.failing_days.lock().unwrap().contains(&window.day) {
            return Err(LocationError::Query(format!("raw store unavailable for {}", window.day)));
        }

        let events = self.events.lock().unwrap();
        let in_window: Vec<&RawEvent> = events
            .iter()
            .filter(|e| e.timestamp.is_some_and(|ts| window.contains(ts.naive_utc())))
            .collect();

        let mut buckets: BTreeMap<GroupKey, (RawEvent, u64)> = BTreeMap::new();
        for event in &in_window {
            let Some(subdomain) = &event.subdomain else {
                continue;
            };
            let key = GroupKey {
                organization: event.organization.clone(),
                subdomain: subdomain.clone(),
            };
            buckets
                .entry(key)
                .or_insert_with(|| ((*event).clone(), 0))
                .1 += 1;
        }

        let mut groups: Vec<AggregatedGroup> = buckets
            .into_iter()
            .map(|(key, (representative, job_count))| AggregatedGroup {
                key,
                representative,
                job_count,
            })
            .collect();
        groups.sort_by(|a, b| b.job_count.cmp(&a.job_count).then_with(|| a.key.cmp(&b.key)));

        let estimated_groups = groups.len() as u64;
        let dropped: Vec<AggregatedGroup> = if groups.len() > group_cap {
            groups.split_off(group_cap)
        } else {
            Vec::new()
        };
        let overflow = (!dropped.is_empty()).then(|| Overflow {
            returned_groups: groups.len() as u64,
            estimated_groups,
            dropped_events: dropped.iter().map(|g| g.job_count).sum(),
        });

        Ok(DayGroups {
            total_events: in_window.len() as u64,
            groups,
            overflow,
        })
    }
}

/// Summary documents keyed by (index, id), with optional write failures.
#[derive(Default)]
pub struct MemorySummaryStore {
    documents: Mutex<BTreeMap<(String, String), SummaryRecord>>,
    failing_organizations: Mutex<HashSet<String>>,
    attempts: Mutex<u64>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write for `organization`.
    pub fn fail_writes_for(&self, organization: &str) {
        self.failing_organizations
            .lock()
            .unwrap()
            .insert(organization.to_string());
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attempts(&self) -> u64 {
        *self.attempts.lock().unwrap()
    }

    pub fn get(&self, index: &str, id: &str) -> Option<SummaryRecord> {
        self.documents
            .lock()
            .unwrap()
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    /// All documents in `index`.
    pub fn records(&self, index: &str) -> Vec<SummaryRecord> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .filter(|((i, _), _)| i == index)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// The document of one group in `index`, if written.
    pub fn find(&self, index: &str, organization: &str, subdomain: &str) -> Option<SummaryRecord> {
        self.records(index)
            .into_iter()
            .find(|r| r.organization == organization && r.subdomain == subdomain)
    }
}

#[async_trait]
impl SummarySink for MemorySummaryStore {
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &SummaryRecord,
    ) -> Result<(), LocationError> {
        *self.attempts.lock().unwrap() += 1;

        if self
            .failing_organizations
            .lock()
            .unwrap()
            .contains(&record.organization)
        {
            return Err(LocationError::Write(format!(
                "rejected write for {}",
                record.organization
            )));
        }

        self.documents
            .lock()
            .unwrap()
            .insert((index.to_string(), id.to_string()), record.clone());
        Ok(())
    }
}
