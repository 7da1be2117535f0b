pub mod log;
pub mod search;

pub use log::LogSink;
pub use search::SearchStore;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use location_common::{AggregatedGroup, LocationError, SummaryRecord};

use crate::stats::Overflow;

/// Half-open UTC window `[start, end)` covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DayWindow {
    pub fn for_day(day: NaiveDate) -> Self {
        let start = day.and_time(NaiveTime::MIN);
        Self {
            day,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Raw events of one day, already grouped by (organization, subdomain).
#[derive(Debug, Clone, Default)]
pub struct DayGroups {
    pub total_events: u64,
    pub groups: Vec<AggregatedGroup>,
    /// Set when the day had more groups than were returned.
    pub overflow: Option<Overflow>,
}

/// Read side: the store raw job-location events are captured into.
#[async_trait]
pub trait RawEventSource: Send + Sync {
    /// Group the events in `window`, returning at most `group_cap` groups.
    async fn fetch_day(
        &self,
        window: &DayWindow,
        group_cap: usize,
    ) -> Result<DayGroups, LocationError>;
}

/// Write side: the store daily summaries are upserted into.
#[async_trait]
pub trait SummarySink: Send + Sync {
    /// Create or fully replace document `id` in `index`.
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &SummaryRecord,
    ) -> Result<(), LocationError>;
}
