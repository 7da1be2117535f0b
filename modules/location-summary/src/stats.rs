use std::fmt;

use chrono::NaiveDate;

/// Reported when a day has more groups than the configured cap. Groups beyond
/// the cap are not summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    /// Groups actually returned (the cap).
    pub returned_groups: u64,
    /// Approximate distinct groups in the day.
    pub estimated_groups: u64,
    /// Raw events belonging to groups that were not returned.
    pub dropped_events: u64,
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "returned={} estimated={} dropped_events={}",
            self.returned_groups, self.estimated_groups, self.dropped_events
        )
    }
}

/// Outcome of aggregating one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub day: NaiveDate,
    pub events: u64,
    pub groups: u64,
    pub ignored: u64,
    pub written: u64,
    pub write_failures: u64,
    pub overflow: Option<Overflow>,
}

impl DayReport {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            events: 0,
            groups: 0,
            ignored: 0,
            written: 0,
            write_failures: 0,
            overflow: None,
        }
    }
}

impl fmt::Display for DayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day={} events={} groups={} ignored={} written={} write_failures={}",
            self.day, self.events, self.groups, self.ignored, self.written, self.write_failures
        )?;
        if let Some(overflow) = &self.overflow {
            write!(f, " overflow({overflow})")?;
        }
        Ok(())
    }
}

/// Totals for a backfill run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub days_planned: u64,
    pub days_succeeded: u64,
    pub days_failed: u64,
    pub groups_written: u64,
    pub groups_ignored: u64,
    pub write_failures: u64,
    pub overflow_days: u64,
}

impl RunStats {
    pub fn record(&mut self, report: &DayReport) {
        self.days_succeeded += 1;
        self.groups_written += report.written;
        self.groups_ignored += report.ignored;
        self.write_failures += report.write_failures;
        if report.overflow.is_some() {
            self.overflow_days += 1;
        }
    }

    /// True when days were planned and none of them could be queried.
    pub fn all_days_failed(&self) -> bool {
        self.days_planned > 0 && self.days_failed == self.days_planned
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "days_planned={} days_succeeded={} days_failed={} groups_written={} groups_ignored={} write_failures={} overflow_days={}",
            self.days_planned,
            self.days_succeeded,
            self.days_failed,
            self.groups_written,
            self.groups_ignored,
            self.write_failures,
            self.overflow_days,
        )
    }
}
