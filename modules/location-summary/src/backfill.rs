//! Chooses which days to (re)summarize and drives the aggregator over them.
//!
//! Every run covers the most recent days plus a sample of older days. The
//! sample lets site table changes reach old summaries over time; it does not
//! guarantee that all history is consistent after a change.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{Days, NaiveDate};
use futures::stream::{self, StreamExt};
use rand::Rng;
use tracing::{info, warn};

use location_common::{BackfillConfig, SamplingStrategy};

use crate::aggregator::DayAggregator;
use crate::stats::RunStats;

/// Ordered, duplicate-free list of days to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillPlan {
    days: Vec<NaiveDate>,
}

impl BackfillPlan {
    /// Recent window first (newest to oldest), then sampled days.
    pub fn build<R: Rng + ?Sized>(today: NaiveDate, config: &BackfillConfig, rng: &mut R) -> Self {
        let recent = (0..config.recent_days).map(u64::from);

        let sampled: Vec<u64> = match config.sampling {
            SamplingStrategy::Stride { stride_days } => (0..config.sample_count)
                .map(|i| u64::from(i) * u64::from(stride_days))
                .collect(),
            SamplingStrategy::Random {
                min_days_ago,
                max_days_ago,
            } => (0..config.sample_count)
                .map(|_| u64::from(rng.random_range(min_days_ago..=max_days_ago)))
                .collect(),
        };

        Self::from_days(
            recent
                .chain(sampled)
                .filter_map(|ago| today.checked_sub_days(Days::new(ago))),
        )
    }

    /// Keep the given order, dropping repeated days.
    pub fn from_days(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut seen = HashSet::new();
        Self {
            days: days.into_iter().filter(|d| seen.insert(*d)).collect(),
        }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Runs the aggregator over a plan with up to `workers` days in flight.
/// Each day is handled by exactly one worker.
pub struct BackfillDriver {
    aggregator: DayAggregator,
    workers: usize,
}

impl BackfillDriver {
    pub fn new(aggregator: DayAggregator, workers: usize) -> Self {
        Self {
            aggregator,
            workers: workers.max(1),
        }
    }

    /// Process every planned day. Individual day failures are logged and
    /// counted; the run only fails when every planned day failed.
    pub async fn run(&self, plan: &BackfillPlan) -> Result<RunStats> {
        let mut stats = RunStats {
            days_planned: plan.len() as u64,
            ..RunStats::default()
        };

        info!(days = plan.len(), workers = self.workers, "Starting backfill");

        let aggregator = &self.aggregator;
        let mut results = stream::iter(plan.days().iter().copied())
            .map(|day| async move { (day, aggregator.aggregate_day(day).await) })
            .buffer_unordered(self.workers);

        while let Some((day, result)) = results.next().await {
            match result {
                Ok(report) => stats.record(&report),
                Err(e) => {
                    stats.days_failed += 1;
                    warn!(day = %day, error = %e, "Day aggregation failed");
                }
            }
        }

        if stats.all_days_failed() {
            anyhow::bail!("All {} planned days failed. {stats}", stats.days_planned);
        }

        info!("Backfill complete. {stats}");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn config(recent_days: u32, sample_count: u32, sampling: SamplingStrategy) -> BackfillConfig {
        BackfillConfig {
            recent_days,
            sample_count,
            sampling,
            workers: 1,
        }
    }

    #[test]
    fn reference_plan_is_recent_window_plus_monthly_stride() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = BackfillPlan::build(day("2024-03-10"), &BackfillConfig::default(), &mut rng);

        // 5 recent days + 30 strided days, minus today counted twice.
        assert_eq!(plan.len(), 34);
        assert_eq!(
            &plan.days()[..5],
            &[
                day("2024-03-10"),
                day("2024-03-09"),
                day("2024-03-08"),
                day("2024-03-07"),
                day("2024-03-06"),
            ]
        );
        assert_eq!(plan.days()[5], day("2024-02-09"));
        assert_eq!(plan.days()[33], day("2024-03-10") - Days::new(29 * 30));
    }

    #[test]
    fn plan_never_repeats_a_day() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = BackfillPlan::build(
            day("2024-03-10"),
            &config(10, 10, SamplingStrategy::Stride { stride_days: 2 }),
            &mut rng,
        );

        let unique: HashSet<_> = plan.days().iter().collect();
        assert_eq!(unique.len(), plan.len());
        // 0..10 recent plus 0,2,..,18 sampled: 10 + 5 new days.
        assert_eq!(plan.len(), 15);
    }

    #[test]
    fn random_sampling_stays_within_bounds() {
        let today = day("2024-03-10");
        let mut rng = StdRng::seed_from_u64(42);
        let plan = BackfillPlan::build(
            today,
            &config(
                0,
                200,
                SamplingStrategy::Random {
                    min_days_ago: 5,
                    max_days_ago: 1095,
                },
            ),
            &mut rng,
        );

        assert!(!plan.is_empty());
        for d in plan.days() {
            let ago = (today - *d).num_days();
            assert!((5..=1095).contains(&ago), "{d} is {ago} days ago");
        }
    }

    #[test]
    fn random_sampling_is_reproducible_with_seed() {
        let today = day("2024-03-10");
        let cfg = config(
            0,
            20,
            SamplingStrategy::Random {
                min_days_ago: 5,
                max_days_ago: 1095,
            },
        );
        let a = BackfillPlan::build(today, &cfg, &mut StdRng::seed_from_u64(9));
        let b = BackfillPlan::build(today, &cfg, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_config_yields_empty_plan() {
        let mut rng = StdRng::seed_from_u64(0);
        let plan = BackfillPlan::build(
            day("2024-03-10"),
            &config(0, 0, SamplingStrategy::Stride { stride_days: 30 }),
            &mut rng,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn explicit_days_keep_order_and_drop_duplicates() {
        let plan = BackfillPlan::from_days([day("2024-01-02"), day("2024-01-01"), day("2024-01-02")]);
        assert_eq!(plan.days(), &[day("2024-01-02"), day("2024-01-01")]);
    }
}
