pub mod aggregator;
pub mod backfill;
pub mod enricher;
pub mod identity;
pub mod stats;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use aggregator::DayAggregator;
pub use backfill::{BackfillDriver, BackfillPlan};
pub use enricher::Enricher;
pub use stats::{DayReport, Overflow, RunStats};
