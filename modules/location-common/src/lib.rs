pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::{BackfillConfig, SamplingStrategy, SearchConfig, SiteProfile, SummaryConfig, TagRule};
pub use error::LocationError;
