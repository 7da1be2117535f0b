//! Deterministic document identity for daily summaries.
//!
//! The id is the SHA-256 hex digest of `"{organization}-{subdomain}-{timestamp}"`
//! where the timestamp is 23:59:59 on the summarized day. Re-running a day
//! therefore replaces the previous documents instead of adding new ones.
//!
//! The `-` delimiter is not escaped, so (`a-b`, `c`) and (`a`, `b-c`) share an
//! id for the same day. Existing summaries are keyed this way, so the format
//! must not change.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sha2::{Digest, Sha256};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 23:59:59 on `day`.
pub fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) + Duration::seconds(86_399)
}

/// `YYYY-MM-DDT23:59:59` for `day`, the timestamp stored on every summary.
pub fn end_of_day_timestamp(day: NaiveDate) -> String {
    end_of_day(day).format(TIMESTAMP_FORMAT).to_string()
}

/// Document id for one (organization, subdomain) group on `day`.
pub fn document_id(organization: &str, subdomain: &str, day: NaiveDate) -> String {
    id_for_timestamp(organization, subdomain, &end_of_day_timestamp(day))
}

/// Document id from an already formatted timestamp.
pub fn id_for_timestamp(organization: &str, subdomain: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{organization}-{subdomain}-{timestamp}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Year partition for summaries of `day`, e.g. `aggregated-job-locations-2024`.
pub fn summary_index(prefix: &str, day: NaiveDate) -> String {
    format!("{prefix}-{}", day.format("%Y"))
}
