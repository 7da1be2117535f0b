use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// --- Raw observations ---

/// One job-location observation as written by the capture service.
///
/// Older documents in the raw store carry `0` placeholders and numbers stored
/// as strings, so coordinates and geohash are read leniently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub organization: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default, deserialize_with = "lenient_geohash")]
    pub geohash: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_geohash<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        // Numeric values are the legacy "no geohash" placeholder.
        _ => None,
    })
}

// --- Aggregation ---

/// Granularity of a daily summary. Both fields match case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub organization: String,
    pub subdomain: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.subdomain)
    }
}

/// All raw events of one group within one day, reduced to a template event
/// and a count.
#[derive(Debug, Clone)]
pub struct AggregatedGroup {
    pub key: GroupKey,
    pub representative: RawEvent,
    pub job_count: u64,
}

// --- Tags ---

/// Sorted, deduplicated tag set. Serialized as a comma-joined string
/// (empty string when no tag applies).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

impl Serialize for Tags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect())
    }
}

// --- Summaries ---

/// The persisted daily summary for one (organization, subdomain) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub organization: String,
    pub subdomain: String,
    pub job_count: u64,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub geohash: Option<String>,
    pub tags: Tags,
    pub timestamp: String,
}

impl SummaryRecord {
    /// Build an unenriched record from a group, stamped with the summarized
    /// day's end-of-day timestamp.
    pub fn from_group(group: &AggregatedGroup, timestamp: String) -> Self {
        let event = &group.representative;
        Self {
            organization: group.key.organization.clone(),
            subdomain: group.key.subdomain.clone(),
            job_count: group.job_count,
            latitude: event.latitude.map(|v| v.to_string()),
            longitude: event.longitude.map(|v| v.to_string()),
            geohash: event.geohash.clone(),
            tags: Tags::new(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_serialize_sorted_and_joined() {
        let tags: Tags = ["X", "ACCESS", "X"].into_iter().collect();
        assert_eq!(serde_json::to_value(&tags).unwrap(), json!("ACCESS,X"));
    }

    #[test]
    fn empty_tags_serialize_as_empty_string() {
        assert_eq!(serde_json::to_value(Tags::new()).unwrap(), json!(""));
    }

    #[test]
    fn tags_deserialize_from_joined_string() {
        let tags: Tags = serde_json::from_value(json!("X,ACCESS")).unwrap();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["ACCESS", "X"]);

        let empty: Tags = serde_json::from_value(json!("")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn raw_event_reads_legacy_placeholders() {
        let event: RawEvent = serde_json::from_value(json!({
            "organization": "N/A",
            "subdomain": "N/A",
            "latitude": 0,
            "longitude": "-88.2283",
            "geohash": 0
        }))
        .unwrap();

        assert_eq!(event.latitude, Some(0.0));
        assert_eq!(event.longitude, Some(-88.2283));
        assert_eq!(event.geohash, None);
    }

    #[test]
    fn raw_event_tolerates_missing_fields() {
        let event: RawEvent =
            serde_json::from_value(json!({ "organization": "UNKNOWN-ORG" })).unwrap();
        assert_eq!(event.subdomain, None);
        assert_eq!(event.latitude, None);
        assert_eq!(event.geohash, None);
    }

    #[test]
    fn summary_record_copies_static_fields_from_representative() {
        let group = AggregatedGroup {
            key: GroupKey {
                organization: "UNKNOWN-ORG".to_string(),
                subdomain: "hpc.example.edu".to_string(),
            },
            representative: RawEvent {
                organization: "UNKNOWN-ORG".to_string(),
                subdomain: Some("hpc.example.edu".to_string()),
                latitude: Some(12.5),
                longitude: Some(-3.25),
                geohash: Some("ebpb".to_string()),
                ..RawEvent::default()
            },
            job_count: 3,
        };

        let record = SummaryRecord::from_group(&group, "2024-03-01T23:59:59".to_string());
        assert_eq!(record.job_count, 3);
        assert_eq!(record.latitude.as_deref(), Some("12.5"));
        assert_eq!(record.longitude.as_deref(), Some("-3.25"));
        assert_eq!(record.geohash.as_deref(), Some("ebpb"));
        assert!(record.tags.is_empty());
    }
}
