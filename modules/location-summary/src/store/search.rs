use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use location_common::{AggregatedGroup, GroupKey, LocationError, RawEvent, SummaryRecord};
use search_client::{
    CardinalityAggregation, MultiTermsAggregation, MultiTermsBucket, RetryPolicy, SearchClient,
    SearchResponse, TopHitsAggregation,
};

use super::{DayGroups, DayWindow, RawEventSource, SummarySink};
use crate::stats::Overflow;

const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Fields copied from the representative event of each group.
const PROJECTED_FIELDS: [&str; 5] = ["organization", "subdomain", "geohash", "latitude", "longitude"];

#[derive(Debug, Deserialize)]
struct DayAggregations {
    job_count: MultiTermsAggregation<GroupSample>,
    group_count: Option<CardinalityAggregation>,
}

#[derive(Debug, Deserialize)]
struct GroupSample {
    hits: TopHitsAggregation<RawEvent>,
}

/// Raw and summary store backed by the search cluster.
pub struct SearchStore {
    client: SearchClient,
    raw_index_pattern: String,
    write_retry: RetryPolicy,
    estimate_group_count: bool,
}

impl SearchStore {
    pub fn new(client: SearchClient, raw_index_pattern: String, write_retry: RetryPolicy) -> Self {
        Self {
            client,
            raw_index_pattern,
            write_retry,
            estimate_group_count: true,
        }
    }

    /// Turn the distinct-group estimate off for clusters without inline
    /// scripting. Overflow is still detected, with a lower-bound estimate.
    pub fn with_group_count_estimate(mut self, enabled: bool) -> Self {
        self.estimate_group_count = enabled;
        self
    }
}

/// Grouped query for one day: events in `[start, end)` bucketed by
/// organization and subdomain, one sample event per bucket.
///
/// With `estimate_groups`, a `group_count` cardinality aggregation
/// approximates the number of distinct groups. It runs an inline painless
/// script, so it needs scripting enabled and both keyword fields mapped in
/// every raw index; otherwise the whole query fails.
pub fn day_query(window: &DayWindow, group_cap: usize, estimate_groups: bool) -> Value {
    let mut query = json!({
        "size": 0,
        "track_total_hits": true,
        "query": {
            "range": {
                "timestamp": {
                    "gte": window.start.format(WINDOW_FORMAT).to_string(),
                    "lt": window.end.format(WINDOW_FORMAT).to_string()
                }
            }
        },
        "aggs": {
            "job_count": {
                "multi_terms": {
                    "terms": [
                        { "field": "organization.keyword" },
                        { "field": "subdomain.keyword" }
                    ],
                    "size": group_cap
                },
                "aggs": {
                    "hits": {
                        "top_hits": {
                            "_source": { "includes": PROJECTED_FIELDS },
                            "size": 1
                        }
                    }
                }
            }
        }
    });

    if estimate_groups {
        query["aggs"]["group_count"] = json!({
            "cardinality": {
                "script": {
                    "lang": "painless",
                    "source": "doc['organization.keyword'].size() == 0 || doc['subdomain.keyword'].size() == 0 ? '' : doc['organization.keyword'].value + '|' + doc['subdomain.keyword'].value"
                },
                "precision_threshold": 40000
            }
        });
    }
    query
}

fn bucket_to_group(bucket: MultiTermsBucket<GroupSample>) -> Option<AggregatedGroup> {
    let key = GroupKey {
        organization: bucket.key_str(0)?,
        subdomain: bucket.key_str(1)?,
    };
    let representative = bucket.sub.hits.first().cloned().unwrap_or_else(|| RawEvent {
        organization: key.organization.clone(),
        subdomain: Some(key.subdomain.clone()),
        ..RawEvent::default()
    });
    Some(AggregatedGroup {
        key,
        representative,
        job_count: bucket.doc_count,
    })
}

/// Reduce a grouped-query answer to the day's groups.
///
/// Buckets beyond the cap show up as `sum_other_doc_count`; the estimated
/// group total is never below `returned + 1` when that happens.
fn day_groups(day: NaiveDate, resp: SearchResponse<DayAggregations>) -> DayGroups {
    let total_events = resp.total_hits();
    let Some(aggs) = resp.aggregations else {
        debug!(day = %day, "No aggregations in response");
        return DayGroups {
            total_events,
            ..DayGroups::default()
        };
    };

    let dropped_events = aggs.job_count.sum_other_doc_count;
    let mut groups = Vec::with_capacity(aggs.job_count.buckets.len());
    for bucket in aggs.job_count.buckets {
        let key = bucket.key.clone();
        match bucket_to_group(bucket) {
            Some(group) => groups.push(group),
            None => warn!(day = %day, key = ?key, "Skipping bucket with malformed key"),
        }
    }

    let overflow = (dropped_events > 0).then(|| {
        let returned_groups = groups.len() as u64;
        Overflow {
            returned_groups,
            estimated_groups: aggs
                .group_count
                .map(|c| c.value)
                .unwrap_or(0)
                .max(returned_groups + 1),
            dropped_events,
        }
    });

    DayGroups {
        total_events,
        groups,
        overflow,
    }
}

#[async_trait]
impl RawEventSource for SearchStore {
    async fn fetch_day(
        &self,
        window: &DayWindow,
        group_cap: usize,
    ) -> Result<DayGroups, LocationError> {
        let body = day_query(window, group_cap, self.estimate_group_count);
        let resp = self
            .client
            .search::<DayAggregations>(&self.raw_index_pattern, &body)
            .await
            .map_err(|e| LocationError::Query(e.to_string()))?;

        Ok(day_groups(window.day, resp))
    }
}

#[async_trait]
impl SummarySink for SearchStore {
    async fn upsert(
        &self,
        index: &str,
        id: &str,
        record: &SummaryRecord,
    ) -> Result<(), LocationError> {
        let client = &self.client;
        self.write_retry
            .run("index summary", move || client.index_document(index, id, record))
            .await
            .map(|_| ())
            .map_err(|e| LocationError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn bucket(org: &str, sub: &str, doc_count: u64) -> Value {
        json!({
            "key": [org, sub],
            "doc_count": doc_count,
            "hits": { "hits": { "hits": [
                { "_id": "x", "_source": { "organization": org, "subdomain": sub, "latitude": 40.1, "longitude": -88.2 } }
            ] } }
        })
    }

    fn answer(buckets: Vec<Value>, sum_other_doc_count: u64, group_count: Option<u64>) -> SearchResponse<DayAggregations> {
        let mut aggs = json!({
            "job_count": {
                "doc_count_error_upper_bound": 0,
                "sum_other_doc_count": sum_other_doc_count,
                "buckets": buckets
            }
        });
        if let Some(value) = group_count {
            aggs["group_count"] = json!({ "value": value });
        }
        serde_json::from_value(json!({
            "timed_out": false,
            "_shards": { "total": 1, "successful": 1, "failed": 0 },
            "hits": { "total": { "value": 20, "relation": "eq" }, "hits": [] },
            "aggregations": aggs
        }))
        .unwrap()
    }

    #[test]
    fn query_covers_exactly_one_day() {
        let window = DayWindow::for_day(day());
        let q = day_query(&window, 10_000, true);

        let range = &q["query"]["range"]["timestamp"];
        assert_eq!(range["gte"], "2024-03-01T00:00:00");
        assert_eq!(range["lt"], "2024-03-02T00:00:00");
        assert_eq!(q["size"], 0);
    }

    #[test]
    fn query_groups_by_keyword_fields_with_cap() {
        let window = DayWindow::for_day(day());
        let q = day_query(&window, 250, true);

        let terms = &q["aggs"]["job_count"]["multi_terms"];
        assert_eq!(terms["size"], 250);
        assert_eq!(terms["terms"][0]["field"], "organization.keyword");
        assert_eq!(terms["terms"][1]["field"], "subdomain.keyword");

        let top = &q["aggs"]["job_count"]["aggs"]["hits"]["top_hits"];
        assert_eq!(top["size"], 1);
        assert_eq!(
            top["_source"]["includes"],
            json!(["organization", "subdomain", "geohash", "latitude", "longitude"])
        );
    }

    #[test]
    fn bucket_without_sample_falls_back_to_key() {
        let bucket: MultiTermsBucket<GroupSample> = serde_json::from_value(json!({
            "key": ["UNKNOWN-ORG", "a.example.edu"],
            "doc_count": 4,
            "hits": { "hits": { "hits": [] } }
        }))
        .unwrap();

        let group = bucket_to_group(bucket).unwrap();
        assert_eq!(group.key.organization, "UNKNOWN-ORG");
        assert_eq!(group.job_count, 4);
        assert_eq!(group.representative.subdomain.as_deref(), Some("a.example.edu"));
    }

    #[test]
    fn bucket_with_short_key_is_rejected() {
        let bucket: MultiTermsBucket<GroupSample> = serde_json::from_value(json!({
            "key": ["ONLY-ORG"],
            "doc_count": 1,
            "hits": { "hits": { "hits": [] } }
        }))
        .unwrap();

        assert!(bucket_to_group(bucket).is_none());
    }

    #[test]
    fn estimate_can_be_left_out_of_query() {
        let window = DayWindow::for_day(day());
        assert!(day_query(&window, 10, true)["aggs"].get("group_count").is_some());
        assert!(day_query(&window, 10, false)["aggs"].get("group_count").is_none());
    }

    #[test]
    fn day_within_cap_has_no_overflow() {
        let groups = day_groups(
            day(),
            answer(vec![bucket("NCSA-AS", "hpc.ncsa.illinois.edu", 7)], 0, Some(1)),
        );

        assert_eq!(groups.total_events, 20);
        assert_eq!(groups.groups.len(), 1);
        assert_eq!(groups.groups[0].job_count, 7);
        assert_eq!(groups.groups[0].representative.latitude, Some(40.1));
        assert!(groups.overflow.is_none());
    }

    #[test]
    fn leftover_documents_report_overflow_with_estimate() {
        let groups = day_groups(
            day(),
            answer(
                vec![
                    bucket("NCSA-AS", "a.ncsa.illinois.edu", 9),
                    bucket("NCSA-AS", "b.ncsa.illinois.edu", 6),
                ],
                5,
                Some(7),
            ),
        );

        let overflow = groups.overflow.expect("overflow reported");
        assert_eq!(overflow.returned_groups, 2);
        assert_eq!(overflow.estimated_groups, 7);
        assert_eq!(overflow.dropped_events, 5);
    }

    #[test]
    fn low_estimate_is_raised_above_returned_groups() {
        let groups = day_groups(
            day(),
            answer(
                vec![
                    bucket("NCSA-AS", "a.ncsa.illinois.edu", 9),
                    bucket("NCSA-AS", "b.ncsa.illinois.edu", 6),
                ],
                5,
                Some(1),
            ),
        );

        assert_eq!(groups.overflow.unwrap().estimated_groups, 3);
    }

    #[test]
    fn overflow_detected_without_estimate() {
        let groups = day_groups(
            day(),
            answer(vec![bucket("NCSA-AS", "a.ncsa.illinois.edu", 9)], 2, None),
        );

        let overflow = groups.overflow.unwrap();
        assert_eq!(overflow.estimated_groups, 2);
        assert_eq!(overflow.dropped_events, 2);
    }

    #[test]
    fn malformed_bucket_is_skipped_among_good_ones() {
        let groups = day_groups(
            day(),
            answer(
                vec![
                    bucket("NCSA-AS", "a.ncsa.illinois.edu", 9),
                    json!({ "key": ["ONLY-ORG"], "doc_count": 4, "hits": { "hits": { "hits": [] } } }),
                    bucket("UW-RESEARCH", "hyak.uw.edu", 2),
                ],
                0,
                Some(3),
            ),
        );

        let keys: Vec<String> = groups.groups.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(keys, vec!["NCSA-AS/a.ncsa.illinois.edu", "UW-RESEARCH/hyak.uw.edu"]);
        assert!(groups.overflow.is_none());
    }

    #[test]
    fn answer_without_aggregations_is_empty_day() {
        let resp: SearchResponse<DayAggregations> = serde_json::from_value(json!({
            "hits": { "total": { "value": 0, "relation": "eq" } }
        }))
        .unwrap();

        let groups = day_groups(day(), resp);
        assert!(groups.groups.is_empty());
        assert!(groups.overflow.is_none());
    }
}
