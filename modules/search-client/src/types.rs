use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SearchError};

/// Response of `POST /{index}/_search`. `A` is the caller's aggregation map.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<A> {
    #[serde(default)]
    pub timed_out: bool,
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardStats>,
    pub hits: HitsEnvelope,
    pub aggregations: Option<A>,
}

impl<A> SearchResponse<A> {
    /// Total matching documents, or 0 when the store omits the count.
    pub fn total_hits(&self) -> u64 {
        self.hits.total.as_ref().map(|t| t.value).unwrap_or(0)
    }

    /// Reject answers that only cover part of the data. The store reports
    /// failed or timed-out shards with a 200 status.
    pub fn ensure_complete(self) -> Result<Self> {
        let failed = self.shards.as_ref().map(|s| s.failed).unwrap_or(0);
        if failed > 0 || self.timed_out {
            let (total, successful) = self
                .shards
                .as_ref()
                .map(|s| (s.total, s.successful))
                .unwrap_or((0, 0));
            return Err(SearchError::Partial {
                total,
                successful,
                failed,
                timed_out: self.timed_out,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShardStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitsEnvelope {
    pub total: Option<TotalHits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    /// `"eq"` for exact counts, `"gte"` when the store stopped counting.
    #[serde(default)]
    pub relation: String,
}

/// A `multi_terms` aggregation. Each bucket carries its sub-aggregations in `S`.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiTermsAggregation<S> {
    /// Documents that fell into buckets beyond the requested `size`.
    #[serde(default)]
    pub sum_other_doc_count: u64,
    #[serde(default = "Vec::new")]
    pub buckets: Vec<MultiTermsBucket<S>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiTermsBucket<S> {
    pub key: Vec<Value>,
    pub doc_count: u64,
    #[serde(flatten)]
    pub sub: S,
}

impl<S> MultiTermsBucket<S> {
    /// Key component `i` as a string. Non-string keys are rendered as JSON.
    pub fn key_str(&self, i: usize) -> Option<String> {
        self.key.get(i).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A `top_hits` aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct TopHitsAggregation<T> {
    pub hits: HitList<T>,
}

impl<T> TopHitsAggregation<T> {
    pub fn first(&self) -> Option<&T> {
        self.hits.hits.first().map(|h| &h.source)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitList<T> {
    #[serde(default = "Vec::new")]
    pub hits: Vec<Hit<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hit<T> {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "_source")]
    pub source: T,
}

/// A `cardinality` (approximate distinct count) aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct CardinalityAggregation {
    pub value: u64,
}

/// Response of a document write.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    /// `"created"` or `"updated"`.
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Aggs {
        groups: MultiTermsAggregation<Sub>,
        distinct: CardinalityAggregation,
    }

    #[derive(Debug, Deserialize)]
    struct Sub {
        sample: TopHitsAggregation<Value>,
    }

    #[test]
    fn parses_multi_terms_with_top_hits() {
        let body = json!({
            "took": 12,
            "timed_out": false,
            "_shards": { "total": 3, "successful": 3, "skipped": 0, "failed": 0 },
            "hits": { "total": { "value": 9, "relation": "eq" }, "hits": [] },
            "aggregations": {
                "groups": {
                    "doc_count_error_upper_bound": 0,
                    "sum_other_doc_count": 2,
                    "buckets": [{
                        "key": ["NCSA-AS", "hpc.ncsa.illinois.edu"],
                        "key_as_string": "NCSA-AS|hpc.ncsa.illinois.edu",
                        "doc_count": 7,
                        "sample": { "hits": { "total": { "value": 7 }, "hits": [
                            { "_index": "job-locations-2024.03", "_id": "a1", "_source": { "organization": "NCSA-AS" } }
                        ] } }
                    }]
                },
                "distinct": { "value": 2 }
            }
        });

        let resp: SearchResponse<Aggs> = serde_json::from_value(body).unwrap();
        let resp = resp.ensure_complete().unwrap();
        assert_eq!(resp.total_hits(), 9);

        let aggs = resp.aggregations.unwrap();
        assert_eq!(aggs.groups.sum_other_doc_count, 2);
        assert_eq!(aggs.distinct.value, 2);

        let bucket = &aggs.groups.buckets[0];
        assert_eq!(bucket.doc_count, 7);
        assert_eq!(bucket.key_str(0).as_deref(), Some("NCSA-AS"));
        assert_eq!(bucket.key_str(1).as_deref(), Some("hpc.ncsa.illinois.edu"));
        assert_eq!(bucket.key_str(2), None);
        assert_eq!(bucket.sub.sample.first().unwrap()["organization"], "NCSA-AS");
    }

    #[test]
    fn missing_total_counts_as_zero() {
        let resp: SearchResponse<Value> =
            serde_json::from_value(json!({ "hits": {} })).unwrap();
        assert_eq!(resp.total_hits(), 0);
        assert!(resp.aggregations.is_none());
    }

    #[test]
    fn failed_shards_make_the_answer_partial() {
        let resp: SearchResponse<Value> = serde_json::from_value(json!({
            "timed_out": false,
            "_shards": { "total": 2, "successful": 1, "failed": 1 },
            "hits": { "total": { "value": 3, "relation": "eq" } }
        }))
        .unwrap();

        match resp.ensure_complete() {
            Err(SearchError::Partial {
                total,
                successful,
                failed,
                timed_out,
            }) => {
                assert_eq!((total, successful, failed), (2, 1, 1));
                assert!(!timed_out);
            }
            other => panic!("expected partial answer, got {other:?}"),
        }
    }

    #[test]
    fn timed_out_search_is_partial_even_without_failed_shards() {
        let resp: SearchResponse<Value> = serde_json::from_value(json!({
            "timed_out": true,
            "_shards": { "total": 2, "successful": 2, "failed": 0 },
            "hits": {}
        }))
        .unwrap();

        assert!(matches!(
            resp.ensure_complete(),
            Err(SearchError::Partial { timed_out: true, .. })
        ));
    }
}
