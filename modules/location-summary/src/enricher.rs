use std::collections::BTreeMap;

use location_common::{SiteProfile, SummaryRecord, TagRule};

/// Adds static site coordinates and tags to summaries, driven entirely by the
/// configured site table.
///
/// Only `latitude`, `longitude`, `geohash` and `tags` are ever changed.
/// Organizations missing from the table pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    sites: BTreeMap<String, SiteProfile>,
}

impl Enricher {
    pub fn new(sites: BTreeMap<String, SiteProfile>) -> Self {
        Self { sites }
    }

    pub fn site(&self, organization: &str) -> Option<&SiteProfile> {
        self.sites.get(organization)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn enrich(&self, mut record: SummaryRecord) -> SummaryRecord {
        let Some(site) = self.sites.get(&record.organization) else {
            return record;
        };

        if let (Some(lat), Some(lng), Some(hash)) = (&site.latitude, &site.longitude, &site.geohash)
        {
            record.latitude = Some(lat.clone());
            record.longitude = Some(lng.clone());
            record.geohash = Some(hash.clone());
        }

        for rule in &site.tag_rules {
            if rule_matches(rule, &record.subdomain) {
                record.tags.insert(rule.tag.clone());
            }
        }

        record
    }
}

fn rule_matches(rule: &TagRule, subdomain: &str) -> bool {
    match &rule.subdomain_contains {
        None => true,
        Some(needle) => subdomain
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}
