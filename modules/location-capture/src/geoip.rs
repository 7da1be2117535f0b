use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{CaptureError, Result};

/// What the geo-IP service knows about an address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub organization: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo>;
}

#[derive(Deserialize)]
struct GeoIpResponse {
    #[serde(rename = "asnOrganization")]
    asn_organization: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// HTTP geo-IP service answering `GET {base_url}/{ip}` with JSON.
pub struct GeoIpClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeoIpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GeoLookup for GeoIpClient {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, ip))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CaptureError::GeoIp(format!("{ip}: HTTP {status}")));
        }

        let body: GeoIpResponse = resp.json().await?;
        Ok(GeoInfo {
            organization: body.asn_organization,
            latitude: body.latitude,
            longitude: body.longitude,
        })
    }
}
