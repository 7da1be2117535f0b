use std::env;

use location_common::SearchConfig;
use tracing::info;

const DEFAULT_GEOIP_URL: &str = "https://data.isi.edu/geoip";

/// Environment-backed settings for the capture endpoint.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub host: String,
    pub port: u16,
    pub geoip_url: String,
    pub search: SearchConfig,
}

impl CaptureConfig {
    pub fn from_env() -> Self {
        // Also loads `.env`.
        let search = SearchConfig::from_env();

        Self {
            host: env::var("CAPTURE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("CAPTURE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            geoip_url: env::var("GEOIP_URL").unwrap_or_else(|_| DEFAULT_GEOIP_URL.to_string()),
            search,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_redacted(&self) {
        info!(
            bind = self.bind_addr().as_str(),
            geoip_url = self.geoip_url.as_str(),
            "Capture config"
        );
        self.search.log_redacted();
    }
}
