use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Geo-IP lookup failed: {0}")]
    GeoIp(String),

    #[error("Raw event store error: {0}")]
    Store(#[from] search_client::SearchError),
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::GeoIp(err.to_string())
    }
}
