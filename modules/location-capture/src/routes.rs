use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use geohash::Coord;
use serde::Serialize;
use tracing::{info, warn};

use location_common::RawEvent;

use crate::dns::{self, ReverseDns, UNKNOWN};
use crate::geoip::{GeoInfo, GeoLookup};
use crate::sink::RawEventSink;

const GEOHASH_PRECISION: usize = 4;

pub struct CaptureState {
    pub geoip: Arc<dyn GeoLookup>,
    pub resolver: Arc<dyn ReverseDns>,
    pub sink: Arc<dyn RawEventSink>,
}

pub fn router(state: Arc<CaptureState>) -> Router {
    Router::new()
        .route("/", get(locate))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Caller address: first `X-Forwarded-For` entry, else the transport peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN.to_string(),
    }
}

/// Precision-4 geohash, when both coordinates are present and in range.
pub fn location_geohash(latitude: Option<f64>, longitude: Option<f64>) -> Option<String> {
    let (lat, lng) = latitude.zip(longitude)?;
    geohash::encode(Coord { x: lng, y: lat }, GEOHASH_PRECISION).ok()
}

/// Build the raw event for a caller. Lookup failures leave defaults.
pub async fn capture(state: &CaptureState, ip: String) -> RawEvent {
    let geo = match state.geoip.lookup(&ip).await {
        Ok(geo) => geo,
        Err(e) => {
            warn!(ip = ip.as_str(), error = %e, "Geo-IP lookup failed");
            GeoInfo::default()
        }
    };

    let subdomain = dns::resolve_subdomain(state.resolver.as_ref(), &ip).await;
    let geohash = location_geohash(geo.latitude, geo.longitude);

    RawEvent {
        organization: geo.organization.unwrap_or_else(|| UNKNOWN.to_string()),
        subdomain,
        geohash,
        latitude: geo.latitude,
        longitude: geo.longitude,
        timestamp: None,
        ip: Some(ip),
    }
}

#[derive(Serialize)]
struct LocationBody<'a> {
    location: &'a RawEvent,
}

async fn locate(State(state): State<Arc<CaptureState>>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    let event = capture(&state, ip).await;

    let stored = RawEvent {
        timestamp: Some(Utc::now()),
        ..event.clone()
    };
    if let Err(e) = state.sink.append(&stored).await {
        warn!(error = %e, "Failed to store raw event");
    }

    info!(
        ip = event.ip.as_deref().unwrap_or(UNKNOWN),
        organization = event.organization.as_str(),
        subdomain = event.subdomain.as_deref().unwrap_or("<none>"),
        geohash = event.geohash.as_deref().unwrap_or("<none>"),
        "Captured job location"
    );

    match serde_yaml::to_string(&LocationBody { location: &event }) {
        Ok(body) => ([(header::CONTENT_TYPE, "text/yaml")], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:55000".parse().unwrap())
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("141.142.1.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer()), "141.142.1.1");
    }

    #[test]
    fn peer_used_without_header() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "10.1.2.3");
    }

    #[test]
    fn unknown_without_any_address() {
        assert_eq!(client_ip(&HeaderMap::new(), None), UNKNOWN);
    }

    #[test]
    fn geohash_needs_both_coordinates() {
        assert_eq!(location_geohash(Some(40.1106), None), None);
        assert_eq!(
            location_geohash(Some(40.1106), Some(-88.2283)).as_deref(),
            Some("dp1k")
        );
    }
}
