use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use location_capture::{
    router, CaptureConfig, CaptureState, GeoIpClient, SearchEventSink, SystemResolver,
};
use search_client::SearchClient;

/// Default log directives, applied on top of `RUST_LOG`. Covers the store
/// client so retry warnings show without extra configuration.
const DEFAULT_DIRECTIVES: [&str; 3] = ["location=info", "search_client=info", "tower_http=info"];

fn env_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .init();

    let config = CaptureConfig::from_env();
    config.log_redacted();

    let mut client = SearchClient::new(config.search.url.clone());
    if let Some(user) = config.search.user.clone() {
        client = client.with_basic_auth(user, config.search.password.clone());
    }

    // Storing events is best-effort, so an unreachable store only warns.
    if let Err(e) = client.ping().await {
        warn!(url = config.search.url.as_str(), error = %e, "Search cluster unreachable at startup");
    }

    let state = Arc::new(CaptureState {
        geoip: Arc::new(GeoIpClient::new(config.geoip_url.clone())),
        resolver: Arc::new(SystemResolver),
        sink: Arc::new(SearchEventSink::new(client)),
    });

    let addr = config.bind_addr();
    info!("Location capture starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
