pub mod config;
pub mod dns;
pub mod error;
pub mod geoip;
pub mod routes;
pub mod sink;

pub use config::CaptureConfig;
pub use error::{CaptureError, Result};
pub use geoip::{GeoInfo, GeoIpClient, GeoLookup};
pub use routes::{router, CaptureState};
pub use dns::{ReverseDns, SystemResolver};
pub use sink::{RawEventSink, SearchEventSink};
