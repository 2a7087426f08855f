//! Upstream API access: transport, authentication, throttling and payloads.

pub mod auth;
pub mod endpoints;
pub mod throttle;
pub mod transport;

pub use auth::CookieJar;
pub use endpoints::InnertubeClient;
pub use throttle::HostThrottle;
pub use transport::{HttpTransport, Transport, TransportSettings};
