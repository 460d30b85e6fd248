//! Outbound page transport: CONNECT tunnel, TLS, and HTTP/1.1 framing.

pub mod http1;
pub mod tls;
pub mod tunnel;
pub mod user_agents;

pub use http1::{RawResponse, ResponseParseError, decode_chunked, parse_response};
pub use tunnel::{
    PageFetcher, TunnelClient, TunnelError, TunnelResponse, TunnelSession, TunnelStage,
    establish_tunnel,
};
pub use user_agents::{DESKTOP_USER_AGENTS, random_desktop_user_agent};
