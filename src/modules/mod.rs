//! Cross-cutting services module
//!
//! Proxy session identities, scrape events, and politeness timing shared by
//! the orchestrator and the transport.

pub mod events;
pub mod proxy;
pub mod timing;

// Re-export commonly used types
pub use events::{
    BlockedEvent, DelayEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
    PostResponseEvent, PreRequestEvent, ScrapeEvent,
};
pub use proxy::{
    FormattedCredentials, ProxyConfig, ProxyProvider, format_credentials, fresh_credentials,
    generate_session_id,
};
pub use timing::{DelayConfig, PolitenessDelay};
