//! Event system for scrape runs.
//!
//! Provides hooks for logging and custom reactions around each tunneled
//! request, block outcome, failure, and politeness pause.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Structured pre-request event.
#[derive(Debug, Clone)]
pub struct PreRequestEvent {
    pub keyword: Option<String>,
    pub url: Url,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

/// Structured post-response event.
#[derive(Debug, Clone)]
pub struct PostResponseEvent {
    pub url: Url,
    pub status: u16,
    pub session_id: String,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

/// The target answered, but with an anti-bot page.
#[derive(Debug, Clone)]
pub struct BlockedEvent {
    pub keyword: Option<String>,
    pub code: String,
    pub status: u16,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub keyword: Option<String>,
    pub code: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Politeness pause taken before the next batch item.
#[derive(Debug, Clone)]
pub struct DelayEvent {
    pub next_keyword: String,
    pub delay: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    PreRequest(PreRequestEvent),
    PostResponse(PostResponseEvent),
    Blocked(BlockedEvent),
    Error(ErrorEvent),
    Delay(DelayEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &ScrapeEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&self, event: ScrapeEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &ScrapeEvent) {
        match event {
            ScrapeEvent::PreRequest(pre) => {
                log::debug!("-> {} via {}", pre.url, pre.provider);
            }
            ScrapeEvent::PostResponse(post) => {
                log::debug!(
                    "<- {} -> {} ({:.2}s, session {})",
                    post.url,
                    post.status,
                    post.latency.as_secs_f64(),
                    post.session_id
                );
            }
            ScrapeEvent::Blocked(blocked) => {
                log::info!(
                    "{} for {:?} (status {}, session {})",
                    blocked.code,
                    blocked.keyword,
                    blocked.status,
                    blocked.session_id
                );
            }
            ScrapeEvent::Error(error) => {
                log::warn!("{} for {:?}: {}", error.code, error.keyword, error.error);
            }
            ScrapeEvent::Delay(delay) => {
                log::info!(
                    "paused {:.2}s before '{}'",
                    delay.delay.as_secs_f64(),
                    delay.next_keyword
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &ScrapeEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(ScrapeEvent::Error(ErrorEvent {
            keyword: Some("fiber internet".into()),
            code: "TIMEOUT".into(),
            error: "timed out".into(),
            timestamp: Utc::now(),
        }));
        dispatcher.dispatch(ScrapeEvent::Delay(DelayEvent {
            next_keyword: "cable internet".into(),
            delay: Duration::from_millis(2500),
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 2);
        assert_eq!(dispatcher.handler_count(), 2);
    }
}
