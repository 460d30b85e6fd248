//! Politeness pacing between successive outbound requests.
//!
//! Batches are strictly sequential; the gap between two requests is a base
//! delay plus uniform random jitter so the cadence does not look scripted.

use rand::Rng;
use std::time::Duration;

/// Base + jitter delay envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayConfig {
    pub base: Duration,
    pub jitter: Duration,
}

impl DelayConfig {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// No waiting at all; used by tests and one-shot calls.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.base.is_zero() && self.jitter.is_zero()
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2500),
            jitter: Duration::from_millis(2000),
        }
    }
}

/// Produces randomized gaps from a [`DelayConfig`].
#[derive(Debug, Clone)]
pub struct PolitenessDelay {
    config: DelayConfig,
}

impl PolitenessDelay {
    pub fn new(config: DelayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> DelayConfig {
        self.config
    }

    /// Next gap, in `[base, base + jitter]`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.config.base + Duration::from_millis(extra)
    }

    /// Sleep for [`next_delay`](Self::next_delay) and report how long that was.
    pub async fn wait(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

impl Default for PolitenessDelay {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_envelope() {
        let delay = PolitenessDelay::new(DelayConfig::new(
            Duration::from_millis(100),
            Duration::from_millis(50),
        ));
        for _ in 0..200 {
            let next = delay.next_delay();
            assert!(next >= Duration::from_millis(100));
            assert!(next <= Duration::from_millis(150));
        }
    }

    #[test]
    fn zero_config_never_waits() {
        let delay = PolitenessDelay::new(DelayConfig::none());
        assert_eq!(delay.next_delay(), Duration::ZERO);
        assert!(delay.config().is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_reported_delay() {
        let delay = PolitenessDelay::new(DelayConfig::new(Duration::from_secs(3), Duration::ZERO));
        let started = tokio::time::Instant::now();
        let waited = delay.wait().await;
        assert_eq!(waited, Duration::from_secs(3));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
