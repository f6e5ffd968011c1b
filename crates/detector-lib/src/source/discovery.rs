//! Startup discovery of analysed services
//!
//! Polls the backend until at least one service with span metrics shows up,
//! with a fixed delay between attempts and a timeout per attempt. Discovery
//! is informational: the service serves requests whether it succeeds or not.

use std::time::Duration;

use super::{MetricsSource, QueryWindow};
use crate::observability::StructuredLogger;

/// Default number of discovery attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Default timeout for a single attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Final state of a discovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// At least one service was listed
    Found(Vec<String>),
    /// All attempts used up
    GaveUp {
        attempts: u32,
        last_error: Option<String>,
    },
}

/// Result of one attempt
#[derive(Debug)]
enum Attempt {
    Found(Vec<String>),
    Empty,
    Failed(String),
    TimedOut,
}

impl Attempt {
    fn error(&self) -> Option<String> {
        match self {
            Attempt::Failed(message) => Some(message.clone()),
            Attempt::TimedOut => Some("attempt timed out".to_string()),
            Attempt::Found(_) | Attempt::Empty => None,
        }
    }
}

/// Bounded retry loop for listing services at startup
#[derive(Debug, Clone)]
pub struct StartupDiscovery {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for StartupDiscovery {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl StartupDiscovery {
    pub fn new(max_attempts: u32, retry_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
            attempt_timeout,
        }
    }

    async fn attempt(&self, source: &dyn MetricsSource, window: QueryWindow) -> Attempt {
        match tokio::time::timeout(self.attempt_timeout, source.list_services(window)).await {
            Ok(Ok(services)) if !services.is_empty() => Attempt::Found(services),
            Ok(Ok(_)) => Attempt::Empty,
            Ok(Err(e)) => Attempt::Failed(e.to_string()),
            Err(_) => Attempt::TimedOut,
        }
    }

    /// Run discovery until services are found or attempts run out
    pub async fn run(
        &self,
        source: &dyn MetricsSource,
        window: QueryWindow,
        logger: &StructuredLogger,
    ) -> DiscoveryOutcome {
        let mut last_error = None;

        for attempt_no in 1..=self.max_attempts {
            let attempt = self.attempt(source, window).await;
            if let Attempt::Found(services) = attempt {
                logger.log_discovery_result(&services);
                return DiscoveryOutcome::Found(services);
            }

            last_error = attempt.error();
            if attempt_no == 1 {
                logger.log_discovery_waiting(attempt_no, last_error.as_deref());
            }
            if attempt_no < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        logger.log_discovery_gave_up(self.max_attempts, last_error.as_deref());
        DiscoveryOutcome::GaveUp {
            attempts: self.max_attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DetectError, Result};
    use crate::models::{MetricKind, SeriesBatch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails for the first `failures` calls, then lists `services`
    struct FlakySource {
        failures: u32,
        services: Vec<String>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl FlakySource {
        fn new(failures: u32, services: &[&str]) -> Self {
            Self {
                failures,
                services: services.iter().map(|s| s.to_string()).collect(),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl MetricsSource for FlakySource {
        async fn fetch(&self, _kind: MetricKind, _window: QueryWindow) -> Result<SeriesBatch> {
            Ok(Vec::new())
        }

        async fn list_services(&self, _window: QueryWindow) -> Result<Vec<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                return Err(DetectError::Upstream("connection refused".to_string()));
            }
            Ok(self.services.clone())
        }
    }

    fn fast_discovery(max_attempts: u32) -> StartupDiscovery {
        StartupDiscovery::new(max_attempts, Duration::from_millis(1), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_found_after_retries() {
        let source = FlakySource::new(2, &["api", "web"]);
        let logger = StructuredLogger::new("test");

        let outcome = fast_discovery(5)
            .run(&source, QueryWindow::default(), &logger)
            .await;

        assert_eq!(
            outcome,
            DiscoveryOutcome::Found(vec!["api".to_string(), "web".to_string()])
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let source = FlakySource::new(u32::MAX, &[]);
        let logger = StructuredLogger::new("test");

        let outcome = fast_discovery(3)
            .run(&source, QueryWindow::default(), &logger)
            .await;

        assert_eq!(
            outcome,
            DiscoveryOutcome::GaveUp {
                attempts: 3,
                last_error: Some("connection refused".to_string()),
            }
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_retrying() {
        let source = FlakySource::new(0, &[]);
        let logger = StructuredLogger::new("test");

        let outcome = fast_discovery(2)
            .run(&source, QueryWindow::default(), &logger)
            .await;

        assert_eq!(
            outcome,
            DiscoveryOutcome::GaveUp {
                attempts: 2,
                last_error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let mut source = FlakySource::new(0, &["api"]);
        source.delay = Duration::from_millis(500);
        let logger = StructuredLogger::new("test");

        let discovery =
            StartupDiscovery::new(1, Duration::from_millis(1), Duration::from_millis(20));
        let outcome = discovery
            .run(&source, QueryWindow::default(), &logger)
            .await;

        assert_eq!(
            outcome,
            DiscoveryOutcome::GaveUp {
                attempts: 1,
                last_error: Some("attempt timed out".to_string()),
            }
        );
    }
}
