//! The rate limiter handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::client::{self, ClientRequest};
use crate::config::LimiterConfig;
use crate::error::{Result, TurnstileError};

use super::window::WindowLog;

/// Per-client request-rate limiter.
///
/// One `RateLimiter` is constructed at process startup and shared (behind
/// an [`Arc`]) with every request handler. It stays inert until
/// [`initialize`](Self::initialize) succeeds, which starts the background
/// task that clears the window log at every timeframe boundary.
///
/// Recording a request and checking the verdict are independent calls;
/// the host decides their order, and whether the current request should
/// count toward its own verdict. [`check_and_record`](Self::check_and_record)
/// does both in one step for hosts that want that race closed.
pub struct RateLimiter {
    config: LimiterConfig,
    /// Shared with the reset task.
    window: Arc<WindowLog>,
    /// One-way false to true, flipped by the first successful `initialize`.
    initialized: Mutex<bool>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    ///
    /// The window reset task is not started here; call
    /// [`initialize`](Self::initialize) once a tokio runtime is available.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            window: Arc::new(WindowLog::new()),
            initialized: Mutex::new(false),
        }
    }

    /// Start the periodic window reset task.
    ///
    /// The task clears the entire window log every
    /// `timeframe_minutes * 60` seconds and runs for the life of the
    /// process. Must be called from within a tokio runtime; failure (an
    /// unusable configuration, or no runtime) leaves the limiter
    /// uninitialized so the host can retry or abort startup. Calls after
    /// the first succeed without side effects.
    pub fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(());
        }

        self.config.validate()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TurnstileError::Scheduler(e.to_string()))?;

        let window = Arc::clone(&self.window);
        let period = Duration::from_secs(self.config.timeframe_minutes * 60);
        handle.spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                trace!("Window elapsed, clearing request log");
                window.clear();
            }
        });

        *initialized = true;
        info!(
            timeframe_minutes = self.config.timeframe_minutes,
            use_reverse_proxy = self.config.use_reverse_proxy,
            "Rate limiter initialized"
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    /// Count an inbound request toward its client's quota.
    pub fn record<R: ClientRequest>(&self, request: &R) -> Result<()> {
        self.ensure_initialized()?;

        let identifier = self.identifier_for(request);
        trace!(client = %identifier, "Recording inbound request");
        self.window.record(identifier);
        Ok(())
    }

    /// Whether the client behind `request` has exceeded `limit` requests
    /// in the current window.
    ///
    /// The comparison is strict: a client with exactly `limit` recorded
    /// requests is still admitted, so effective capacity is `limit + 1`
    /// requests per window.
    pub fn is_rate_limited<R: ClientRequest>(&self, request: &R, limit: u64) -> Result<bool> {
        if limit == 0 {
            return Err(TurnstileError::InvalidLimit(limit));
        }
        self.ensure_initialized()?;

        let identifier = self.identifier_for(request);
        let count = self.window.count_matches(&identifier) as u64;
        let limited = count > limit;
        if limited {
            debug!(client = %identifier, count, limit, "Rate limit exceeded");
        }
        Ok(limited)
    }

    /// Check the verdict and record the request in one step.
    ///
    /// The count of already-recorded requests and the append of this one
    /// happen under a single lock acquisition, so a concurrent burst
    /// cannot slip between a separate check and record. The verdict covers
    /// only the previously recorded requests, same as check-then-record
    /// ordering.
    pub fn check_and_record<R: ClientRequest>(&self, request: &R, limit: u64) -> Result<bool> {
        if limit == 0 {
            return Err(TurnstileError::InvalidLimit(limit));
        }
        self.ensure_initialized()?;

        let identifier = self.identifier_for(request);
        let count = self.window.count_and_record(identifier.clone()) as u64;
        let limited = count > limit;
        if limited {
            debug!(client = %identifier, count, limit, "Rate limit exceeded");
        }
        Ok(limited)
    }

    /// Number of requests recorded in the current window, across all
    /// clients.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn identifier_for<R: ClientRequest>(&self, request: &R) -> String {
        client::resolve(request, self.config.use_reverse_proxy)
            .identifier(&self.config.placeholder_addr)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(TurnstileError::Uninitialized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RequestMeta;

    fn request_from(addr: &str) -> RequestMeta {
        RequestMeta {
            remote_addr: Some(format!("{}:51234", addr).parse().unwrap()),
            forwarded_for: None,
        }
    }

    fn forwarded(header: &str) -> RequestMeta {
        RequestMeta {
            remote_addr: Some("10.0.0.2:80".parse().unwrap()),
            forwarded_for: Some(header.to_string()),
        }
    }

    #[test]
    fn test_record_before_initialize_fails() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        let err = limiter.record(&request_from("192.0.2.7")).unwrap_err();
        assert!(matches!(err, TurnstileError::Uninitialized));
    }

    #[test]
    fn test_check_before_initialize_fails() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        let err = limiter
            .is_rate_limited(&request_from("192.0.2.7"), 10)
            .unwrap_err();
        assert!(matches!(err, TurnstileError::Uninitialized));
    }

    #[test]
    fn test_initialize_outside_runtime_fails() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        let err = limiter.initialize().unwrap_err();
        assert!(matches!(err, TurnstileError::Scheduler(_)));
        assert!(!limiter.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_rejects_zero_timeframe() {
        let config = LimiterConfig {
            timeframe_minutes: 0,
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::new(config);
        let err = limiter.initialize().unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
        assert!(!limiter.is_initialized());
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let err = limiter
            .is_rate_limited(&request_from("192.0.2.7"), 0)
            .unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidLimit(0)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let request = request_from("192.0.2.7");
        for _ in 0..3 {
            limiter.record(&request).unwrap();
        }

        // A second call succeeds and leaves the window intact.
        limiter.initialize().unwrap();
        assert!(limiter.is_initialized());
        assert_eq!(limiter.window_len(), 3);
    }

    #[tokio::test]
    async fn test_limit_boundary_is_strictly_greater() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let request = request_from("192.0.2.7");
        for _ in 0..3 {
            limiter.record(&request).unwrap();
        }

        // Exactly at the limit is still admitted.
        assert!(!limiter.is_rate_limited(&request, 3).unwrap());

        limiter.record(&request).unwrap();
        assert!(limiter.is_rate_limited(&request, 3).unwrap());
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let noisy = request_from("192.0.2.7");
        let quiet = request_from("198.51.100.44");
        for _ in 0..5 {
            limiter.record(&noisy).unwrap();
        }
        limiter.record(&quiet).unwrap();

        assert!(limiter.is_rate_limited(&noisy, 2).unwrap());
        assert!(!limiter.is_rate_limited(&quiet, 2).unwrap());
    }

    #[tokio::test]
    async fn test_forwarded_chain_counts_under_first_entry() {
        let config = LimiterConfig {
            use_reverse_proxy: true,
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::new(config);
        limiter.initialize().unwrap();

        let chain = forwarded("203.0.113.5, 70.41.3.18, 150.172.238.178");
        for _ in 0..3 {
            limiter.record(&chain).unwrap();
        }

        // A request naming the client directly lands in the same bucket.
        let direct_header = forwarded("203.0.113.5");
        assert!(limiter.is_rate_limited(&direct_header, 2).unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable_clients_share_placeholder_bucket() {
        let config = LimiterConfig {
            use_reverse_proxy: true,
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::new(config);
        limiter.initialize().unwrap();

        // Reverse proxy mode with no forwarded header at all.
        let headerless = request_from("10.0.0.9");
        for _ in 0..3 {
            limiter.record(&headerless).unwrap();
        }
        assert!(limiter.is_rate_limited(&headerless, 2).unwrap());
    }

    #[tokio::test]
    async fn test_check_and_record_counts_current_request_once() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let request = request_from("192.0.2.7");

        // Counts before the append: 0, 1, 2 against a limit of 2.
        assert!(!limiter.check_and_record(&request, 2).unwrap());
        assert!(!limiter.check_and_record(&request, 2).unwrap());
        assert!(!limiter.check_and_record(&request, 2).unwrap());
        // Fourth call sees 3 prior requests.
        assert!(limiter.check_and_record(&request, 2).unwrap());
        assert_eq!(limiter.window_len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_clears_counts() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.initialize().unwrap();

        let request = request_from("192.0.2.50");
        for _ in 0..5 {
            limiter.record(&request).unwrap();
        }
        assert_eq!(limiter.window_len(), 5);
        assert!(limiter.is_rate_limited(&request, 2).unwrap());

        // Default timeframe is one minute; step past the boundary.
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(limiter.window_len(), 0);
        assert!(!limiter.is_rate_limited(&request, 2).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cadence_follows_timeframe() {
        let config = LimiterConfig {
            timeframe_minutes: 5,
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::new(config);
        limiter.initialize().unwrap();

        let request = request_from("192.0.2.50");
        limiter.record(&request).unwrap();

        // One minute in, a five-minute window has not reset.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.window_len(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(limiter.window_len(), 0);
    }
}
