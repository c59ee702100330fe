use crate::config::BreakerConfig;
use crate::error::BackendError;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// All calls pass through.
    Closed,
    /// All calls fail immediately with no network attempt.
    Open,
    /// A bounded number of trial calls are permitted.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Rolling counters scoped to one counting window.
struct Counters {
    window_started: Instant,
    requests: u32,
    total_failures: u32,
    consecutive_failures: u32,
}

impl Counters {
    fn new() -> Self {
        Self {
            window_started: Instant::now(),
            requests: 0,
            total_failures: 0,
            consecutive_failures: 0,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    counters: Counters,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Gates calls to the backend client, failing fast during sustained outages.
///
/// The mutex serializes accounting only, never the underlying I/O: it is
/// acquired before and after a call, not across the await, so concurrent
/// calls still execute concurrently.
pub struct CircuitBreaker {
    name: String,
    min_requests: u32,
    consecutive_failures: u32,
    failure_ratio: f64,
    window: Duration,
    open_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::from_parts(
            name,
            config.min_requests,
            config.consecutive_failures,
            config.failure_ratio,
            Duration::from_secs(config.window_seconds),
            Duration::from_secs(config.open_timeout_seconds),
            config.half_open_max_calls,
        )
    }

    fn from_parts(
        name: impl Into<String>,
        min_requests: u32,
        consecutive_failures: u32,
        failure_ratio: f64,
        window: Duration,
        open_timeout: Duration,
        half_open_max_calls: u32,
    ) -> Self {
        Self {
            name: name.into(),
            min_requests,
            consecutive_failures,
            failure_ratio,
            window,
            open_timeout,
            half_open_max_calls,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                counters: Counters::new(),
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Execute a backend call through the breaker.
    ///
    /// While open this returns `CircuitOpen` without invoking the operation
    /// at all, bounding caller-visible latency and shielding a failing
    /// backend from retry storms. Only backend-health failures (connectivity,
    /// timeout, 5xx) count against the breaker; client-side errors pass
    /// through without affecting it.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.try_acquire()?;

        match f().await {
            Ok(value) => {
                self.on_success();
                crate::metrics::record_backend_request(operation, "success");
                Ok(value)
            }
            Err(e) => {
                if counts_against_breaker(&e) {
                    self.on_failure();
                    crate::metrics::record_backend_request(operation, "failure");
                    warn!(
                        breaker = %self.name,
                        operation = operation,
                        error = %e,
                        "backend call failed"
                    );
                } else {
                    // The backend answered; a client-side error is proof of
                    // life as far as the breaker is concerned.
                    self.on_success();
                    crate::metrics::record_backend_request(operation, "client_error");
                }
                Err(e)
            }
        }
    }

    /// Current state. The Open→Half-Open transition happens on the next
    /// admitted call, not here.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.roll_window(&mut inner);
        inner.state
    }

    fn try_acquire(&self) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.roll_window(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.open_timeout)
                    .unwrap_or(true);

                if cooled_down {
                    info!(breaker = %self.name, "circuit half-open, admitting trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    crate::metrics::update_circuit_state(&self.name, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(BackendError::CircuitOpen(format!(
                        "breaker '{}' is open",
                        self.name
                    )))
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    Ok(())
                } else {
                    Err(BackendError::CircuitOpen(format!(
                        "breaker '{}' is half-open and at its trial limit",
                        self.name
                    )))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.roll_window(&mut inner);

        inner.counters.requests += 1;
        inner.counters.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            info!(breaker = %self.name, "trial call succeeded, closing circuit");
            inner.state = CircuitState::Closed;
            inner.counters = Counters::new();
            inner.opened_at = None;
            inner.half_open_in_flight = 0;
            crate::metrics::update_circuit_state(&self.name, CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.roll_window(&mut inner);

        inner.counters.requests += 1;
        inner.counters.total_failures += 1;
        inner.counters.consecutive_failures += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "trial call failed, reopening circuit");
                self.trip(&mut inner);
            }
            CircuitState::Closed => {
                let c = &inner.counters;
                let ratio = c.total_failures as f64 / c.requests as f64;
                if c.requests >= self.min_requests
                    && (c.consecutive_failures >= self.consecutive_failures
                        || ratio >= self.failure_ratio)
                {
                    warn!(
                        breaker = %self.name,
                        requests = c.requests,
                        consecutive_failures = c.consecutive_failures,
                        failure_ratio = ratio,
                        "failure threshold reached, opening circuit"
                    );
                    self.trip(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_in_flight = 0;
        crate::metrics::update_circuit_state(&self.name, CircuitState::Open);
    }

    /// Counters reset at counting-window boundaries.
    fn roll_window(&self, inner: &mut BreakerInner) {
        if inner.counters.window_started.elapsed() >= self.window {
            inner.counters = Counters::new();
        }
    }
}

/// Whether an error indicates the backend itself is unhealthy.
///
/// Connectivity failures, timeouts, and 5xx statuses count against the
/// breaker. Client errors (4xx), malformed payloads, and cancellations do
/// not: the backend was reachable, the call just went wrong.
pub fn counts_against_breaker(error: &BackendError) -> bool {
    match error {
        BackendError::Connectivity(_) => true,
        BackendError::Timeout(_) => true,
        BackendError::HttpStatus { status, .. } => status.is_server_error(),
        BackendError::Cancelled(_) => false,
        BackendError::MalformedResponse(_) => false,
        BackendError::CircuitOpen(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_error() -> BackendError {
        BackendError::Connectivity("connection refused".to_string())
    }

    fn create_test_breaker() -> CircuitBreaker {
        // Default policy: min 3 requests, 5 consecutive failures.
        CircuitBreaker::new("test", &BreakerConfig::default())
    }

    #[tokio::test]
    async fn test_default_policy_opens_after_failing_calls() {
        let breaker = create_test_breaker();
        let attempts = AtomicUsize::new(0);

        for _ in 0..5 {
            let result: Result<(), _> = breaker
                .execute("query", || async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(failing_error())
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::Open);

        // The next call fails fast with zero additional network attempts.
        let before = attempts.load(Ordering::SeqCst);
        let result: Result<(), _> = breaker
            .execute("query", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(BackendError::CircuitOpen(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_consecutive_failures_trip_breaker() {
        let breaker = CircuitBreaker::from_parts(
            "consecutive",
            3,
            5,
            2.0, // ratio unreachable
            Duration::from_secs(60),
            Duration::from_secs(30),
            1,
        );
        let attempts = AtomicUsize::new(0);

        for _ in 0..4 {
            let _: Result<(), _> = breaker
                .execute("query", || async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(failing_error())
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _: Result<(), _> = breaker
            .execute("query", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(failing_error())
            })
            .await;

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_trip_breaker() {
        let breaker = create_test_breaker();

        for _ in 0..10 {
            let result: Result<(), _> = breaker
                .execute("query", || async {
                    Err(BackendError::HttpStatus {
                        status: reqwest::StatusCode::BAD_REQUEST,
                        body: "bad query".to_string(),
                    })
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failure_ratio_trips_breaker() {
        let breaker = CircuitBreaker::from_parts(
            "ratio",
            3,
            100, // consecutive threshold out of reach
            0.5,
            Duration::from_secs(60),
            Duration::from_secs(30),
            1,
        );

        let _ = breaker.execute("query", || async { Ok(()) }).await;
        for _ in 0..3 {
            let _: Result<(), _> = breaker
                .execute("query", || async { Err(failing_error()) })
                .await;
        }

        // 3 failures out of 4 requests = 0.75 >= 0.5
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let breaker = CircuitBreaker::from_parts(
            "recovery",
            1,
            1,
            1.0,
            Duration::from_secs(60),
            Duration::ZERO, // cooldown elapses immediately
            1,
        );

        let _: Result<(), _> = breaker
            .execute("query", || async { Err(failing_error()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cooldown has elapsed; this trial call is admitted and succeeds.
        let result = breaker.execute("query", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = CircuitBreaker::from_parts(
            "relapse",
            1,
            1,
            1.0,
            Duration::from_secs(60),
            Duration::ZERO,
            1,
        );

        let _: Result<(), _> = breaker
            .execute("query", || async { Err(failing_error()) })
            .await;
        let _: Result<(), _> = breaker
            .execute("query", || async { Err(failing_error()) })
            .await;

        assert_eq!(breaker.state(), CircuitState::Open);

        // The failed trial reopened the circuit; after the (zero) cooldown
        // the next trial is admitted again and closes it.
        let result: Result<(), _> = breaker.execute("query", || async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_window_reset_clears_counters() {
        let breaker = CircuitBreaker::from_parts(
            "window",
            3,
            5,
            2.0, // ratio unreachable, only the consecutive threshold matters
            Duration::from_millis(20),
            Duration::from_secs(30),
            1,
        );

        for _ in 0..4 {
            let _: Result<(), _> = breaker
                .execute("query", || async { Err(failing_error()) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed); // 4 < 5 consecutive

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Window rolled: old failures no longer count toward the thresholds.
        let _: Result<(), _> = breaker
            .execute("query", || async { Err(failing_error()) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_counts_against_breaker() {
        assert!(counts_against_breaker(&BackendError::Connectivity("x".into())));
        assert!(counts_against_breaker(&BackendError::Timeout("x".into())));
        assert!(counts_against_breaker(&BackendError::HttpStatus {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        }));
        assert!(!counts_against_breaker(&BackendError::HttpStatus {
            status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            body: String::new(),
        }));
        assert!(!counts_against_breaker(&BackendError::MalformedResponse(
            "x".into()
        )));
        assert!(!counts_against_breaker(&BackendError::Cancelled("x".into())));
    }
}
