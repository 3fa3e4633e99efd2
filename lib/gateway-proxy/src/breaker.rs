//! Per-route circuit breaking over a sliding window of call outcomes
//!
//! Each route gets a count-based window of its last N outcomes. Once the
//! window is full, a failure rate or slow-call rate at or above the
//! configured threshold opens the circuit; calls then short-circuit to the
//! fallback router until the wait duration elapses, after which a limited
//! number of trial calls decide whether to close or reopen. All state is
//! atomic; concurrent requests to the same route never serialize on a lock.
//!
//! Admission is permit-based: `try_acquire` returns a [`CallPermit`] that
//! must be completed with the call's outcome. A permit dropped mid-call
//! (client disconnect, task cancellation) records a failure, so cancelled
//! calls cannot leak half-open trial slots.

use crate::chain::{GatewayFilter, GatewayResponse, Next};
use crate::context::RequestContext;
use crate::fallback::FallbackRouter;
use crate::metrics::MetricsCollector;
use gateway_core::{BreakerConfig, BreakerSettings, GatewayError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Circuit states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; outcomes feed the sliding window.
    Closed,
    /// Calls are short-circuited to the fallback router.
    Open,
    /// A limited number of trial calls are admitted.
    HalfOpen,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Outcome of a completed downstream call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Completed successfully but slower than the slow-call threshold.
    Slow,
}

const SLOT_EMPTY: u8 = 0;
const SLOT_SUCCESS: u8 = 1;
const SLOT_FAILURE: u8 = 2;
const SLOT_SLOW: u8 = 3;

pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: AtomicU8,
    /// Ring buffer of the last `window_size` outcomes.
    slots: Box<[AtomicU8]>,
    head: AtomicUsize,
    /// Occupied slots; rates are evaluated only once the window is full.
    total: AtomicU32,
    failures: AtomicU32,
    slow: AtomicU32,
    /// Milliseconds since `epoch` at which the circuit last opened.
    opened_at_ms: AtomicU64,
    epoch: Instant,
    half_open_admitted: AtomicU32,
    half_open_successes: AtomicU32,
}

/// Admission token for one call. Complete it with the call's outcome; if it
/// is dropped first, the call was cancelled and counts as a failure.
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    completed: bool,
}

impl CallPermit<'_> {
    pub fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.breaker.record(outcome);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            debug!("call cancelled mid-flight, recording failure");
            self.breaker.record(Outcome::Failure);
        }
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let window = settings.window_size.max(1);
        let slots = (0..window)
            .map(|_| AtomicU8::new(SLOT_EMPTY))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            settings,
            state: AtomicU8::new(STATE_CLOSED),
            slots,
            head: AtomicUsize::new(0),
            total: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            slow: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            half_open_admitted: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Admission check for one call. In OPEN state the first caller after
    /// the wait duration flips the circuit to HALF_OPEN; half-open admission
    /// is capped at the configured number of trial calls. `None` means the
    /// call must be short-circuited.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let admitted = match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at_ms.load(Ordering::SeqCst);
                if self.now_ms().saturating_sub(opened_at)
                    < self.settings.wait_duration().as_millis() as u64
                {
                    return None;
                }
                if self
                    .state
                    .compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    debug!("circuit transitioning to half-open");
                    self.half_open_admitted.store(0, Ordering::SeqCst);
                    self.half_open_successes.store(0, Ordering::SeqCst);
                }
                self.admit_half_open()
            }
            CircuitState::HalfOpen => self.admit_half_open(),
        };

        admitted.then(|| CallPermit {
            breaker: self,
            completed: false,
        })
    }

    /// Record the outcome of a completed call.
    pub fn record(&self, outcome: Outcome) {
        match self.state() {
            CircuitState::Closed => {
                self.push(outcome);
                self.evaluate();
            }
            CircuitState::HalfOpen => match outcome {
                Outcome::Failure => {
                    warn!("circuit reopening: failure during half-open trial");
                    self.trip_open();
                }
                Outcome::Success | Outcome::Slow => {
                    let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                    if successes >= self.settings.half_open_permitted_calls {
                        debug!(successes, "circuit closing after successful trials");
                        self.close();
                    }
                }
            },
            // Late results from calls admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    pub fn slow_call_duration(&self) -> Duration {
        self.settings.slow_call_duration()
    }

    pub fn call_timeout(&self) -> Duration {
        self.settings.call_timeout()
    }

    fn admit_half_open(&self) -> bool {
        self.half_open_admitted.fetch_add(1, Ordering::SeqCst)
            < self.settings.half_open_permitted_calls
    }

    fn push(&self, outcome: Outcome) {
        let value = match outcome {
            Outcome::Success => SLOT_SUCCESS,
            Outcome::Failure => SLOT_FAILURE,
            Outcome::Slow => SLOT_SLOW,
        };

        let idx = self.head.fetch_add(1, Ordering::SeqCst) % self.slots.len();
        let evicted = self.slots[idx].swap(value, Ordering::SeqCst);

        match evicted {
            SLOT_EMPTY => {
                self.total.fetch_add(1, Ordering::SeqCst);
            }
            SLOT_FAILURE => {
                self.failures.fetch_sub(1, Ordering::SeqCst);
            }
            SLOT_SLOW => {
                self.slow.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        match value {
            SLOT_FAILURE => {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
            SLOT_SLOW => {
                self.slow.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn evaluate(&self) {
        let window = self.slots.len() as u32;
        if self.total.load(Ordering::SeqCst) < window {
            return;
        }

        let failures = self.failures.load(Ordering::SeqCst);
        let slow = self.slow.load(Ordering::SeqCst);
        let failure_rate = failures as f32 * 100.0 / window as f32;
        let slow_rate = slow as f32 * 100.0 / window as f32;

        if failure_rate >= self.settings.failure_rate_threshold
            || slow_rate >= self.settings.slow_call_rate_threshold
        {
            warn!(
                failure_rate,
                slow_rate,
                window,
                "circuit opening: threshold exceeded"
            );
            self.trip_open();
        }
    }

    fn trip_open(&self) {
        self.state.store(STATE_OPEN, Ordering::SeqCst);
        self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
    }

    fn close(&self) {
        self.reset_window();
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    fn reset_window(&self) {
        for slot in self.slots.iter() {
            slot.store(SLOT_EMPTY, Ordering::SeqCst);
        }
        self.head.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
        self.slow.store(0, Ordering::SeqCst);
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Lazily-built breakers, one per route, with per-route setting overrides.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn for_route(&self, route_id: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(route_id) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(route_id.to_string())
            .or_insert_with(|| {
                debug!(route = %route_id, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(self.config.for_route(route_id).clone()))
            })
            .clone()
    }
}

/// Innermost filter: wraps the downstream call with the breaker and the
/// absolute call timeout, redirecting failures to the fallback router.
pub struct CircuitBreakerFilter {
    breakers: Arc<BreakerRegistry>,
    fallback: Arc<FallbackRouter>,
    metrics: Option<MetricsCollector>,
}

impl CircuitBreakerFilter {
    pub fn new(breakers: Arc<BreakerRegistry>, fallback: Arc<FallbackRouter>) -> Self {
        Self {
            breakers,
            fallback,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, collector: MetricsCollector) -> Self {
        self.metrics = Some(collector);
        self
    }

    fn record_fallback(&self, route_id: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_fallback(route_id);
        }
    }
}

#[async_trait::async_trait]
impl GatewayFilter for CircuitBreakerFilter {
    fn name(&self) -> &'static str {
        "CircuitBreakerFilter"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<GatewayResponse, GatewayError> {
        let Some(route) = ctx.route.clone() else {
            // No route resolved; the terminal handler reports the 404.
            return next.run(ctx).await;
        };

        let breaker = self.breakers.for_route(&route.id).await;

        let Some(permit) = breaker.try_acquire() else {
            warn!(route = %route.id, "circuit open, short-circuiting to fallback");
            self.record_fallback(&route.id);
            return Ok(self.fallback.short_circuit(&ctx.method, Some(&route.id)));
        };

        // If this future is dropped mid-call (client disconnect), the
        // permit records the failure on its way out.
        let started = Instant::now();
        match tokio::time::timeout(breaker.call_timeout(), next.run(ctx)).await {
            // The in-flight downstream call is dropped on expiry.
            Err(_elapsed) => {
                warn!(route = %route.id, "downstream call exceeded absolute timeout");
                permit.complete(Outcome::Failure);
                self.record_fallback(&route.id);
                Ok(self.fallback.short_circuit(&ctx.method, Some(&route.id)))
            }
            Ok(Ok(response)) => {
                let outcome = if response.status().is_server_error() {
                    Outcome::Failure
                } else if started.elapsed() >= breaker.slow_call_duration() {
                    Outcome::Slow
                } else {
                    Outcome::Success
                };
                permit.complete(outcome);
                Ok(response)
            }
            Ok(Err(err)) => match err {
                GatewayError::DownstreamTimeout(_) | GatewayError::DownstreamUnavailable(_) => {
                    permit.complete(Outcome::Failure);
                    self.record_fallback(&route.id);
                    Ok(self.fallback.short_circuit(&ctx.method, Some(&route.id)))
                }
                other => {
                    permit.complete(Outcome::Failure);
                    Err(other)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{json_response, FilterChain, ProxyHandler};
    use crate::fallback::FallbackResponse;
    use gateway_core::{RouteDefinition, RoutePredicate, RouteRegistry};
    use hyper::body::Bytes;
    use hyper::header::HeaderMap;
    use hyper::{Method, StatusCode};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn settings(window: usize, failure_threshold: f32, wait_ms: u64) -> BreakerSettings {
        BreakerSettings {
            window_size: window,
            failure_rate_threshold: failure_threshold,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_ms: 2_000,
            wait_duration_ms: wait_ms,
            half_open_permitted_calls: 2,
            call_timeout_ms: 3_000,
        }
    }

    fn breaker(s: BreakerSettings) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(s))
    }

    #[test]
    fn test_stays_closed_until_window_full() {
        let cb = breaker(settings(5, 50.0, 10_000));
        for _ in 0..4 {
            cb.record(Outcome::Failure);
        }
        // Four outcomes in a five-slot window: not evaluated yet.
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_at_failure_threshold() {
        // window=5, threshold=50%: 3 failures + 2 successes trips it.
        let cb = breaker(settings(5, 50.0, 10_000));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Success);
        cb.record(Outcome::Failure);
        cb.record(Outcome::Success);
        cb.record(Outcome::Failure);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let cb = breaker(settings(5, 50.0, 10_000));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        for _ in 0..3 {
            cb.record(Outcome::Success);
        }
        // 40% < 50%
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_sliding_window_evicts_old_outcomes() {
        let cb = breaker(settings(4, 75.0, 10_000));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        cb.record(Outcome::Success);
        // 75% failures: opens.
        assert_eq!(cb.state(), CircuitState::Open);

        // A fresh breaker where old failures slide out stays closed.
        let cb = breaker(settings(4, 75.0, 10_000));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        cb.record(Outcome::Success);
        cb.record(Outcome::Success);
        assert_eq!(cb.state(), CircuitState::Closed);
        // The two failures are evicted by newer successes.
        cb.record(Outcome::Success);
        cb.record(Outcome::Success);
        cb.record(Outcome::Failure);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_slow_calls_open_circuit_without_failures() {
        let mut s = settings(4, 100.0, 10_000);
        s.slow_call_rate_threshold = 50.0;
        let cb = breaker(s);
        cb.record(Outcome::Slow);
        cb.record(Outcome::Slow);
        cb.record(Outcome::Success);
        cb.record(Outcome::Success);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_after_wait_then_closes_on_successes() {
        let cb = breaker(settings(2, 50.0, 20));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;

        let first = cb.try_acquire().expect("first trial admitted");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let second = cb.try_acquire().expect("second trial admitted");
        // Permitted trial calls exhausted.
        assert!(cb.try_acquire().is_none());

        first.complete(Outcome::Success);
        second.complete(Outcome::Success);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(settings(2, 50.0, 20));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let trial = cb.try_acquire().expect("trial admitted");
        trial.complete(Outcome::Failure);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_dropped_permit_counts_as_failure() {
        let cb = breaker(settings(2, 50.0, 20));
        cb.record(Outcome::Failure);
        cb.record(Outcome::Failure);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let trial = cb.try_acquire().expect("trial admitted");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // The caller vanished mid-call: the permit records the failure.
        drop(trial);
        assert_eq!(cb.state(), CircuitState::Open);

        // The wait duration applies again, then fresh trials are admitted;
        // the slot is not leaked.
        assert!(cb.try_acquire().is_none());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[test]
    fn test_dropped_permits_feed_the_window_when_closed() {
        let cb = breaker(settings(2, 50.0, 10_000));
        drop(cb.try_acquire());
        drop(cb.try_acquire());
        // Two cancelled calls fill the window with failures.
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_registry_applies_per_route_overrides() {
        let mut config = BreakerConfig::default();
        config.routes.insert(
            "lab-1-service".to_string(),
            settings(5, 40.0, 30_000),
        );
        let registry = BreakerRegistry::new(config);

        let lab1 = registry.for_route("lab-1-service").await;
        assert_eq!(lab1.settings().window_size, 5);
        assert_eq!(lab1.settings().failure_rate_threshold, 40.0);

        let other = registry.for_route("other-service").await;
        assert_eq!(other.settings().window_size, 10);

        // Same breaker instance on repeated lookups.
        let again = registry.for_route("lab-1-service").await;
        assert!(Arc::ptr_eq(&lab1, &again));
    }

    // Chain-level tests for the filter.

    struct FlakyTerminal {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlakyTerminal {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl ProxyHandler for FlakyTerminal {
        async fn proxy(&self, _ctx: &mut RequestContext) -> Result<GatewayResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(GatewayError::DownstreamUnavailable("backend".to_string()))
            } else {
                Ok(json_response(StatusCode::OK, "{}".to_string()))
            }
        }
    }

    fn route_registry() -> Arc<RouteRegistry> {
        Arc::new(RouteRegistry::with_routes(vec![RouteDefinition {
            id: "backend".to_string(),
            predicate: RoutePredicate {
                path: "/api/**".to_string(),
                methods: vec![],
            },
            uri: "http://backend:8080".to_string(),
            filters: vec![],
        }]))
    }

    fn breaker_chain(terminal: Arc<FlakyTerminal>, window: usize) -> FilterChain {
        let mut config = BreakerConfig::default();
        config.default = settings(window, 50.0, 10_000);
        let breakers = Arc::new(BreakerRegistry::new(config));
        FilterChain::new(route_registry(), terminal)
            .add(CircuitBreakerFilter::new(breakers, Arc::new(FallbackRouter::new())))
    }

    fn request() -> RequestContext {
        RequestContext::new(Method::GET, "/api/reports", HeaderMap::new(), Bytes::new())
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_without_backend_call() {
        let terminal = FlakyTerminal::new();
        let chain = breaker_chain(terminal.clone(), 4);

        // Fill the window with failures to open the circuit. Each failed
        // call is answered by the fallback envelope.
        terminal.fail.store(true, Ordering::SeqCst);
        for _ in 0..4 {
            let response = chain.process(request()).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 4);

        // Circuit now open: the backend is no longer contacted.
        terminal.fail.store(false, Ordering::SeqCst);
        let response = chain.process(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 4);

        let envelope: FallbackResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(envelope.status, 503);
        assert_eq!(envelope.error, "Service Unavailable");
        assert!(envelope.message.contains("backend"));
    }

    #[tokio::test]
    async fn test_successful_calls_pass_through() {
        let terminal = FlakyTerminal::new();
        let chain = breaker_chain(terminal.clone(), 4);

        for _ in 0..8 {
            let response = chain.process(request()).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_absolute_timeout_counts_as_failure() {
        struct SlowTerminal {
            calls: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl ProxyHandler for SlowTerminal {
            async fn proxy(
                &self,
                _ctx: &mut RequestContext,
            ) -> Result<GatewayResponse, GatewayError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json_response(StatusCode::OK, "{}".to_string()))
            }
        }

        let mut config = BreakerConfig::default();
        config.default = settings(2, 50.0, 10_000);
        config.default.call_timeout_ms = 20;
        let breakers = Arc::new(BreakerRegistry::new(config));
        let terminal = Arc::new(SlowTerminal {
            calls: AtomicUsize::new(0),
        });
        let chain = FilterChain::new(route_registry(), terminal.clone()).add(
            CircuitBreakerFilter::new(breakers.clone(), Arc::new(FallbackRouter::new())),
        );

        let response = chain.process(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);

        let response = chain.process(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Two timeouts fill the window: the circuit opens.
        let breaker = breakers.for_route("backend").await;
        assert_eq!(breaker.state(), CircuitState::Open);
        let response = chain.process(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_aborted_trial_call_reopens_the_circuit() {
        struct HangingTerminal;

        #[async_trait::async_trait]
        impl ProxyHandler for HangingTerminal {
            async fn proxy(
                &self,
                _ctx: &mut RequestContext,
            ) -> Result<GatewayResponse, GatewayError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json_response(StatusCode::OK, "{}".to_string()))
            }
        }

        let mut config = BreakerConfig::default();
        config.default = settings(2, 50.0, 20);
        let breakers = Arc::new(BreakerRegistry::new(config));
        let chain = Arc::new(
            FilterChain::new(route_registry(), Arc::new(HangingTerminal)).add(
                CircuitBreakerFilter::new(breakers.clone(), Arc::new(FallbackRouter::new())),
            ),
        );

        let breaker = breakers.for_route("backend").await;
        breaker.record(Outcome::Failure);
        breaker.record(Outcome::Failure);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        // A trial is admitted, hangs against the backend, and the client
        // goes away before it completes.
        let task = {
            let chain = chain.clone();
            tokio::spawn(async move { chain.process(request()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        task.abort();
        let _ = task.await;

        // The cancelled trial counted as a failure: the circuit reopened
        // instead of wedging half-open with the trial slot leaked.
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_unrouted_request_bypasses_breaker() {
        let terminal = FlakyTerminal::new();
        let chain = breaker_chain(terminal.clone(), 4);
        let ctx = RequestContext::new(Method::GET, "/other", HeaderMap::new(), Bytes::new());
        // No route: the breaker steps aside and the terminal still runs.
        let response = chain.process(ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
