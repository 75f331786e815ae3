//! Bounded exponential backoff over transient failures

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use switchboard_config::RetryConfig;

use crate::cancel::CancellationBridge;
use crate::error::LlmError;
use crate::phase::{CallPhase, CallTracker};

/// Retry settings for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays, clamped to at least 1
    pub backoff_multiplier: f64,
    /// Randomise each delay by up to ten percent
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier: clamp_multiplier(backoff_multiplier),
            jitter: false,
        }
    }

    /// Policy with no retries
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Result<Self, LlmError> {
        let initial_delay = config
            .initial_delay()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self::new(config.max_retries, initial_delay, config.backoff_multiplier).with_jitter(config.jitter))
    }

    /// Delay before retry `attempt` (counted from zero)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = clamp_multiplier(self.backoff_multiplier).powi(exponent);
        let mut secs = self.initial_delay.as_secs_f64() * factor;

        if self.jitter {
            secs *= rand::rng().random_range(0.9..=1.1);
        }

        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn clamp_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 }
}

/// Runs an operation until it succeeds, fails terminally, exhausts its
/// retries, or is cancelled
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` up to `max_retries + 1` times
    ///
    /// `operation` receives the zero-based attempt number. Only transient
    /// errors are retried; after exhaustion the last transient error is
    /// returned. Cancellation before an attempt, during one, or while
    /// backing off ends the call with [`LlmError::Cancelled`].
    ///
    /// On success the tracker is left in [`CallPhase::Waiting`]; the caller
    /// marks the call completed once the reply has been decoded.
    pub async fn run<T, F, Fut>(
        &self,
        bridge: &CancellationBridge,
        tracker: &mut CallTracker,
        mut operation: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;

        loop {
            if bridge.is_requested() {
                tracker.advance(CallPhase::Cancelled);
                return Err(LlmError::Cancelled);
            }

            tracker.advance(CallPhase::Sending);
            let pending = operation(attempt);
            tracker.advance(CallPhase::Waiting);

            match bridge.guard(pending).await {
                Ok(value) => return Ok(value),
                Err(LlmError::Cancelled) => {
                    tracker.advance(CallPhase::Cancelled);
                    return Err(LlmError::Cancelled);
                }
                Err(error) if error.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        provider = %tracker.provider(),
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient failure, retrying"
                    );

                    tracker.advance(CallPhase::Retrying);
                    if bridge.sleep(delay).await.is_err() {
                        tracker.advance(CallPhase::Cancelled);
                        return Err(LlmError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::debug!(provider = %tracker.provider(), attempts = attempt + 1, "retries exhausted");
                    }
                    tracker.advance(CallPhase::Failed);
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;

    fn tracker() -> CallTracker {
        let mut tracker = CallTracker::new("test");
        tracker.advance(CallPhase::Formatting);
        tracker
    }

    fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::new(max_retries, Duration::from_millis(100), 2.0))
    }

    /// Operation failing transiently `failures` times before succeeding
    async fn flaky(calls: Arc<AtomicU32>, failures: u32) -> Result<&'static str, LlmError> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        if call < failures {
            Err(LlmError::Network("connection refused".into()))
        } else {
            Ok("ok")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_within_budget() {
        for failures in 0..=3 {
            let calls = Arc::new(AtomicU32::new(0));
            let mut tracker = tracker();
            let result = executor(3)
                .run(&CancellationBridge::default(), &mut tracker, |_| flaky(Arc::clone(&calls), failures))
                .await;

            assert_eq!(result, Ok("ok"));
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
            assert_eq!(tracker.phase(), CallPhase::Waiting);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut tracker = tracker();
        let result = executor(2)
            .run(&CancellationBridge::default(), &mut tracker, |_| flaky(Arc::clone(&calls), 10))
            .await;

        assert_eq!(result, Err(LlmError::Network("connection refused".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.phase(), CallPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = executor(5)
            .run(&CancellationBridge::default(), &mut tracker(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::remote(Some(401), "bad key")) }
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(401));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_exponentially() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let result = executor(3)
            .run(&CancellationBridge::default(), &mut tracker(), |_| flaky(Arc::clone(&calls), 3))
            .await;

        assert!(result.is_ok());
        // 100ms + 200ms + 400ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(720), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_retrying() {
        let token = CancellationToken::new();
        let bridge = CancellationBridge::new(Some(&token));
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut tracker = tracker();
        let result = executor(10)
            .run(&bridge, &mut tracker, |_| flaky(Arc::clone(&calls), 100))
            .await;

        assert_eq!(result, Err(LlmError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.phase(), CallPhase::Cancelled);
    }

    #[tokio::test]
    async fn pre_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let result = executor(3)
            .run(&CancellationBridge::new(Some(&token)), &mut tracker(), |_| {
                flaky(Arc::clone(&calls), 0)
            })
            .await;

        assert_eq!(result, Err(LlmError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delays_follow_the_multiplier() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), 0.25);
        assert!((policy.backoff_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 1.0).with_jitter(true);
        for _ in 0..100 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(899) && delay <= Duration::from_millis(1101));
        }
    }

    #[test]
    fn builds_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_retries: 1,
            initial_delay: "250ms".into(),
            backoff_multiplier: 3.0,
            jitter: true,
        })
        .unwrap();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert!(policy.jitter);
    }
}
