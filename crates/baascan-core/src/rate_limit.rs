//! Adaptive request pacing for generative backends.
//!
//! Every call waits for a governor permit via `until_ready()`, which spaces
//! requests at the configured rate across all concurrent summary workers. On
//! 429 the governor is slowed, and the original rate comes back after a
//! minute without further 429s.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::llm::{GenerationError, GenerationFuture, StructuredRequest, TextGenerator};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const MAX_SLOWDOWN: u32 = 16;
const DECAY_AFTER: Duration = Duration::from_secs(60);

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Rate limiter that slows itself down after 429 responses.
///
/// The governor is swapped atomically through [`ArcSwap`], so callers already
/// waiting on the old instance finish their wait and later callers see the
/// new rate.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, and so on.
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// Allow one request per `period`.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            limiter: ArcSwap::from(Arc::new(DirectLimiter::direct(quota_for(period)))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// Allow `n` requests per minute.
    pub fn per_minute(n: u32) -> Self {
        let ms = 60_000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    pub fn base_period(&self) -> Duration {
        self.base_period
    }

    pub fn slowdown(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load_full();
        limiter.until_ready().await;
    }

    /// Double the slowdown factor (capped at 16x) and swap in a slower governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_SLOWDOWN))
            });

        let factor = self.slowdown();
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
        tracing::info!(factor, "generator rate limited, slowing down");
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= DECAY_AFTER))
            .unwrap_or(false);

        if should_restore && self.slowdown() > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
            tracing::debug!("generator rate restored");
        }
    }
}

/// Wraps a [`TextGenerator`] with pacing and a per-call timeout.
///
/// The timeout covers the backend call only, not the time spent waiting for
/// a governor permit.
pub struct GovernedGenerator {
    inner: Box<dyn TextGenerator>,
    limiter: AdaptiveLimiter,
    timeout: Duration,
}

impl GovernedGenerator {
    pub fn new(inner: Box<dyn TextGenerator>, limiter: AdaptiveLimiter, timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            timeout,
        }
    }

    pub fn limiter(&self) -> &AdaptiveLimiter {
        &self.limiter
    }

    async fn timed<'a, T>(&self, call: GenerationFuture<'a, T>) -> Result<T, GenerationError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }

    /// Run `call` under the governor. A 429 slows the governor for later
    /// calls and is returned to the caller as is; there is no retry.
    async fn run<'a, T>(&'a self, call: GenerationFuture<'a, T>) -> Result<T, GenerationError> {
        self.limiter.acquire().await;
        let result = self.timed(call).await;
        if let Err(GenerationError::RateLimited { retry_after }) = &result {
            self.limiter.on_rate_limited();
            tracing::info!(
                backend = self.inner.name(),
                retry_after_secs = retry_after.map(|d| d.as_secs_f64()),
                "429 rate limited"
            );
        }
        result
    }
}

impl TextGenerator for GovernedGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String> {
        Box::pin(self.run(self.inner.generate(prompt)))
    }

    fn generate_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> GenerationFuture<'a, Option<String>> {
        Box::pin(self.run(self.inner.generate_structured(request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockGenerator, MockReply};

    /// Lets a test keep a handle on the mock after boxing it.
    struct SharedMock(Arc<MockGenerator>);

    impl TextGenerator for SharedMock {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String> {
            self.0.generate(prompt)
        }

        fn generate_structured<'a>(
            &'a self,
            request: &'a StructuredRequest,
        ) -> GenerationFuture<'a, Option<String>> {
            self.0.generate_structured(request)
        }
    }

    fn fast_limiter() -> AdaptiveLimiter {
        AdaptiveLimiter::per_minute(60_000)
    }

    #[test]
    fn per_minute_sets_period() {
        assert_eq!(
            AdaptiveLimiter::per_minute(60).base_period(),
            Duration::from_secs(1)
        );
        assert_eq!(
            AdaptiveLimiter::per_minute(0).base_period(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn on_rate_limited_doubles_and_caps() {
        let limiter = fast_limiter();
        assert_eq!(limiter.slowdown(), 1);
        limiter.on_rate_limited();
        assert_eq!(limiter.slowdown(), 2);
        for _ in 0..10 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.slowdown(), MAX_SLOWDOWN);
    }

    #[tokio::test]
    async fn decay_restores_after_a_minute() {
        let limiter = fast_limiter();
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        assert_eq!(limiter.slowdown(), 4);

        {
            let mut last = limiter.last_429.lock().unwrap();
            *last = Some(Instant::now() - Duration::from_secs(61));
        }

        limiter.acquire().await;
        assert_eq!(limiter.slowdown(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_passes_through() {
        let governed = GovernedGenerator::new(
            Box::new(MockGenerator::new("mock", MockReply::Text("summary".into()))),
            fast_limiter(),
            Duration::from_secs(10),
        );
        assert_eq!(governed.generate("text").await.unwrap(), "summary");
        assert_eq!(governed.name(), "mock");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let mock = MockGenerator::new("mock", MockReply::Text("late".into()))
            .with_delay(Duration::from_secs(30));
        let governed =
            GovernedGenerator::new(Box::new(mock), fast_limiter(), Duration::from_secs(5));
        let err = governed.generate("text").await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_is_returned_without_retry() {
        let mock = MockGenerator::with_sequence(
            "mock",
            vec![
                MockReply::Error(GenerationError::RateLimited {
                    retry_after: Some(Duration::from_secs(3)),
                }),
                MockReply::Text("second try".into()),
            ],
        );
        let governed =
            GovernedGenerator::new(Box::new(mock), fast_limiter(), Duration::from_secs(10));
        let err = governed.generate("text").await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited { .. }));
        assert_eq!(governed.limiter().slowdown(), 2);

        // The next call is a fresh request, not a hidden retry.
        assert_eq!(governed.generate("text").await.unwrap(), "second try");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_summary_falls_back_after_one_call() {
        let mock = Arc::new(MockGenerator::with_sequence(
            "mock",
            vec![
                MockReply::Error(GenerationError::RateLimited { retry_after: None }),
                MockReply::Text("retried summary".into()),
            ],
        ));
        let governed = GovernedGenerator::new(
            Box::new(SharedMock(mock.clone())),
            fast_limiter(),
            Duration::from_secs(10),
        );
        assert_eq!(
            crate::summarize::summarize(&governed, "report breaches,").await,
            crate::summarize::SUMMARY_FALLBACK
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let governed = GovernedGenerator::new(
            Box::new(MockGenerator::new(
                "mock",
                MockReply::Error(GenerationError::Connection("refused".into())),
            )),
            fast_limiter(),
            Duration::from_secs(10),
        );
        let err = governed.generate("text").await.unwrap_err();
        assert_eq!(err, GenerationError::Connection("refused".into()));
    }
}
