//! Delay selection and the injectable wait used between retries.

use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Suspends the current task. Tests substitute an instantaneous recorder.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, dur: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// Source of the fractional second added to every exponential backoff.
#[derive(Clone)]
pub struct Jitter(Arc<dyn Fn() -> f64 + Send + Sync>);

impl Jitter {
    /// Uniform in `[0, 1)`.
    pub fn random() -> Self {
        Self(Arc::new(|| rand::thread_rng().gen_range(0.0..1.0)))
    }

    pub fn fixed(fraction: f64) -> Self {
        Self(Arc::new(move || fraction))
    }

    pub fn none() -> Self {
        Self::fixed(0.0)
    }

    /// Sampled jitter, clamped into `[0, 1)` seconds.
    pub fn sample(&self) -> Duration {
        let f = (self.0)();
        let f = if f.is_finite() { f.clamp(0.0, 0.999_999) } else { 0.0 };
        Duration::from_secs_f64(f)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Jitter(..)")
    }
}

/// `2^attempt` seconds plus `jitter`; `attempt` counts from zero.
pub fn backoff_delay(attempt: usize, jitter: Duration) -> Duration {
    let exp = 1u64 << attempt.min(16);
    Duration::from_secs(exp) + jitter
}
