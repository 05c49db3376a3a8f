use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Enforces a minimum gap between consecutive outbound requests.
///
/// Callers `ready().await` before issuing a request and `mark()` once the
/// call has finished, whatever its outcome.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep for whatever is left of the interval since the last mark.
    pub async fn ready(&self) {
        let Some(last) = self.last else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.interval {
            let deficit = self.interval - elapsed;
            debug!(deficit_ms = deficit.as_millis() as u64, "throttling request");
            tokio::time::sleep(deficit).await;
        }
    }

    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_millis(500));
        let t0 = Instant::now();
        throttle.ready().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_deficit() {
        let mut throttle = Throttle::new(Duration::from_millis(500));
        throttle.mark();
        tokio::time::advance(Duration::from_millis(200)).await;

        let t0 = Instant::now();
        throttle.ready().await;
        let waited = t0.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
        assert!(waited < Duration::from_millis(310), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_once_interval_has_passed() {
        let mut throttle = Throttle::new(Duration::from_millis(500));
        throttle.mark();
        tokio::time::advance(Duration::from_millis(800)).await;

        let t0 = Instant::now();
        throttle.ready().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_marks_are_spaced_by_interval() {
        let mut throttle = Throttle::new(Duration::from_millis(500));
        let mut stamps = Vec::new();
        for _ in 0..4 {
            throttle.ready().await;
            stamps.push(Instant::now());
            throttle.mark();
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }
}
