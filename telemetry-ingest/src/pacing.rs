use std::time::Duration;

use rand::Rng;

/// Where the job waits: retry cooldowns and the pause between days.
#[async_trait::async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real wall-clock waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait::async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniformly random duration in `[min, max)`; `min` when the range is empty.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..max.as_secs_f64());
    Duration::from_secs_f64(secs)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_half_open_range() {
        let min = Duration::from_secs(2);
        let max = Duration::from_secs(5);
        for _ in 0..1_000 {
            let d = jitter(min, max);
            assert!(d >= min && d < max, "{d:?} out of range");
        }
    }

    #[test]
    fn jitter_with_empty_range_returns_min() {
        let d = Duration::from_secs(3);
        assert_eq!(jitter(d, d), d);
        assert_eq!(jitter(d, Duration::from_secs(1)), d);
    }
}
