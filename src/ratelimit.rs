// src/ratelimit.rs
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Fixed-interval pacer for sequential external calls. The first call goes
/// through immediately; each later call waits until `interval` has elapsed
/// since the previous one. A zero interval never sleeps.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub async fn pace(&mut self) {
        if let Some(prev) = self.last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_then_interval_is_enforced() {
        let mut pacer = Pacer::from_millis(500);
        let t0 = Instant::now();
        pacer.pace().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);

        pacer.pace().await;
        assert_eq!(t0.elapsed(), Duration::from_millis(500));

        pacer.pace().await;
        assert_eq!(t0.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_sleeps() {
        let mut pacer = Pacer::from_millis(0);
        let t0 = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_absorbs_the_interval() {
        let mut pacer = Pacer::from_millis(200);
        pacer.pace().await;
        // Work that already took longer than the interval: no extra wait.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = Instant::now();
        pacer.pace().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
