//! Idle time between transport queries

use std::time::Duration;

use tokio::time::Instant;

/// Leaves at least `delay` of idle time between the end of one exchange and
/// the start of the next
#[derive(Debug)]
pub struct ProbeThrottle {
    delay: Duration,
    last_done: Option<Instant>,
}

impl ProbeThrottle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_done: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the idle time for subsequent exchanges
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Wait until the next exchange may start
    pub async fn wait(&self) {
        if let Some(last_done) = self.last_done {
            tokio::time::sleep_until(last_done + self.delay).await;
        }
    }

    /// Mark the current exchange finished
    pub fn done(&mut self) {
        self.last_done = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_is_immediate() {
        let throttle = ProbeThrottle::new(Duration::from_millis(150));
        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_counts_from_end_of_exchange() {
        let mut throttle = ProbeThrottle::new(Duration::from_millis(150));
        let start = Instant::now();

        // Instant exchange
        throttle.wait().await;
        throttle.done();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(150));

        // A 200 ms exchange still gets the full 150 ms after it
        tokio::time::sleep(Duration::from_millis(200)).await;
        throttle.done();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_delay_applies_to_next_wait() {
        let mut throttle = ProbeThrottle::new(Duration::from_millis(100));
        let start = Instant::now();
        throttle.done();
        throttle.set_delay(Duration::from_millis(150));

        throttle.wait().await;

        assert_eq!(throttle.delay(), Duration::from_millis(150));
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }
}
