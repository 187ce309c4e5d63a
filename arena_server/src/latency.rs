//! Simulated outbound latency.
//!
//! A debugging aid for watching prediction and interpolation under delay.
//! The handle is created and owned by the server and handed to every
//! connection writer; nothing here is global. Messages are stamped with a due
//! instant when queued, so writers keep ordering and delays never stack.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::Instant;
use tracing::info;

/// Shared handle to the current artificial delay. Clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct LatencySimulation {
    delay_ms: Arc<AtomicU64>,
}

impl LatencySimulation {
    /// A stopped simulation (zero delay).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, delay: Duration) {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        self.delay_ms.store(ms, Ordering::Relaxed);
        info!(delay_ms = ms, "Latency simulation started");
    }

    pub fn stop(&self) {
        if self.delay_ms.swap(0, Ordering::Relaxed) != 0 {
            info!("Latency simulation stopped");
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.delay_ms.load(Ordering::Relaxed) > 0
    }

    /// When a message queued at `now` may go out.
    pub fn due_at(&self, now: Instant) -> Instant {
        now + self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_delay() {
        let sim = LatencySimulation::new();
        let seen_by_writer = sim.clone();
        assert!(!seen_by_writer.is_active());

        sim.start(Duration::from_millis(120));
        assert_eq!(seen_by_writer.current(), Duration::from_millis(120));

        let now = Instant::now();
        assert_eq!(seen_by_writer.due_at(now), now + Duration::from_millis(120));

        sim.stop();
        assert_eq!(seen_by_writer.due_at(now), now);
    }
}
