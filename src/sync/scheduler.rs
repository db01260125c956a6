use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::debounce::Debouncer;
use crate::model::Snapshot;

/// Publishes after the workspace has been quiet for the configured delay.
///
/// Every change tears down the pending timer and starts a new one; the
/// snapshot handed out when it fires is the latest one seen.
#[derive(Debug)]
pub struct AutoSync {
    enabled: bool,
    debouncer: Debouncer,
    latest: Option<Arc<Snapshot>>,
}

impl AutoSync {
    pub fn new(delay: Duration) -> Self {
        Self {
            enabled: true,
            debouncer: Debouncer::new(delay),
            latest: None,
        }
    }

    /// Never fires. Used when sync credentials are missing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_change(&mut self, snapshot: Arc<Snapshot>, now: Instant) {
        if !self.enabled {
            return;
        }
        self.debouncer.cancel();
        self.latest = Some(snapshot);
        self.debouncer.schedule(now);
    }

    /// The snapshot to publish once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Arc<Snapshot>> {
        if self.debouncer.poll(now) {
            self.latest.take()
        } else {
            None
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::seed;

    const DELAY: Duration = Duration::from_millis(30_000);

    #[test]
    fn burst_of_changes_fires_once_with_latest_snapshot() {
        let start = Instant::now();
        let mut auto = AutoSync::new(DELAY);
        let snapshots: Vec<Arc<Snapshot>> = (0..5).map(|_| Arc::new(seed::snapshot())).collect();

        let mut last = start;
        for (step, snapshot) in snapshots.iter().enumerate() {
            last = start + Duration::from_secs(step as u64);
            auto.on_change(Arc::clone(snapshot), last);
            assert!(auto.poll(last).is_none());
        }

        assert!(auto.poll(last + DELAY - Duration::from_millis(1)).is_none());
        let fired = auto.poll(last + DELAY).expect("fires");
        assert!(Arc::ptr_eq(&fired, &snapshots[4]));
        assert!(auto.poll(last + DELAY * 2).is_none());
    }

    #[test]
    fn disabled_scheduler_never_fires() {
        let now = Instant::now();
        let mut auto = AutoSync::disabled();
        auto.on_change(Arc::new(seed::snapshot()), now);
        assert_eq!(auto.next_deadline(), None);
        assert!(auto.poll(now + DELAY).is_none());
    }

    #[test]
    fn cancel_drops_pending_publish() {
        let now = Instant::now();
        let mut auto = AutoSync::new(DELAY);
        auto.on_change(Arc::new(seed::snapshot()), now);
        auto.cancel();
        assert!(auto.poll(now + DELAY).is_none());
    }
}
