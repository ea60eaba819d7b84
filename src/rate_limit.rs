//! Sliding-window permit gate for outbound API requests.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{trace, warn};

const MAX_THROTTLE_JITTER_MS: u64 = 500;

#[derive(Debug)]
struct GateState {
    /// Timestamps of permits granted inside the current window, oldest first.
    granted: VecDeque<Instant>,
    /// No permits are handed out before this instant.
    suspended_until: Option<Instant>,
}

impl GateState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.granted.front() {
            if now.duration_since(oldest) >= window {
                self.granted.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until the next permit frees up, or `None` if one is
    /// available right now.
    fn next_delay(&mut self, now: Instant, limit: usize, window: Duration) -> Option<Duration> {
        if let Some(until) = self.suspended_until {
            if now < until {
                return Some(until.duration_since(now));
            }
            self.suspended_until = None;
        }
        if self.granted.len() < limit {
            return None;
        }
        self.granted
            .front()
            .map(|&oldest| (oldest + window).saturating_duration_since(now))
    }
}

/// Bounds outbound request rate to a fixed budget per rolling window.
///
/// Permits are accounted against a sliding window of grant timestamps, so a
/// burst right after a quiet period still cannot exceed the budget the way a
/// reset-every-period bucket would allow. The gate never fails; it only
/// delays the caller.
pub struct RequestGate {
    limit: usize,
    window: Duration,
    state: Mutex<GateState>,
}

impl RequestGate {
    pub fn new(limit: usize, window: Duration) -> Self {
        debug_assert!(limit > 0, "permit budget must be at least 1");
        RequestGate {
            limit,
            window,
            state: Mutex::new(GateState {
                granted: VecDeque::with_capacity(limit),
                suspended_until: None,
            }),
        }
    }

    /// Block until a permit is available, then consume it.
    ///
    /// Cancel-safe: the lock is never held across an await point, so a
    /// dropped future consumes no permit and leaves the window consistent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.prune(now, self.window);
                match state.next_delay(now, self.limit, self.window) {
                    None => {
                        state.granted.push_back(now);
                        return;
                    }
                    Some(delay) => delay,
                }
            };
            trace!(wait = ?wait, "request gate saturated, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Report an upstream throttling signal.
    ///
    /// Suspends all permits until the reset hint elapses, plus a small random
    /// offset so repeated runs do not retry in lockstep.
    pub async fn on_throttled(&self, reset_hint: Duration) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MAX_THROTTLE_JITTER_MS));
        let until = Instant::now() + reset_hint + jitter;
        let mut state = self.state.lock().await;
        let effective = match state.suspended_until {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        state.suspended_until = Some(effective);
        warn!(reset_hint = ?reset_hint, "permits suspended after throttling signal");
    }

    /// Permits still available in the current window.
    pub async fn available_permits(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune(now, self.window);
        self.limit.saturating_sub(state.granted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_budget_immediately() {
        let gate = RequestGate::new(4, WINDOW);
        let start = Instant::now();
        for _ in 0..4 {
            gate.acquire().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(gate.available_permits().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_budget_per_rolling_window() {
        let gate = RequestGate::new(4, WINDOW);
        let mut grants = Vec::new();
        for _ in 0..12 {
            gate.acquire().await;
            grants.push(Instant::now());
        }
        for &t in &grants {
            let in_window = grants
                .iter()
                .filter(|&&g| g >= t && g.duration_since(t) < WINDOW)
                .count();
            assert!(in_window <= 4, "{in_window} permits granted inside one window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_after_quiet_period_still_waits_for_window() {
        let gate = RequestGate::new(4, WINDOW);
        let start = Instant::now();
        for _ in 0..4 {
            gate.acquire().await;
        }
        // Half a window of silence does not reset the budget.
        tokio::time::advance(Duration::from_secs(30)).await;
        gate.acquire().await;
        assert_eq!(Instant::now().duration_since(start), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_hint_suspends_permits() {
        let gate = RequestGate::new(10, WINDOW);
        for _ in 0..3 {
            gate.acquire().await;
        }
        let before = Instant::now();
        gate.on_throttled(Duration::from_secs(2)).await;

        // The next call is delayed at least the hint; later ones still complete.
        gate.acquire().await;
        assert!(Instant::now().duration_since(before) >= Duration::from_secs(2));
        gate.acquire().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquire_shares_one_window() {
        use std::sync::Arc;

        let gate = Arc::new(RequestGate::new(3, WINDOW));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                Instant::now()
            }));
        }
        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        let immediate = grants.iter().filter(|&&g| g == start).count();
        assert_eq!(immediate, 3, "exactly the budget is granted up front");
    }
}
