use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window request ceiling per caller identity.
///
/// Each governor owns its own state, so routes can carry different ceilings
/// and tests can build or [`reset`](RateGovernor::reset) one in isolation.
pub struct RateGovernor {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateGovernor {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Records a request for `caller` and reports whether it is allowed.
    /// Rejected requests are not recorded.
    pub fn check(&self, caller: &str) -> bool {
        self.check_at(caller, Instant::now())
    }

    pub fn check_at(&self, caller: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let recent = hits.entry(caller.to_string()).or_default();
        while let Some(oldest) = recent.front() {
            if now.saturating_duration_since(*oldest) < self.window {
                break;
            }
            recent.pop_front();
        }
        if recent.len() >= self.max_requests {
            return false;
        }
        recent.push_back(now);
        true
    }

    pub fn reset(&self) {
        self.hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
