//! Per-provider call quota tracking.
//!
//! [`QuotaTracker`] is an explicit, injected component rather than
//! module-level state: the orchestrator shares one instance across all
//! concurrent company tasks and reserves a call before every provider
//! attempt. A provider with no configured limit is assumed to have full
//! quota — on a first run the tracker cannot know the remaining budget, so
//! it fails open rather than closed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// A provider's call budget per rolling window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaLimit {
    /// Calls allowed per window.
    pub max_calls: u32,
    /// Window length (e.g. one day, one minute).
    pub window: Duration,
}

#[derive(Debug)]
struct ProviderWindow {
    started: Instant,
    used: u32,
}

/// Tracks calls-used-per-window for every configured provider.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    limits: HashMap<String, QuotaLimit>,
    windows: Mutex<HashMap<String, ProviderWindow>>,
}

impl QuotaTracker {
    /// Creates a tracker with no limits configured (everything fails open).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a per-window limit for a provider.
    #[must_use]
    pub fn with_limit(mut self, provider: impl Into<String>, max_calls: u32, window: Duration) -> Self {
        self.limits
            .insert(provider.into(), QuotaLimit { max_calls, window });
        self
    }

    /// Reserves one call against the provider's current window.
    ///
    /// Returns `false` once the window's quota is exhausted; the caller must
    /// defer the work to a later window rather than retry. Providers without
    /// a configured limit always succeed.
    pub fn reserve(&self, provider: &str) -> bool {
        let Some(limit) = self.limits.get(provider) else {
            return true;
        };

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            // A poisoned counter only ever under-reports usage; fail open.
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindow {
                started: Instant::now(),
                used: 0,
            });

        // Counter resets at the window boundary
        if window.started.elapsed() >= limit.window {
            window.started = Instant::now();
            window.used = 0;
        }

        if window.used < limit.max_calls {
            window.used += 1;
            true
        } else {
            debug!(provider, max_calls = limit.max_calls, "quota exhausted");
            false
        }
    }

    /// Calls left in the provider's current window; `None` means unlimited.
    pub fn remaining(&self, provider: &str) -> Option<u32> {
        let limit = self.limits.get(provider)?;
        let windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(match windows.get(provider) {
            Some(w) if w.started.elapsed() < limit.window => limit.max_calls.saturating_sub(w.used),
            _ => limit.max_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_refuses_once_the_window_is_spent() {
        let tracker = QuotaTracker::new().with_limit("fmp", 3, Duration::from_secs(60));
        assert!(tracker.reserve("fmp"));
        assert!(tracker.reserve("fmp"));
        assert!(tracker.reserve("fmp"));
        assert!(!tracker.reserve("fmp"));
        assert_eq!(tracker.remaining("fmp"), Some(0));
    }

    #[test]
    fn unconfigured_providers_fail_open() {
        let tracker = QuotaTracker::new();
        for _ in 0..1000 {
            assert!(tracker.reserve("edgar"));
        }
        assert_eq!(tracker.remaining("edgar"), None);
    }

    #[test]
    fn counter_resets_at_the_window_boundary() {
        let tracker = QuotaTracker::new().with_limit("fmp", 1, Duration::from_millis(20));
        assert!(tracker.reserve("fmp"));
        assert!(!tracker.reserve("fmp"));

        std::thread::sleep(Duration::from_millis(25));
        assert!(tracker.reserve("fmp"));
    }

    #[test]
    fn limits_are_tracked_per_provider() {
        let tracker = QuotaTracker::new()
            .with_limit("fmp", 1, Duration::from_secs(60))
            .with_limit("finnhub", 2, Duration::from_secs(60));
        assert!(tracker.reserve("fmp"));
        assert!(!tracker.reserve("fmp"));
        assert!(tracker.reserve("finnhub"));
        assert_eq!(tracker.remaining("finnhub"), Some(1));
    }
}
