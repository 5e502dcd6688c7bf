//! Usage tracking across completions.

use std::sync::{Arc, PoisonError, RwLock};

use crate::types::usage::{Cost, Usage, UsageSummary};

/// Tracks two independent usage tallies.
///
/// `total` counts every completion, cache hits included; `actual` counts only
/// completions that reached the backend. Each can be reset on its own.
#[derive(Clone, Default)]
pub struct UsageTracker {
    inner: Arc<RwLock<UsageTrackerInner>>,
}

#[derive(Default)]
struct UsageTrackerInner {
    total: Option<UsageSummary>,
    actual: Option<UsageSummary>,
}

impl UsageSummary {
    fn record(&mut self, model: &str, usage: &Usage, cost: &Cost) {
        self.total_cost += cost.total_cost;
        self.completions += 1;
        self.by_model.entry(model.to_string()).or_default().merge(usage);
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completion. `cached` completions only count toward the total.
    pub fn record(&self, model: Option<&str>, usage: &Usage, cost: &Cost, cached: bool) {
        let model = model.unwrap_or("unknown");
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .total
            .get_or_insert_with(UsageSummary::default)
            .record(model, usage, cost);
        if !cached {
            inner
                .actual
                .get_or_insert_with(UsageSummary::default)
                .record(model, usage, cost);
        }
    }

    /// Usage of every completion, `None` if nothing was recorded since the last reset.
    pub fn total_usage_summary(&self) -> Option<UsageSummary> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).total.clone()
    }

    /// Usage of backend calls only, `None` if nothing was recorded since the last reset.
    pub fn actual_usage_summary(&self) -> Option<UsageSummary> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).actual.clone()
    }

    /// Both tallies at once, as `(total, actual)`.
    pub fn usage_summary(&self) -> (Option<UsageSummary>, Option<UsageSummary>) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (inner.total.clone(), inner.actual.clone())
    }

    pub fn reset_total(&self) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).total = None;
    }

    pub fn reset_actual(&self) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).actual = None;
    }

    /// Reset both tallies.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.total = None;
        inner.actual = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_are_independent() {
        let tracker = UsageTracker::new();
        tracker.record(Some("m"), &Usage::new(1, 2), &Cost::new(1.0), false);
        tracker.reset_actual();

        assert!(tracker.actual_usage_summary().is_none());
        assert_eq!(tracker.total_usage_summary().unwrap().completions, 1);

        tracker.record(Some("m"), &Usage::new(1, 2), &Cost::new(1.0), true);
        tracker.reset_total();
        assert!(tracker.total_usage_summary().is_none());
        assert!(tracker.actual_usage_summary().is_none());
    }

    #[test]
    fn merges_per_model() {
        let tracker = UsageTracker::new();
        tracker.record(Some("m"), &Usage::new(1, 2), &Cost::new(0.25), false);
        tracker.record(Some("m"), &Usage::new(3, 4), &Cost::new(0.25), false);
        let summary = tracker.total_usage_summary().unwrap();
        assert_eq!(summary.by_model["m"], Usage::new(4, 6));
        assert_eq!(summary.total_cost, 0.5);
    }
}
