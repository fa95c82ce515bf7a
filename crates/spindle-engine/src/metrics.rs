//! Per-event and per-run timing metrics.
//!
//! [`EventMetrics`] is filled by the driver for each completed event;
//! [`RunMetrics`] accumulates them over a run.

/// Timing and traffic of a single event.
///
/// Durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct EventMetrics {
    /// Wall-clock time for the whole event.
    pub total_us: u64,
    /// Per-module run times in pipeline order: `(module, microseconds)`.
    /// Skipped modules are absent.
    pub module_us: Vec<(String, u64)>,
    /// Modules skipped because a REQUIRED input was missing.
    pub skipped_modules: u32,
    /// Dispatch calls made during the event.
    pub dispatches: u32,
    /// Messages held in the inbox when the event ended.
    pub messages_held: usize,
}

/// Totals over every completed event of a run.
#[derive(Clone, Debug, Default)]
pub struct RunMetrics {
    /// Events that completed without error.
    pub completed_events: u64,
    /// Events that failed.
    pub failed_events: u64,
    /// Modules skipped, summed over events.
    pub skipped_modules: u64,
    /// Dispatch calls, summed over events.
    pub dispatches: u64,
    /// Event processing time summed over events (exceeds wall time when
    /// workers run in parallel).
    pub busy_us: u64,
    /// Per-module run time summed over events: `(module, microseconds)`.
    pub module_us: Vec<(String, u64)>,
    /// Wall-clock time of the run.
    pub wall_us: u64,
}

impl RunMetrics {
    pub(crate) fn record(&mut self, event: &EventMetrics) {
        self.completed_events += 1;
        self.skipped_modules += u64::from(event.skipped_modules);
        self.dispatches += u64::from(event.dispatches);
        self.busy_us += event.total_us;
        for (name, us) in &event.module_us {
            match self.module_us.iter_mut().find(|(n, _)| n == name) {
                Some((_, total)) => *total += us,
                None => self.module_us.push((name.clone(), *us)),
            }
        }
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_events += 1;
    }

    /// Mean processing time of completed events, in microseconds.
    pub fn mean_event_us(&self) -> u64 {
        self.busy_us
            .checked_div(self.completed_events)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = RunMetrics::default();
        assert_eq!(m.completed_events, 0);
        assert_eq!(m.failed_events, 0);
        assert!(m.module_us.is_empty());
        assert_eq!(m.mean_event_us(), 0);
    }

    #[test]
    fn record_sums_per_module() {
        let mut run = RunMetrics::default();
        let event = EventMetrics {
            total_us: 30,
            module_us: vec![("source".into(), 10), ("sink".into(), 20)],
            skipped_modules: 1,
            dispatches: 2,
            messages_held: 4,
        };
        run.record(&event);
        run.record(&event);
        run.record_failure();

        assert_eq!(run.completed_events, 2);
        assert_eq!(run.failed_events, 1);
        assert_eq!(run.skipped_modules, 2);
        assert_eq!(run.dispatches, 4);
        assert_eq!(
            run.module_us,
            vec![("source".to_string(), 20), ("sink".to_string(), 40)]
        );
        assert_eq!(run.mean_event_us(), 30);
    }
}
