use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Named wall-clock timers and counters for one thread.
#[derive(Debug, Default)]
pub struct Profiler {
    timers: BTreeMap<String, Instant>,
    measurements: BTreeMap<String, Vec<Duration>>,
    counters: BTreeMap<String, u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self, name: &str) {
        tracing::trace!(timer = name, "start_timer");
        self.timers.insert(name.to_string(), Instant::now());
    }

    pub fn end_timer(&mut self, name: &str) {
        if let Some(start) = self.timers.remove(name) {
            let duration = start.elapsed();
            tracing::debug!(timer = name, duration_ms = ?duration.as_millis(), "end_timer");
            self.add_measurement(name, duration);
        }
    }

    pub fn add_measurement(&mut self, name: &str, duration: Duration) {
        self.measurements.entry(name.to_string()).or_default().push(duration);
    }

    pub fn increment_counter(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get_stats(&self) -> ProfilerStats {
        let mut stats = BTreeMap::new();

        for (name, measurements) in &self.measurements {
            let (Some(min), Some(max)) = (measurements.iter().min(), measurements.iter().max()) else {
                continue;
            };
            let total: Duration = measurements.iter().sum();
            stats.insert(
                name.clone(),
                MeasurementStats {
                    count: measurements.len(),
                    total_time: total,
                    average_time: total / measurements.len() as u32,
                    min_time: *min,
                    max_time: *max,
                },
            );
        }

        ProfilerStats {
            measurements: stats,
            counters: self.counters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementStats {
    pub count: usize,
    pub total_time: Duration,
    pub average_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ProfilerStats {
    pub measurements: BTreeMap<String, MeasurementStats>,
    pub counters: BTreeMap<String, u64>,
}

use std::cell::RefCell;
use std::thread_local;

thread_local! {
    static PROFILER: RefCell<Profiler> = RefCell::new(Profiler::new());
}

pub fn with_profiler<F, R>(f: F) -> R
where
    F: FnOnce(&mut Profiler) -> R,
{
    PROFILER.with(|p| f(&mut p.borrow_mut()))
}
