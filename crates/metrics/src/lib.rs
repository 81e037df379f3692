//! Thin wrapper over prometheus used by every engine crate. Metrics are
//! registered against one process-wide registry; timers record their
//! distribution when dropped.

use std::{
    sync::LazyLock,
    time::Instant,
};

pub use paste::paste;
pub use prometheus;
use prometheus::{
    Histogram,
    IntCounter,
    IntCounterVec,
    Registry,
};

pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register an integer counter with the engine registry and store it in a
/// static. The reported metric name is the lower_snake_case version of the
/// declared variable name. An optional third argument declares labels.
#[macro_export]
macro_rules! register_engine_counter {
    ($VIS:vis $NAME:ident, $HELP:literal $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::IntCounter> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::register_counter_impl(stringify!([<$NAME:lower>]), $HELP)
                }
            });
    };
    ($VIS:vis $NAME:ident, $HELP:literal, $LABELS:expr $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::IntCounterVec> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::register_counter_vec_impl(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        $LABELS,
                    )
                }
            });
    };
}

/// Register a histogram with the engine registry and store it in a static.
#[macro_export]
macro_rules! register_engine_histogram {
    ($VIS:vis $NAME:ident, $HELP:literal $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::Histogram> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::register_histogram_impl(stringify!([<$NAME:lower>]), $HELP)
                }
            });
    };
}

pub fn register_counter_impl(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("Metric initialization failed");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Metric registration failed");
    counter
}

pub fn register_counter_vec_impl(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(prometheus::Opts::new(name, help), labels)
        .expect("Metric initialization failed");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Metric registration failed");
    counter
}

pub fn register_histogram_impl(name: &str, help: &str) -> Histogram {
    let histogram = Histogram::with_opts(prometheus::HistogramOpts::new(name, help))
        .expect("Metric initialization failed");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Metric registration failed");
    histogram
}

pub fn log_counter(counter: &'static LazyLock<IntCounter>, increment: u64) {
    counter.inc_by(increment);
}

pub fn log_counter_with_labels(
    counter: &'static LazyLock<IntCounterVec>,
    increment: u64,
    labels: &[&str],
) {
    counter.with_label_values(labels).inc_by(increment);
}

pub fn log_distribution(histogram: &'static LazyLock<Histogram>, value: f64) {
    histogram.observe(value);
}

/// Records the elapsed wall time into its histogram on drop.
pub struct Timer {
    start: Instant,
    histogram: &'static LazyLock<Histogram>,
}

impl Timer {
    pub fn new(histogram: &'static LazyLock<Histogram>) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let elapsed = self.elapsed_secs();
        tracing::debug!("{elapsed}s recorded for timer");
        self.histogram.observe(elapsed);
    }
}

/// Counts one of `ok` / `error` on drop. Defaults to error unless
/// `.finish()` is called.
pub struct StatusTimer {
    counter: &'static LazyLock<IntCounterVec>,
    finished: bool,
}

impl StatusTimer {
    pub fn new(counter: &'static LazyLock<IntCounterVec>) -> Self {
        Self {
            counter,
            finished: false,
        }
    }

    pub fn finish(mut self) {
        self.finished = true;
        self.counter.with_label_values(&["ok"]).inc();
    }
}

impl Drop for StatusTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.counter.with_label_values(&["error"]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    register_engine_counter!(TEST_EVENTS_TOTAL, "Count of test events");
    register_engine_counter!(
        TEST_OUTCOMES_TOTAL,
        "Count of test outcomes by status",
        &["status"]
    );
    register_engine_histogram!(TEST_SECONDS, "Time spent testing");

    #[test]
    fn test_register_and_log() {
        log_counter(&TEST_EVENTS_TOTAL, 2);
        assert_eq!(TEST_EVENTS_TOTAL.get(), 2);

        log_counter_with_labels(&TEST_OUTCOMES_TOTAL, 1, &["ok"]);
        assert_eq!(TEST_OUTCOMES_TOTAL.with_label_values(&["ok"]).get(), 1);

        {
            let _timer = Timer::new(&TEST_SECONDS);
        }
        assert_eq!(TEST_SECONDS.get_sample_count(), 1);
    }

    #[test]
    fn test_status_timer_defaults_to_error() {
        {
            let _timer = StatusTimer::new(&TEST_OUTCOMES_TOTAL);
        }
        assert_eq!(TEST_OUTCOMES_TOTAL.with_label_values(&["error"]).get(), 1);
        let timer = StatusTimer::new(&TEST_OUTCOMES_TOTAL);
        timer.finish();
    }
}
