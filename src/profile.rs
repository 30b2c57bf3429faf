//! Stage timing behind the `profiling` feature.
//!
//! Without the feature every guard is a zero-sized no-op.

#[cfg(feature = "profiling")]
use parking_lot::Mutex;
#[cfg(feature = "profiling")]
use std::sync::OnceLock;
#[cfg(feature = "profiling")]
use std::time::{Duration, Instant};

#[cfg(feature = "profiling")]
#[derive(Debug, Default)]
struct StageTimings {
    entries: rustc_hash::FxHashMap<&'static str, (u64, Duration)>,
}

#[cfg(feature = "profiling")]
impl StageTimings {
    fn record(&mut self, stage: &'static str, duration: Duration) {
        let entry = self.entries.entry(stage).or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += duration;
    }
}

#[cfg(feature = "profiling")]
static TIMINGS: OnceLock<Mutex<StageTimings>> = OnceLock::new();

#[cfg(feature = "profiling")]
fn timings() -> &'static Mutex<StageTimings> {
    TIMINGS.get_or_init(|| Mutex::new(StageTimings::default()))
}

/// Records elapsed time for a stage when dropped.
#[cfg(feature = "profiling")]
pub struct ProfileGuard {
    stage: &'static str,
    start: Instant,
}

#[cfg(feature = "profiling")]
impl Drop for ProfileGuard {
    fn drop(&mut self) {
        timings().lock().record(self.stage, self.start.elapsed());
    }
}

#[cfg(feature = "profiling")]
pub fn profile_scope(stage: &'static str) -> ProfileGuard {
    ProfileGuard {
        stage,
        start: Instant::now(),
    }
}

/// Log accumulated stage timings, slowest first.
#[cfg(feature = "profiling")]
pub fn report() {
    let stats = timings().lock();
    let mut entries: Vec<_> = stats
        .entries
        .iter()
        .map(|(stage, (count, total))| (*stage, *count, *total))
        .collect();
    entries.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(b.0)));

    for (stage, count, total) in entries {
        let avg_ms = if count == 0 {
            0.0
        } else {
            total.as_secs_f64() * 1000.0 / count as f64
        };
        tracing::info!(
            stage,
            count,
            total_secs = total.as_secs_f64(),
            avg_ms,
            "Stage timing"
        );
    }
}

#[cfg(not(feature = "profiling"))]
pub struct ProfileGuard;

#[cfg(not(feature = "profiling"))]
pub fn profile_scope(_stage: &'static str) -> ProfileGuard {
    ProfileGuard
}

#[cfg(not(feature = "profiling"))]
pub fn report() {}
