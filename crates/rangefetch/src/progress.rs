//! Progress aggregation and throughput smoothing
//!
//! Chunk fetchers record raw byte counts; a timer task periodically folds
//! them into a single [`ProgressUpdate`] with a human-scaled total and a
//! throughput figure averaged over a sliding window of samples. A chunk
//! that restarts after a stall re-counts from zero internally, but the
//! aggregator clamps each chunk to its maximum observed count so reported
//! progress never moves backwards.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// One smoothed snapshot of overall transfer progress.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Total size scaled to `unit`, when the size is known.
    pub scaled_total: Option<f64>,
    /// Bytes received so far, scaled to `unit`.
    pub scaled_read: f64,
    /// Completion percentage, when the total size is known.
    pub percentage: Option<f64>,
    /// Unit the scaled figures are expressed in.
    pub unit: &'static str,
    /// Smoothed throughput, e.g. "3.21 MiB/s".
    pub throughput: String,
}

/// Callback invoked with each progress snapshot.
pub type ProgressObserver = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Default)]
struct AggregatorState {
    total_expected: Option<u64>,
    per_chunk: HashMap<u32, u64>,
    samples: VecDeque<u64>,
}

pub struct ProgressAggregator {
    state: Mutex<AggregatorState>,
    interval: Duration,
    max_samples: usize,
    observer: Option<ProgressObserver>,
    timer: Mutex<Option<JoinHandle<()>>>,
    // Serializes snapshot emission so observers see samples in order even
    // when the timer task and a stop() race on different threads.
    emit: Mutex<()>,
    // Set under the emit lock by stop(); a tick that was already past its
    // Weak upgrade when the timer was aborted checks this before emitting,
    // so nothing can follow the final snapshot.
    stopped: AtomicBool,
}

impl ProgressAggregator {
    pub fn new(
        interval: Duration,
        max_samples: usize,
        observer: Option<ProgressObserver>,
    ) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            interval,
            max_samples: max_samples.max(2),
            observer,
            timer: Mutex::new(None),
            emit: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn set_total(&self, total: Option<u64>) {
        self.state.lock().unwrap().total_expected = total;
    }

    /// Record the cumulative byte count for one chunk. Only ever raises the
    /// stored value, so a restarted chunk does not roll progress back.
    pub fn record(&self, chunk: u32, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        let entry = state.per_chunk.entry(chunk).or_insert(0);
        if bytes > *entry {
            *entry = bytes;
        }
    }

    /// Start the periodic sampling task. The task holds only a weak
    /// reference, so it winds down if the aggregator is dropped.
    pub fn start(this: &Arc<Self>) {
        this.stopped.store(false, Ordering::Release);
        let weak: Weak<Self> = Arc::downgrade(this);
        let interval = this.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(aggregator) => aggregator.timer_sample(),
                    None => break,
                }
            }
        });
        *this.timer.lock().unwrap() = Some(handle);
    }

    /// Stop the timer, emit one final snapshot so observers see 100%, then
    /// clear the window so the aggregator could serve another run.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
        {
            let _ordered = self.emit.lock().unwrap();
            self.stopped.store(true, Ordering::Release);
            self.emit_snapshot();
        }
        self.reset();
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.per_chunk.clear();
        state.samples.clear();
    }

    /// Take one sample and notify the observer.
    pub fn sample(&self) {
        let _ordered = self.emit.lock().unwrap();
        self.emit_snapshot();
    }

    fn timer_sample(&self) {
        let _ordered = self.emit.lock().unwrap();
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.emit_snapshot();
    }

    fn emit_snapshot(&self) {
        let update = {
            let mut state = self.state.lock().unwrap();
            let read: u64 = state.per_chunk.values().sum();
            state.samples.push_back(read);
            while state.samples.len() > self.max_samples {
                state.samples.pop_front();
            }

            let rate = mean_rate(&state.samples, self.interval);
            let (unit, divisor) = scale_unit(state.total_expected.unwrap_or(read));
            ProgressUpdate {
                scaled_total: state.total_expected.map(|t| t as f64 / divisor),
                scaled_read: read as f64 / divisor,
                percentage: state.total_expected.map(|t| {
                    if t == 0 {
                        100.0
                    } else {
                        read as f64 * 100.0 / t as f64
                    }
                }),
                unit,
                throughput: humanize_rate(rate),
            }
        };

        trace!(?update.percentage, throughput = %update.throughput, "progress sample");
        if let Some(observer) = &self.observer {
            observer(update);
        }
    }
}

/// Mean throughput in bytes per second over the sample window.
///
/// Samples are cumulative counts taken at `interval` spacing, so the mean of
/// consecutive deltas scaled by the interval gives the smoothed rate.
fn mean_rate(samples: &VecDeque<u64>, interval: Duration) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let first = *samples.front().unwrap();
    let last = *samples.back().unwrap();
    let elapsed = interval.as_secs_f64() * (samples.len() - 1) as f64;
    if elapsed <= 0.0 {
        return 0.0;
    }
    (last.saturating_sub(first)) as f64 / elapsed
}

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Pick a display unit for `size`. The 0.85 factor promotes values like
/// 900 MiB to a fractional GiB figure instead of a four-digit MiB one.
fn scale_unit(size: u64) -> (&'static str, f64) {
    let size = size as f64;
    if size >= 0.85 * GIB {
        ("GiB", GIB)
    } else if size >= 0.85 * MIB {
        ("MiB", MIB)
    } else if size >= 0.85 * KIB {
        ("KiB", KIB)
    } else {
        ("bytes", 1.0)
    }
}

fn humanize_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 0.85 * GIB {
        format!("{:.2} GiB/s", bytes_per_sec / GIB)
    } else if bytes_per_sec >= 0.85 * MIB {
        format!("{:.2} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= 0.85 * KIB {
        format!("{:.2} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}
