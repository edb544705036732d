use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Nominal EMA windows, in minutes. Dumped as `m1`, `m5`, `m15`.
const WINDOWS_MINUTES: [u32; 3] = [1, 5, 15];

/// Default capacity of the sliding percentile window.
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;

/// Single exponential moving average with a decay constant derived from the
/// expected sampling rate.
struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    fn new(rate_per_minute: f64, window_minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-5.0 / (window_minutes * rate_per_minute)).exp(),
            value: None,
        }
    }

    fn add(&mut self, sample: f64) {
        self.value = Some(match self.value {
            None => sample,
            Some(prev) => sample * self.alpha + prev * (1.0 - self.alpha),
        });
    }
}

/// Sliding-window percentile estimator over a fixed-capacity FIFO buffer.
///
/// Percentiles stay unset until the buffer has filled once; after that every
/// append evicts the oldest sample and recomputes p95/p98/p99 by sorted rank.
pub struct PercentileSample {
    samples: VecDeque<f64>,
    capacity: usize,
    p95: Option<f64>,
    p98: Option<f64>,
    p99: Option<f64>,
}

impl PercentileSample {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            p95: None,
            p98: None,
            p99: None,
        }
    }

    pub fn add(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.samples.push_back(sample);
            self.recompute();
        } else {
            self.samples.push_back(sample);
        }
    }

    pub fn percentiles(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        (self.p95, self.p98, self.p99)
    }

    fn recompute(&mut self) {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        self.p95 = Some(sorted[Self::rank(sorted.len(), 95)]);
        self.p98 = Some(sorted[Self::rank(sorted.len(), 98)]);
        self.p99 = Some(sorted[Self::rank(sorted.len(), 99)]);
    }

    // 1-based rank: percentile 95 of 1000 sorted samples is index 949.
    fn rank(len: usize, percentile: usize) -> usize {
        (len * percentile).div_ceil(100) - 1
    }
}

struct AverageState {
    emas: Vec<Ema>,
    percentile: PercentileSample,
    count: u64,
    last: Option<f64>,
}

/// Decayed-average metric: one EMA per nominal window plus a sliding
/// percentile window, a running count and the last recorded value.
pub struct DecayedAverage {
    state: Mutex<AverageState>,
}

impl DecayedAverage {
    /// `rate_per_minute` is the expected sampling rate the decay constants
    /// are derived from.
    pub fn new(rate_per_minute: f64, sample_size: usize) -> Self {
        Self {
            state: Mutex::new(AverageState {
                emas: WINDOWS_MINUTES
                    .iter()
                    .map(|mins| Ema::new(rate_per_minute, f64::from(*mins)))
                    .collect(),
                percentile: PercentileSample::new(sample_size),
                count: 0,
                last: None,
            }),
        }
    }

    pub fn record(&self, sample: f64) {
        let mut state = self.state.lock();
        for ema in &mut state.emas {
            ema.add(sample);
        }
        state.percentile.add(sample);
        state.count += 1;
        state.last = Some(sample);
    }

    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    /// Current EMA value for one of the nominal windows, if any sample has
    /// been recorded yet.
    pub fn window_value(&self, window_minutes: u32) -> Option<f64> {
        let state = self.state.lock();
        WINDOWS_MINUTES
            .iter()
            .position(|m| *m == window_minutes)
            .and_then(|i| state.emas[i].value)
    }

    pub fn percentiles(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        self.state.lock().percentile.percentiles()
    }

    pub fn dump(&self) -> Map<String, Value> {
        let state = self.state.lock();
        let mut out = Map::new();
        for (mins, ema) in WINDOWS_MINUTES.iter().zip(&state.emas) {
            out.insert(format!("m{mins}"), json_opt(ema.value));
        }
        let (p95, p98, p99) = state.percentile.percentiles();
        out.insert("p95".into(), json_opt(p95));
        out.insert("p98".into(), json_opt(p98));
        out.insert("p99".into(), json_opt(p99));
        out.insert("count".into(), Value::from(state.count));
        out.insert("last".into(), json_opt(state.last));
        out
    }
}

fn json_opt(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}
