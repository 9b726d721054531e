use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rachsim_core::{SignalId, SimTime};

/// Observer invoked with the duration-weighted average for a signal id
pub type ChunkCallback = Box<dyn FnMut(f64, SignalId)>;

/// Accumulates the time-weighted metric chunks of a received signal
/// (SINR, interference or raw power, the caller decides which) and reports
/// the average to its observers when the reception window closes.
///
/// One instance handles many concurrent signals, keyed by signal id.
pub struct ChunkProcessor {
    sum_values: HashMap<SignalId, f64>,
    tot_duration: HashMap<SignalId, SimTime>,
    callbacks: Vec<ChunkCallback>,
}

impl ChunkProcessor {
    pub fn new() -> Self {
        Self {
            sum_values: HashMap::new(),
            tot_duration: HashMap::new(),
            callbacks: Vec::new(),
        }
    }

    /// Observers run in registration order on every finished window
    pub fn add_callback(&mut self, c: ChunkCallback) {
        self.callbacks.push(c);
    }

    /// Clear internal variables for a signal id at the beginning of its
    /// reception window, inserting fresh entries if none exist
    pub fn start(&mut self, signal_id: SignalId) {
        self.sum_values.insert(signal_id, 0.0);
        self.tot_duration.insert(signal_id, SimTime::ZERO);
    }

    /// Collect one chunk, weighted by its duration
    pub fn evaluate_chunk(&mut self, signal_id: SignalId, value: f64, duration: SimTime) {
        let sum = self
            .sum_values
            .get_mut(&signal_id)
            .unwrap_or_else(|| panic!("evaluate_chunk: signal {} was never started", signal_id));
        *sum += value * duration.as_secs_f64();

        let tot = self
            .tot_duration
            .get_mut(&signal_id)
            .unwrap_or_else(|| panic!("evaluate_chunk: signal {} was never started", signal_id));
        *tot += duration;
    }

    /// Finish the window for a signal id and inform the observers about the
    /// average value. A window with zero accumulated duration emits nothing.
    pub fn end(&mut self, signal_id: SignalId) {
        let sum = *self
            .sum_values
            .get(&signal_id)
            .unwrap_or_else(|| panic!("end: signal {} was never started", signal_id));
        let tot = *self
            .tot_duration
            .get(&signal_id)
            .unwrap_or_else(|| panic!("end: signal {} was never started", signal_id));

        if tot > SimTime::ZERO {
            let avg = sum / tot.as_secs_f64();
            for cb in self.callbacks.iter_mut() {
                cb(avg, signal_id);
            }
        } else {
            tracing::warn!("zero accumulated duration for signal {}", signal_id);
        }
    }
}

impl Default for ChunkProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink to be plugged into ChunkProcessor::add_callback, keeping the
/// latest reported value per signal id for later retrieval
#[derive(Clone, Default)]
pub struct MetricCatcher {
    values: Rc<RefCell<HashMap<SignalId, f64>>>,
}

impl MetricCatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback closure to register with a ChunkProcessor
    pub fn callback(&self) -> ChunkCallback {
        let values = Rc::clone(&self.values);
        Box::new(move |value, signal_id| {
            values.borrow_mut().insert(signal_id, value);
        })
    }

    /// Retrieve and remove the latest value for a signal id
    pub fn take(&self, signal_id: SignalId) -> Option<f64> {
        self.values.borrow_mut().remove(&signal_id)
    }

    pub fn get(&self, signal_id: SignalId) -> Option<f64> {
        self.values.borrow().get(&signal_id).copied()
    }
}
