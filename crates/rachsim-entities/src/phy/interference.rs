use std::collections::HashMap;

use rachsim_core::{SignalId, SimTime, SpectralDensity};

use super::chunk_processor::ChunkProcessor;

/// Gaussian interference model for the shared uplink medium: every incoming
/// signal adds to the total received power, and when several receptions
/// overlap, each one's interference is the sum of all concurrent signals
/// excluding itself, plus the noise floor.
///
/// Chunks are re-evaluated at every signal boundary (a new signal appearing,
/// a reception ending, a noise change), so the duration-weighted averages
/// delivered through the chunk processors are exact over every sub-interval,
/// not a single end-of-window snapshot.
pub struct InterferenceTracker {
    /// Active flag per tracked reception. An entry that flips to false
    /// stays present so a late end_rx can be told apart from one that was
    /// never started.
    receiving: HashMap<SignalId, bool>,

    /// Power spectral density of the signals whose RX is being attempted
    rx_signals: HashMap<SignalId, SpectralDensity>,

    /// The time of the last chunk evaluation for each tracked signal
    last_change_time: HashMap<SignalId, SimTime>,

    /// Sum of all incoming signals; does not include noise, includes the
    /// density of every signal being RX. Only grows within a contention
    /// window; cleared by end_all_rx and noise changes.
    all_signals: SpectralDensity,

    noise: SpectralDensity,

    last_signal_id: SignalId,
    last_signal_id_before_reset: SignalId,

    rs_power_processors: Vec<ChunkProcessor>,
    sinr_processors: Vec<ChunkProcessor>,
    interference_processors: Vec<ChunkProcessor>,
}

impl InterferenceTracker {
    pub fn new(noise: SpectralDensity) -> Self {
        Self {
            receiving: HashMap::new(),
            rx_signals: HashMap::new(),
            last_change_time: HashMap::new(),
            all_signals: SpectralDensity::ZERO,
            noise,
            last_signal_id: 0,
            last_signal_id_before_reset: 0,
            rs_power_processors: Vec::new(),
            sinr_processors: Vec::new(),
            interference_processors: Vec::new(),
        }
    }

    /// Add a processor fed with the time-weighted raw received power.
    /// All added processors work in parallel, in registration order.
    pub fn add_rs_power_processor(&mut self, p: ChunkProcessor) {
        self.rs_power_processors.push(p);
    }

    /// Add a processor fed with the time-weighted SINR
    pub fn add_sinr_processor(&mut self, p: ChunkProcessor) {
        self.sinr_processors.push(p);
    }

    /// Add a processor fed with the time-weighted interference density
    pub fn add_interference_processor(&mut self, p: ChunkProcessor) {
        self.interference_processors.push(p);
    }

    /// Notify that a new signal is being perceived on the medium. Called for
    /// every incoming signal, regardless of whether it is a useful signal or
    /// an interferer. Returns the identifier assigned to the signal.
    ///
    /// The duration is carried by the caller's reception-end event; signals
    /// are not subtracted individually, the accumulator is cleared at
    /// contention window boundaries instead.
    pub fn add_signal(&mut self, now: SimTime, psd: SpectralDensity, _duration: SimTime) -> SignalId {
        // Close the running sub-interval of every active reception before
        // the interference level changes
        self.evaluate_all_chunks(now);

        self.all_signals += psd;

        self.last_signal_id = self.last_signal_id.wrapping_add(1);
        if self.last_signal_id == self.last_signal_id_before_reset {
            // This happens when last_signal_id eventually wraps around. Given
            // that so many signals have elapsed since the last reset, we hope
            // that by now there is no stale pending signal. So we just move
            // the boundary further.
            self.last_signal_id_before_reset = self.last_signal_id_before_reset.wrapping_add(0x1000_0000);
        }
        self.last_signal_id
    }

    /// Notify that the PHY is starting an RX attempt on the given signal
    pub fn start_rx(&mut self, now: SimTime, rx_psd: SpectralDensity, signal_id: SignalId) {
        assert!(
            !self.receiving.get(&signal_id).copied().unwrap_or(false),
            "start_rx: signal {} is already being received",
            signal_id
        );
        self.rx_signals.insert(signal_id, rx_psd);
        self.last_change_time.insert(signal_id, now);
        self.receiving.insert(signal_id, true);

        for p in self.rs_power_processors.iter_mut() {
            p.start(signal_id);
        }
        for p in self.interference_processors.iter_mut() {
            p.start(signal_id);
        }
        for p in self.sinr_processors.iter_mut() {
            p.start(signal_id);
        }
    }

    /// Notify that the RX attempt has ended for a signal. The receiving PHY
    /// must call this when RX ends or is aborted. Calling it again for a
    /// signal that was already finalized is a no-op; calling it for a signal
    /// that was never started panics.
    pub fn end_rx(&mut self, now: SimTime, signal_id: SignalId) {
        let active = *self
            .receiving
            .get(&signal_id)
            .unwrap_or_else(|| panic!("end_rx: signal {} was never started", signal_id));
        if !active {
            tracing::info!("end_rx for signal {} was already evaluated or RX was aborted", signal_id);
            return;
        }

        self.conditionally_evaluate_chunk(now, signal_id);
        for p in self.rs_power_processors.iter_mut() {
            p.end(signal_id);
        }
        for p in self.interference_processors.iter_mut() {
            p.end(signal_id);
        }
        for p in self.sinr_processors.iter_mut() {
            p.end(signal_id);
        }
        self.receiving.insert(signal_id, false);
    }

    /// Notify that all simultaneous RX have ended. Used at contention window
    /// boundaries, where no ordering linkage between attempts may be
    /// inferred anymore.
    pub fn end_all_rx(&mut self) {
        self.receiving.clear();
        self.rx_signals.clear();
        self.last_change_time.clear();
        self.all_signals = SpectralDensity::ZERO;
    }

    /// Replace the noise power spectral density. This resets the all-signals
    /// accumulator and invalidates every reception in flight; their partial
    /// accumulations are discarded, not flushed. A mid-run change is a
    /// configuration event, not something the model recovers from.
    pub fn set_noise_psd(&mut self, noise: SpectralDensity) {
        if !self.receiving.is_empty() {
            tracing::warn!(
                "noise change discards {} in-flight reception(s)",
                self.receiving.len()
            );
        }
        self.noise = noise;
        self.all_signals = SpectralDensity::ZERO;
        self.receiving.clear();
        self.rx_signals.clear();
        self.last_change_time.clear();
        // Record the last id so that signals from before the reset cannot be
        // confused with fresh ones
        self.last_signal_id_before_reset = self.last_signal_id;
    }

    pub fn noise_psd(&self) -> SpectralDensity {
        self.noise
    }

    /// Evaluate the chunk since the last change for one tracked signal.
    /// SINR relates the tracked signal to the noise floor alone; the
    /// interference term carries everything else.
    fn conditionally_evaluate_chunk(&mut self, now: SimTime, signal_id: SignalId) {
        let active = *self
            .receiving
            .get(&signal_id)
            .unwrap_or_else(|| panic!("evaluate_chunk: signal {} was never started", signal_id));

        let last = *self
            .last_change_time
            .get(&signal_id)
            .unwrap_or_else(|| panic!("evaluate_chunk: no change time for signal {}", signal_id));

        if !active || now <= last {
            return;
        }

        let rx_signal = *self.rx_signals.get(&signal_id).expect("rx psd missing for tracked signal");
        let interf = self.all_signals - rx_signal + self.noise;
        let snr = rx_signal.ratio(self.noise);
        let duration = now.since(last);

        tracing::trace!(
            "chunk for signal {}: snr {:.2}, interf {:?}, duration {}",
            signal_id,
            snr,
            interf,
            duration
        );

        for p in self.sinr_processors.iter_mut() {
            p.evaluate_chunk(signal_id, snr, duration);
        }
        for p in self.interference_processors.iter_mut() {
            p.evaluate_chunk(signal_id, interf.watts_per_hz(), duration);
        }
        for p in self.rs_power_processors.iter_mut() {
            p.evaluate_chunk(signal_id, rx_signal.watts_per_hz(), duration);
        }
        self.last_change_time.insert(signal_id, now);
    }

    /// Evaluate the running chunk of every active reception, in signal id
    /// order. Called before any event that changes the interference level.
    fn evaluate_all_chunks(&mut self, now: SimTime) {
        let mut ids: Vec<SignalId> = self
            .receiving
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        for id in ids {
            self.conditionally_evaluate_chunk(now, id);
        }
    }
}
