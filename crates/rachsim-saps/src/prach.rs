use rachsim_core::{CellId, Imsi, RapId, SignalId, SimTime, SpectralDensity};

/// A preamble waveform arriving at the eNB antenna.
/// Carries the transmitter identity alongside the signal parameters; the
/// PHY keeps the identity only for bookkeeping and statistics, detection
/// itself is decided from the accumulated SINR.
#[derive(Debug)]
pub struct PrachTxReq {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rap_id: RapId,
    /// Received power spectral density at the eNB (path loss already applied)
    pub rx_psd: SpectralDensity,
    pub duration: SimTime,
    /// Transmission start time, used for delay accounting
    pub start_time: SimTime,
}

/// End of the reception window for one tracked signal.
/// Self-scheduled by the PHY when the signal arrives.
#[derive(Debug)]
pub struct ReceptionEndInd {
    pub signal_id: SignalId,
}
