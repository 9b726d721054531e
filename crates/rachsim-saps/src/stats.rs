use rachsim_core::{CellId, Imsi, RapId, Rnti, SimTime};

/// A preamble left the UE. Keyed by IMSI in the delay collector.
#[derive(Debug, Clone, Copy)]
pub struct StorePreambleTx {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// Msg3 was queued for transmission by the UE
#[derive(Debug, Clone, Copy)]
pub struct StoreMsg3Tx {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// Msg4 arrived at the UE; triggers the end-to-end delay computation
#[derive(Debug, Clone, Copy)]
pub struct StoreMsg4Rx {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// A decoded preamble reception, with the id needed for collision tallying
#[derive(Debug, Clone, Copy)]
pub struct StorePreambleRx {
    pub imsi: Imsi,
    pub rap_id: RapId,
    /// Transmission start time at the UE
    pub start_time: SimTime,
}

/// A PHY-layer reception outcome, decoded or not
#[derive(Debug, Clone, Copy)]
pub struct StorePreamblePhyRx {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub correct: bool,
    /// Transmission start time at the UE
    pub start_time: SimTime,
}

/// Epoch boundary for one collector. Self-scheduled; the collector flushes
/// accumulated records and schedules the next boundary.
#[derive(Debug, Clone, Copy)]
pub struct EpochEnd {}
