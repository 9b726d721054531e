use rachsim_core::{CellId, Imsi, RapId, Rnti};

/// Request from the scenario layer that a UE starts its access procedure
#[derive(Debug)]
pub struct RaStartReq {}

/// Per-attempt arbitration outcome for one detected preamble.
/// A collided outcome means another terminal picked the same preamble id in
/// the same detection window; no RAR will follow for it.
#[derive(Debug, Clone, Copy)]
pub struct PreambleOutcomeInd {
    pub rap_id: RapId,
    pub collided: bool,
}

/// Random access response, sent by the MAC for each clean detection
#[derive(Debug, Clone, Copy)]
pub struct RarInd {
    pub rap_id: RapId,
    pub rnti: Rnti,
}

/// Msg3: the UE's connection request, transmitted on the granted resource
#[derive(Debug, Clone, Copy)]
pub struct Msg3Req {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// Msg4: contention resolution / connection setup from the eNB
#[derive(Debug, Clone, Copy)]
pub struct Msg4Ind {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// UE-internal timers, self-scheduled through the event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeTimer {
    /// RAR response window elapsed without a matching RAR
    RarWindow,
    /// Backoff period after a collision or missed RAR elapsed
    Backoff,
    /// Contention resolution timer elapsed without Msg4
    ContentionResolution,
}

#[derive(Debug, Clone, Copy)]
pub struct UeTimerExpiry {
    pub timer: UeTimer,
}

/// Procedure completion notification towards the scenario/user layer
#[derive(Debug, Clone, Copy)]
pub struct RaCompletedInd {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rnti: Rnti,
}

/// Reason a UE abandoned its access procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaFailureReason {
    /// preamble_trans_max transmissions exhausted
    PreambleTransMax,
    /// The dedicated (non-contention) grant expired before use
    NcGrantExpired,
}

/// Procedure failure notification towards the scenario/user layer
#[derive(Debug, Clone, Copy)]
pub struct RaFailedInd {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub reason: RaFailureReason,
}
