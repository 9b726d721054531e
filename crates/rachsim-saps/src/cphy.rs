use rachsim_core::{CellId, Imsi, RapId, SimTime};

/// Start of a new subframe. Delivered to the PHY, which forwards it to the
/// MAC and schedules the next tick for itself.
#[derive(Debug, Clone, Copy)]
pub struct SubframeInd {
    pub frame_no: u32,
    pub subframe_no: u32,
}

/// A correctly decoded preamble, forwarded from the PHY to the MAC.
/// Collision arbitration happens at the MAC once the subframe batch closes.
#[derive(Debug, Clone)]
pub struct PrachPreambleInd {
    pub imsi: Imsi,
    pub cell_id: CellId,
    pub rap_id: RapId,
    /// Time the preamble transmission started at the UE
    pub start_time: SimTime,
}
