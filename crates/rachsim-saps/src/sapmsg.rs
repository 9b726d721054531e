use core::fmt::Display;

use rachsim_core::SimTime;
use rachsim_core::entities::RachEntity;

use crate::cmac::*;
use crate::cphy::*;
use crate::prach::*;
use crate::stats::*;

/// Service access points between the entity layers
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sap {
    /// Air interface: UE preamble waveforms arriving at the eNB PHY
    PrachSap,
    /// PHY/MAC: subframe ticks and decoded preambles
    CphySap,
    /// MAC/UE control: RAR, Msg3/Msg4, outcomes, UE timers
    CmacSap,
    /// Trace primitives towards the statistics collectors
    StatsSap,
    /// Custom SAP for inter-entity control messages
    Control,
}

/// Exhaustive list of primitive structs for use in the SapMsg struct
#[derive(Debug)]
pub enum SapMsgInner {
    // PRACH-SAP
    PrachTxReq(PrachTxReq),
    ReceptionEndInd(ReceptionEndInd),

    // CPHY-SAP
    SubframeInd(SubframeInd),
    PrachPreambleInd(PrachPreambleInd),

    // CMAC-SAP
    RaStartReq(RaStartReq),
    PreambleOutcomeInd(PreambleOutcomeInd),
    RarInd(RarInd),
    Msg3Req(Msg3Req),
    Msg4Ind(Msg4Ind),
    UeTimerExpiry(UeTimerExpiry),
    RaCompletedInd(RaCompletedInd),
    RaFailedInd(RaFailedInd),

    // STATS-SAP
    StorePreambleTx(StorePreambleTx),
    StoreMsg3Tx(StoreMsg3Tx),
    StoreMsg4Rx(StoreMsg4Rx),
    StorePreambleRx(StorePreambleRx),
    StorePreamblePhyRx(StorePreamblePhyRx),
    EpochEnd(EpochEnd),
}

impl Display for SapMsgInner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            SapMsgInner::PrachTxReq(_) => "PrachTxReq",
            SapMsgInner::ReceptionEndInd(_) => "ReceptionEndInd",
            SapMsgInner::SubframeInd(_) => "SubframeInd",
            SapMsgInner::PrachPreambleInd(_) => "PrachPreambleInd",
            SapMsgInner::RaStartReq(_) => "RaStartReq",
            SapMsgInner::PreambleOutcomeInd(_) => "PreambleOutcomeInd",
            SapMsgInner::RarInd(_) => "RarInd",
            SapMsgInner::Msg3Req(_) => "Msg3Req",
            SapMsgInner::Msg4Ind(_) => "Msg4Ind",
            SapMsgInner::UeTimerExpiry(_) => "UeTimerExpiry",
            SapMsgInner::RaCompletedInd(_) => "RaCompletedInd",
            SapMsgInner::RaFailedInd(_) => "RaFailedInd",
            SapMsgInner::StorePreambleTx(_) => "StorePreambleTx",
            SapMsgInner::StoreMsg3Tx(_) => "StoreMsg3Tx",
            SapMsgInner::StoreMsg4Rx(_) => "StoreMsg4Rx",
            SapMsgInner::StorePreambleRx(_) => "StorePreambleRx",
            SapMsgInner::StorePreamblePhyRx(_) => "StorePreamblePhyRx",
            SapMsgInner::EpochEnd(_) => "EpochEnd",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub struct SapMsg {
    pub sap: Sap,
    pub src: RachEntity,
    pub dest: RachEntity,
    /// Simulated time at which the message was created
    pub time: SimTime,

    pub msg: SapMsgInner,
}

impl SapMsg {
    pub fn new(sap: Sap, src: RachEntity, dest: RachEntity, t_submit: SimTime, msg: SapMsgInner) -> Self {
        Self {
            sap,
            src,
            dest,
            time: t_submit,
            msg,
        }
    }

    pub fn get_source(&self) -> &RachEntity {
        &self.src
    }
    pub fn get_dest(&self) -> &RachEntity {
        &self.dest
    }
    pub fn get_sap(&self) -> &Sap {
        &self.sap
    }
}
