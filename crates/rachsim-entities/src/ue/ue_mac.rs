use rand::Rng;

use rachsim_config::SharedConfig;
use rachsim_core::entities::RachEntity;
use rachsim_core::{CellId, Imsi, RapId, Rnti, SimTime, SpectralDensity};
use rachsim_saps::cmac::{
    Msg3Req, Msg4Ind, PreambleOutcomeInd, RaCompletedInd, RaFailedInd, RaFailureReason, RarInd,
    UeTimer, UeTimerExpiry,
};
use rachsim_saps::prach::PrachTxReq;
use rachsim_saps::stats::{StoreMsg3Tx, StorePreambleTx, StoreMsg4Rx};
use rachsim_saps::{Sap, SapMsg, SapMsgInner};

use crate::mac::subcomp::nc_preamble_store::NcPreambleGrant;
use crate::{EventHandle, EventQueue, RachEntityTrait};

/// One contention attempt, from the terminal's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaState {
    Idle,
    PreambleSent,
    /// Another terminal picked the same preamble id in our window
    Collided,
    /// The eNB decoded our preamble cleanly; RAR pending
    Detected,
    RarReceived,
    Msg3Sent,
    /// Handshake complete
    Completed,
    /// Aborted: transmission budget exhausted or dedicated grant expired
    Failed,
}

/// Terminal-side MAC for the random access procedure.
///
/// Drives the attempt state machine: preamble (re)transmissions with power
/// ramping and random backoff, the RAR response window, Msg3 and the
/// contention resolution timer. Gives up after preamble_trans_max
/// transmissions.
pub struct UeMac {
    config: SharedConfig,
    imsi: Imsi,
    cell_id: CellId,

    state: RaState,
    preamble_tx_count: u8,
    selected_rap_id: Option<RapId>,
    rnti: Option<Rnti>,

    /// Dedicated preamble grant, when this terminal performs
    /// non-contention access
    nc_grant: Option<NcPreambleGrant>,

    rar_window_timer: Option<EventHandle>,
    contention_timer: Option<EventHandle>,
}

impl UeMac {
    pub fn new(config: SharedConfig, imsi: Imsi) -> Self {
        let cell_id = config.config().cell_id;
        Self {
            config,
            imsi,
            cell_id,
            state: RaState::Idle,
            preamble_tx_count: 0,
            selected_rap_id: None,
            rnti: None,
            nc_grant: None,
            rar_window_timer: None,
            contention_timer: None,
        }
    }

    /// Configure a dedicated preamble grant before the procedure starts
    pub fn set_nc_grant(&mut self, grant: NcPreambleGrant) {
        self.nc_grant = Some(grant);
    }

    pub fn state(&self) -> RaState {
        self.state
    }

    pub fn preamble_tx_count(&self) -> u8 {
        self.preamble_tx_count
    }

    pub fn rnti(&self) -> Option<Rnti> {
        self.rnti
    }

    fn to_self(&self, queue: &EventQueue, timer: UeTimer) -> SapMsg {
        SapMsg::new(
            Sap::CmacSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::UeMac(self.imsi),
            queue.now(),
            SapMsgInner::UeTimerExpiry(UeTimerExpiry { timer }),
        )
    }

    fn cancel_timer(queue: &mut EventQueue, slot: &mut Option<EventHandle>) {
        if let Some(handle) = slot.take() {
            queue.cancel(handle);
        }
    }

    fn rx_ra_start(&mut self, queue: &mut EventQueue) {
        assert_eq!(self.state, RaState::Idle, "RaStartReq while a procedure is running");
        tracing::debug!("imsi {}: starting random access", self.imsi);
        self.preamble_tx_count = 0;
        self.transmit_preamble(queue);
    }

    /// Send (or resend) a preamble. Aborts the procedure when the
    /// transmission budget is exhausted or the dedicated grant expired.
    fn transmit_preamble(&mut self, queue: &mut EventQueue) {
        let now = queue.now();
        let c = self.config.config();

        if let Some(grant) = self.nc_grant {
            if now > grant.expiry {
                tracing::warn!("imsi {}: dedicated grant expired, aborting", self.imsi);
                self.fail(queue, RaFailureReason::NcGrantExpired);
                return;
            }
        }

        if self.preamble_tx_count >= c.rach.preamble_trans_max {
            tracing::warn!(
                "imsi {}: preamble_trans_max ({}) reached, aborting",
                self.imsi,
                c.rach.preamble_trans_max
            );
            self.fail(queue, RaFailureReason::PreambleTransMax);
            return;
        }
        self.preamble_tx_count += 1;

        let rap_id = match self.nc_grant {
            Some(grant) => grant.rap_id,
            None => {
                let mut state = self.config.state_write();
                state.rng.random_range(0..c.rach.num_contention_preambles)
            }
        };
        self.selected_rap_id = Some(rap_id);

        // Power ramping: each retransmission raises the received target power
        let rx_dbm = c.phy.initial_received_target_power_dbm
            + c.phy.power_ramping_step_db * (self.preamble_tx_count - 1) as f64;
        let duration = c.phy.preamble_duration();

        tracing::debug!(
            "imsi {}: tx preamble {} (attempt {}, {:.1} dBm)",
            self.imsi,
            rap_id,
            self.preamble_tx_count,
            rx_dbm
        );

        queue.push_back(SapMsg::new(
            Sap::PrachSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::EnbPhy,
            now,
            SapMsgInner::PrachTxReq(PrachTxReq {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rap_id,
                rx_psd: SpectralDensity::from_total_dbm(rx_dbm),
                duration,
                start_time: now,
            }),
        ));
        queue.push_back(SapMsg::new(
            Sap::StatsSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::RaCompleteStats,
            now,
            SapMsgInner::StorePreambleTx(StorePreambleTx {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rnti: self.rnti.unwrap_or(0),
            }),
        ));

        self.state = RaState::PreambleSent;

        // The response window opens once the batch containing this preamble
        // has been processed; expiry beyond it means no RAR is coming
        let deadline =
            duration + SimTime::from_millis(2 + c.rach.ra_response_window_size as u64);
        Self::cancel_timer(queue, &mut self.rar_window_timer);
        let msg = self.to_self(queue, UeTimer::RarWindow);
        self.rar_window_timer = Some(queue.schedule_in(deadline, msg));
    }

    fn rx_preamble_outcome(&mut self, queue: &mut EventQueue, ind: PreambleOutcomeInd) {
        if self.selected_rap_id != Some(ind.rap_id) {
            tracing::warn!(
                "imsi {}: outcome for preamble {} but {} selected",
                self.imsi,
                ind.rap_id,
                self.selected_rap_id.map(|r| r as i32).unwrap_or(-1)
            );
            return;
        }
        if self.state != RaState::PreambleSent {
            return;
        }

        if ind.collided {
            tracing::debug!("imsi {}: preamble {} collided", self.imsi, ind.rap_id);
            self.state = RaState::Collided;
            Self::cancel_timer(queue, &mut self.rar_window_timer);
            self.start_backoff(queue);
        } else {
            tracing::debug!("imsi {}: preamble {} detected", self.imsi, ind.rap_id);
            self.state = RaState::Detected;
        }
    }

    fn rx_rar(&mut self, queue: &mut EventQueue, ind: RarInd) {
        if self.selected_rap_id != Some(ind.rap_id)
            || !matches!(self.state, RaState::PreambleSent | RaState::Detected)
        {
            tracing::debug!("imsi {}: ignoring RAR for preamble {}", self.imsi, ind.rap_id);
            return;
        }
        let now = queue.now();
        let c = self.config.config();

        Self::cancel_timer(queue, &mut self.rar_window_timer);
        self.state = RaState::RarReceived;
        self.rnti = Some(ind.rnti);
        tracing::debug!("imsi {}: RAR received, rnti {}", self.imsi, ind.rnti);

        // Transmit Msg3 on the granted resource
        queue.push_back(SapMsg::new(
            Sap::CmacSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::EnbMac,
            now,
            SapMsgInner::Msg3Req(Msg3Req {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rnti: ind.rnti,
            }),
        ));
        queue.push_back(SapMsg::new(
            Sap::StatsSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::RaCompleteStats,
            now,
            SapMsgInner::StoreMsg3Tx(StoreMsg3Tx {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rnti: ind.rnti,
            }),
        ));
        self.state = RaState::Msg3Sent;

        let deadline = SimTime::from_millis(c.rach.contention_resolution_timer_sf as u64);
        Self::cancel_timer(queue, &mut self.contention_timer);
        let msg = self.to_self(queue, UeTimer::ContentionResolution);
        self.contention_timer = Some(queue.schedule_in(deadline, msg));
    }

    fn rx_msg4(&mut self, queue: &mut EventQueue, ind: Msg4Ind) {
        if self.state != RaState::Msg3Sent {
            tracing::warn!("imsi {}: unexpected Msg4 in state {:?}", self.imsi, self.state);
            return;
        }
        let now = queue.now();
        Self::cancel_timer(queue, &mut self.contention_timer);
        self.state = RaState::Completed;
        tracing::info!("imsi {}: random access completed (rnti {})", self.imsi, ind.rnti);

        queue.push_back(SapMsg::new(
            Sap::StatsSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::RaCompleteStats,
            now,
            SapMsgInner::StoreMsg4Rx(StoreMsg4Rx {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rnti: ind.rnti,
            }),
        ));
        queue.push_back(SapMsg::new(
            Sap::CmacSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::User,
            now,
            SapMsgInner::RaCompletedInd(RaCompletedInd {
                imsi: self.imsi,
                cell_id: self.cell_id,
                rnti: ind.rnti,
            }),
        ));
    }

    fn rx_timer(&mut self, queue: &mut EventQueue, exp: UeTimerExpiry) {
        match exp.timer {
            UeTimer::RarWindow => {
                if matches!(self.state, RaState::PreambleSent | RaState::Detected) {
                    tracing::debug!("imsi {}: no RAR within the response window", self.imsi);
                    self.rar_window_timer = None;
                    self.start_backoff(queue);
                }
            }
            UeTimer::Backoff => {
                if matches!(
                    self.state,
                    RaState::Collided | RaState::PreambleSent | RaState::Detected
                ) {
                    self.transmit_preamble(queue);
                }
            }
            UeTimer::ContentionResolution => {
                if self.state == RaState::Msg3Sent {
                    tracing::debug!("imsi {}: contention resolution timeout", self.imsi);
                    self.contention_timer = None;
                    self.transmit_preamble(queue);
                }
            }
        }
    }

    /// Wait a random backoff before the next transmission attempt
    fn start_backoff(&mut self, queue: &mut EventQueue) {
        let c = self.config.config();
        let backoff_ms = {
            let mut state = self.config.state_write();
            state.rng.random_range(0..=c.rach.backoff_indicator_ms) as u64
        };
        tracing::debug!("imsi {}: backing off {} ms", self.imsi, backoff_ms);
        let msg = self.to_self(queue, UeTimer::Backoff);
        queue.schedule_in(SimTime::from_millis(backoff_ms), msg);
    }

    fn fail(&mut self, queue: &mut EventQueue, reason: RaFailureReason) {
        let now = queue.now();
        Self::cancel_timer(queue, &mut self.rar_window_timer);
        Self::cancel_timer(queue, &mut self.contention_timer);
        self.state = RaState::Failed;
        queue.push_back(SapMsg::new(
            Sap::CmacSap,
            RachEntity::UeMac(self.imsi),
            RachEntity::User,
            now,
            SapMsgInner::RaFailedInd(RaFailedInd {
                imsi: self.imsi,
                cell_id: self.cell_id,
                reason,
            }),
        ));
    }
}

impl RachEntityTrait for UeMac {
    fn entity(&self) -> RachEntity {
        RachEntity::UeMac(self.imsi)
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::RaStartReq(_) => self.rx_ra_start(queue),
            SapMsgInner::PreambleOutcomeInd(ind) => self.rx_preamble_outcome(queue, ind),
            SapMsgInner::RarInd(ind) => self.rx_rar(queue, ind),
            SapMsgInner::Msg4Ind(ind) => self.rx_msg4(queue, ind),
            SapMsgInner::UeTimerExpiry(exp) => self.rx_timer(queue, exp),
            other => {
                tracing::warn!("UeMac {}: unexpected primitive {}", self.imsi, other);
            }
        }
    }
}
