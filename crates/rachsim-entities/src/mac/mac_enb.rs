use std::collections::HashMap;

use rachsim_config::SharedConfig;
use rachsim_core::assert_warn;
use rachsim_core::entities::RachEntity;
use rachsim_core::{CellId, RapId, Rnti, SimTime};
use rachsim_saps::cmac::{Msg3Req, Msg4Ind, PreambleOutcomeInd, RarInd};
use rachsim_saps::cphy::{PrachPreambleInd, SubframeInd};
use rachsim_saps::{Sap, SapMsg, SapMsgInner};

use crate::mac::subcomp::nc_preamble_store::{AllocationError, NcPreambleGrant, NcPreambleStore};
use crate::mac::subcomp::preamble_collision::PreambleTally;
use crate::{EventQueue, RachEntityTrait};

/// eNB MAC: the base-station side of the random access procedure.
///
/// Decoded preambles delivered by the PHY are batched until the next
/// subframe tick, then arbitrated in one detection window: ids picked by
/// more than one terminal collide for all of them, clean detections get a
/// temporary RNTI and a RAR scheduled inside the response window. Msg3
/// reception completes contention resolution by scheduling Msg4.
///
/// Non-contention preambles are managed through the pending-allocation
/// store; their detections are matched against (and consume) the pending
/// entry instead of drawing a fresh RNTI.
pub struct EnbMac {
    config: SharedConfig,
    cell_id: CellId,

    /// Preambles decoded since the last subframe tick
    pending_preambles: Vec<PrachPreambleInd>,

    /// Pending non-contention allocations
    /// Access to this field is used only by testing code
    pub nc_store: NcPreambleStore,

    /// RNTI handed out per clean preamble id of the current window
    rap_rnti_map: HashMap<RapId, Rnti>,
    next_rnti: Rnti,

    frame_no: u32,
    subframe_no: u32,
}

impl EnbMac {
    pub fn new(config: SharedConfig) -> Self {
        let c = config.config();
        let cell_id = c.cell_id;
        let nc_store = NcPreambleStore::new(c.rach.num_contention_preambles);
        Self {
            config,
            cell_id,
            pending_preambles: Vec::new(),
            nc_store,
            rap_rnti_map: HashMap::new(),
            next_rnti: 0,
            frame_no: 1,
            subframe_no: 1,
        }
    }

    /// Allocate a dedicated (non-contention) preamble for a terminal known
    /// by RNTI, e.g. for an incoming handover. The allocation expires after
    /// preamble_trans_max * (ra_response_window_size + 5) ms, the worst-case
    /// span of a full procedure.
    pub fn allocate_nc_ra_preamble(&mut self, now: SimTime, rnti: Rnti) -> Result<NcPreambleGrant, AllocationError> {
        let c = self.config.config();
        let expiry_interval_ms =
            c.rach.preamble_trans_max as u64 * (c.rach.ra_response_window_size as u64 + 5);
        let result = self
            .nc_store
            .allocate(now, rnti, SimTime::from_millis(expiry_interval_ms));
        match &result {
            Ok(grant) => tracing::info!(
                "allocated nc preamble {} for rnti {} until {}",
                grant.rap_id,
                grant.rnti,
                grant.expiry
            ),
            Err(e) => tracing::warn!("nc preamble allocation for rnti {} failed: {:?}", rnti, e),
        }
        result
    }

    fn assign_rnti(&mut self) -> Rnti {
        self.next_rnti = self.next_rnti.wrapping_add(1);
        self.next_rnti
    }

    fn rx_prach_preamble(&mut self, ind: PrachPreambleInd) {
        assert_warn!(
            ind.cell_id == self.cell_id,
            "preamble for cell {} routed to cell {}",
            ind.cell_id,
            self.cell_id
        );
        tracing::debug!("<- decoded preamble {} from imsi {}", ind.rap_id, ind.imsi);
        self.pending_preambles.push(ind);
    }

    fn rx_subframe_ind(&mut self, queue: &mut EventQueue, ind: SubframeInd) {
        self.frame_no = ind.frame_no;
        self.subframe_no = ind.subframe_no;
        self.process_preamble_batch(queue);
    }

    /// Close the current detection window: tally first, then judge every
    /// attempt against the complete tally.
    fn process_preamble_batch(&mut self, queue: &mut EventQueue) {
        if self.pending_preambles.is_empty() {
            return;
        }
        let now = queue.now();
        let c = self.config.config();

        let tally = PreambleTally::from_rap_ids(self.pending_preambles.iter().map(|p| p.rap_id));
        self.rap_rnti_map.clear();

        let batch = std::mem::take(&mut self.pending_preambles);
        tracing::debug!("processing {} preamble(s) in window at {}", batch.len(), now);

        for attempt in batch {
            let collided = tally.is_collided(attempt.rap_id);

            queue.push_back(SapMsg::new(
                Sap::CmacSap,
                RachEntity::EnbMac,
                RachEntity::UeMac(attempt.imsi),
                now,
                SapMsgInner::PreambleOutcomeInd(PreambleOutcomeInd {
                    rap_id: attempt.rap_id,
                    collided,
                }),
            ));

            if collided {
                tracing::debug!(
                    "preamble {} collided ({} transmitters), no RAR",
                    attempt.rap_id,
                    tally.count(attempt.rap_id)
                );
                continue;
            }

            let rnti = if attempt.rap_id >= c.rach.num_contention_preambles {
                match self.nc_store.consume(now, attempt.rap_id) {
                    Some(rnti) => rnti,
                    // Expired or never-allocated dedicated preamble; the
                    // detection is dropped, the terminal's own expiry
                    // handling decides what happens next
                    None => continue,
                }
            } else {
                self.assign_rnti()
            };
            self.rap_rnti_map.insert(attempt.rap_id, rnti);

            let rar = SapMsg::new(
                Sap::CmacSap,
                RachEntity::EnbMac,
                RachEntity::UeMac(attempt.imsi),
                now,
                SapMsgInner::RarInd(RarInd {
                    rap_id: attempt.rap_id,
                    rnti,
                }),
            );
            let delay = SimTime::from_millis(c.rach.rar_delay_sf as u64);
            queue.schedule_in(delay, rar);
            tracing::debug!(
                "-> RAR for preamble {} (imsi {}, rnti {}) at {}",
                attempt.rap_id,
                attempt.imsi,
                rnti,
                now + delay
            );
        }
    }

    fn rx_msg3(&mut self, queue: &mut EventQueue, req: Msg3Req) {
        let now = queue.now();
        let c = self.config.config();
        tracing::debug!("<- Msg3 from imsi {} (rnti {})", req.imsi, req.rnti);

        // Contention is resolved in favor of this terminal; answer with
        // Msg4 after the configured processing delay
        let msg4 = SapMsg::new(
            Sap::CmacSap,
            RachEntity::EnbMac,
            RachEntity::UeMac(req.imsi),
            now,
            SapMsgInner::Msg4Ind(Msg4Ind {
                imsi: req.imsi,
                cell_id: self.cell_id,
                rnti: req.rnti,
            }),
        );
        queue.schedule_in(SimTime::from_millis(c.rach.msg4_delay_sf as u64), msg4);
    }
}

impl RachEntityTrait for EnbMac {
    fn entity(&self) -> RachEntity {
        RachEntity::EnbMac
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::PrachPreambleInd(ind) => self.rx_prach_preamble(ind),
            SapMsgInner::SubframeInd(ind) => self.rx_subframe_ind(queue, ind),
            SapMsgInner::Msg3Req(req) => self.rx_msg3(queue, req),
            other => {
                tracing::warn!("EnbMac: unexpected primitive {}", other);
            }
        }
    }
}
