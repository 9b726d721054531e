use std::collections::HashMap;

use rachsim_config::SharedConfig;
use rachsim_core::entities::RachEntity;
use rachsim_core::power::ratio_to_db;
use rachsim_core::sim_time::SUBFRAME_DURATION;
use rachsim_core::{CellId, Imsi, RapId, SignalId, SimTime};
use rachsim_saps::cphy::{PrachPreambleInd, SubframeInd};
use rachsim_saps::prach::{PrachTxReq, ReceptionEndInd};
use rachsim_saps::stats::{StorePreamblePhyRx, StorePreambleRx};
use rachsim_saps::{Sap, SapMsg, SapMsgInner};

use crate::phy::chunk_processor::{ChunkProcessor, MetricCatcher};
use crate::phy::interference::InterferenceTracker;
use crate::{EventQueue, RachEntityTrait};

/// Bookkeeping for a preamble whose reception is in progress
struct InFlightPreamble {
    imsi: Imsi,
    cell_id: CellId,
    rap_id: RapId,
    start_time: SimTime,
}

/// eNB physical layer.
///
/// Owns the interference tracker and one chunk processor per metric
/// (raw power, SINR, interference). When a reception window closes it reads
/// the averaged SINR, decides decodability against the detection threshold
/// and forwards decoded preambles to the MAC. Every reception, decoded or
/// not, is reported to the PHY statistics collectors.
pub struct EnbPhy {
    config: SharedConfig,
    cell_id: CellId,

    tracker: InterferenceTracker,
    rs_power_catcher: MetricCatcher,
    sinr_catcher: MetricCatcher,
    interference_catcher: MetricCatcher,

    in_flight: HashMap<SignalId, InFlightPreamble>,
}

impl EnbPhy {
    pub fn new(config: SharedConfig) -> Self {
        let c = config.config();
        let mut tracker = InterferenceTracker::new(c.phy.noise_psd());

        let rs_power_catcher = MetricCatcher::new();
        let sinr_catcher = MetricCatcher::new();
        let interference_catcher = MetricCatcher::new();

        let mut p = ChunkProcessor::new();
        p.add_callback(rs_power_catcher.callback());
        tracker.add_rs_power_processor(p);

        let mut p = ChunkProcessor::new();
        p.add_callback(sinr_catcher.callback());
        tracker.add_sinr_processor(p);

        let mut p = ChunkProcessor::new();
        p.add_callback(interference_catcher.callback());
        tracker.add_interference_processor(p);

        let cell_id = c.cell_id;
        Self {
            config,
            cell_id,
            tracker,
            rs_power_catcher,
            sinr_catcher,
            interference_catcher,
            in_flight: HashMap::new(),
        }
    }

    /// Direct access to the interference tracker, e.g. for noise
    /// reconfiguration by the scenario layer
    pub fn tracker_mut(&mut self) -> &mut InterferenceTracker {
        &mut self.tracker
    }

    fn rx_prach_tx(&mut self, queue: &mut EventQueue, req: PrachTxReq) {
        let now = queue.now();
        let signal_id = self.tracker.add_signal(now, req.rx_psd, req.duration);

        if req.cell_id != self.cell_id {
            // Energy from another cell's PRACH: pure interference, nothing
            // to demodulate here
            tracing::debug!("<- foreign-cell signal from imsi {} (cell {})", req.imsi, req.cell_id);
            return;
        }

        tracing::debug!(
            "<- preamble {} from imsi {} as signal {}",
            req.rap_id,
            req.imsi,
            signal_id
        );
        self.tracker.start_rx(now, req.rx_psd, signal_id);
        self.in_flight.insert(
            signal_id,
            InFlightPreamble {
                imsi: req.imsi,
                cell_id: req.cell_id,
                rap_id: req.rap_id,
                start_time: req.start_time,
            },
        );

        let end = SapMsg::new(
            Sap::PrachSap,
            RachEntity::EnbPhy,
            RachEntity::EnbPhy,
            now,
            SapMsgInner::ReceptionEndInd(ReceptionEndInd { signal_id }),
        );
        queue.schedule_in(req.duration, end);
    }

    fn rx_reception_end(&mut self, queue: &mut EventQueue, ind: ReceptionEndInd) {
        let now = queue.now();
        let signal_id = ind.signal_id;
        self.tracker.end_rx(now, signal_id);

        let meta = self
            .in_flight
            .remove(&signal_id)
            .unwrap_or_else(|| panic!("reception end for unknown signal {}", signal_id));

        // Averages delivered by the chunk processors for this window
        let sinr = self.sinr_catcher.take(signal_id);
        let rs_power = self.rs_power_catcher.take(signal_id);
        let interference = self.interference_catcher.take(signal_id);

        let threshold_db = self.config.config().phy.detection_threshold_db;
        let correct = match sinr {
            Some(snr) => ratio_to_db(snr) >= threshold_db,
            // Zero-duration window, nothing was accumulated
            None => false,
        };

        tracing::debug!(
            "signal {} (imsi {}, preamble {}): snr {:?} power {:?} interf {:?} -> {}",
            signal_id,
            meta.imsi,
            meta.rap_id,
            sinr.map(|s| ratio_to_db(s)),
            rs_power,
            interference,
            if correct { "decoded" } else { "lost" }
        );

        // PHY reception outcome, decoded or not, towards both collectors
        let phy_rx = StorePreamblePhyRx {
            imsi: meta.imsi,
            cell_id: meta.cell_id,
            correct,
            start_time: meta.start_time,
        };
        queue.push_back(SapMsg::new(
            Sap::StatsSap,
            RachEntity::EnbPhy,
            RachEntity::RaPreamblePhyStats,
            now,
            SapMsgInner::StorePreamblePhyRx(phy_rx),
        ));
        queue.push_back(SapMsg::new(
            Sap::StatsSap,
            RachEntity::EnbPhy,
            RachEntity::RaPreambleStats,
            now,
            SapMsgInner::StorePreamblePhyRx(phy_rx),
        ));

        if correct {
            queue.push_back(SapMsg::new(
                Sap::StatsSap,
                RachEntity::EnbPhy,
                RachEntity::RaPreambleStats,
                now,
                SapMsgInner::StorePreambleRx(StorePreambleRx {
                    imsi: meta.imsi,
                    rap_id: meta.rap_id,
                    start_time: meta.start_time,
                }),
            ));
            queue.push_back(SapMsg::new(
                Sap::CphySap,
                RachEntity::EnbPhy,
                RachEntity::EnbMac,
                now,
                SapMsgInner::PrachPreambleInd(PrachPreambleInd {
                    imsi: meta.imsi,
                    cell_id: meta.cell_id,
                    rap_id: meta.rap_id,
                    start_time: meta.start_time,
                }),
            ));
        }
    }

    /// Forward the subframe tick to the MAC and schedule the next one for
    /// ourselves; the PHY is the clock source of the stack.
    fn rx_subframe_ind(&mut self, queue: &mut EventQueue, ind: SubframeInd) {
        // Contention window boundary: once every simultaneous RX has ended,
        // the accumulated signal state carries no usable ordering linkage
        // and is dropped wholesale
        if self.in_flight.is_empty() {
            self.tracker.end_all_rx();
        }

        queue.push_back(SapMsg::new(
            Sap::CphySap,
            RachEntity::EnbPhy,
            RachEntity::EnbMac,
            queue.now(),
            SapMsgInner::SubframeInd(ind),
        ));

        let (mut frame_no, mut subframe_no) = (ind.frame_no, ind.subframe_no);
        subframe_no += 1;
        if subframe_no > 10 {
            subframe_no = 1;
            frame_no += 1;
        }
        let next = SapMsg::new(
            Sap::CphySap,
            RachEntity::EnbPhy,
            RachEntity::EnbPhy,
            queue.now(),
            SapMsgInner::SubframeInd(SubframeInd { frame_no, subframe_no }),
        );
        queue.schedule_in(SUBFRAME_DURATION, next);
    }
}

impl RachEntityTrait for EnbPhy {
    fn entity(&self) -> RachEntity {
        RachEntity::EnbPhy
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::PrachTxReq(req) => self.rx_prach_tx(queue, req),
            SapMsgInner::ReceptionEndInd(ind) => self.rx_reception_end(queue, ind),
            SapMsgInner::SubframeInd(ind) => self.rx_subframe_ind(queue, ind),
            other => {
                tracing::warn!("EnbPhy: unexpected primitive {}", other);
            }
        }
    }
}
