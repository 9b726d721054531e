use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use rachsim_config::SharedConfig;
use rachsim_core::entities::RachEntity;
use rachsim_core::{CellId, Imsi, Rnti, SimTime};
use rachsim_saps::{SapMsg, SapMsgInner};

use crate::stats::epoch::EpochTimer;
use crate::stats::open_stats_file;
use crate::{EventQueue, RachEntityTrait};

#[derive(Debug, Clone, Copy)]
struct AttemptInfo {
    time: SimTime,
    cell_id: CellId,
    rnti: Rnti,
}

#[derive(Debug, Clone, Copy)]
struct DelayInfo {
    cell_id: CellId,
    rnti: Rnti,
    delay: SimTime,
}

/// Collector for the end-to-end random access delay: from the first
/// preamble transmission to Msg4 reception, per (IMSI, cell) pair.
///
/// Raw attempt timestamps accumulate until a Msg4 consumes them; completed
/// delays are flushed at every epoch boundary.
pub struct RaCompleteStats {
    filename: String,
    first_write: bool,
    pending_output: bool,

    preamble_tx_events: HashMap<Imsi, Vec<AttemptInfo>>,
    msg3_tx_events: HashMap<Imsi, Vec<AttemptInfo>>,
    msg4_rx_events: HashMap<Imsi, Vec<AttemptInfo>>,

    /// Completed delays of the current epoch, ordered by IMSI
    delay_map: BTreeMap<Imsi, Vec<DelayInfo>>,

    epoch: EpochTimer,
}

impl RaCompleteStats {
    /// Builds the collector and schedules its first epoch boundary
    pub fn new(config: &SharedConfig, queue: &mut EventQueue) -> Self {
        let c = config.config();
        let mut epoch = EpochTimer::new(
            SimTime::from_secs(c.stats.start_time_s),
            SimTime::from_secs(c.stats.epoch_duration_s),
        );
        epoch.reschedule(queue, RachEntity::RaCompleteStats);
        Self {
            filename: c.stats.ra_delay_filename.clone(),
            first_write: true,
            pending_output: false,
            preamble_tx_events: HashMap::new(),
            msg3_tx_events: HashMap::new(),
            msg4_rx_events: HashMap::new(),
            delay_map: BTreeMap::new(),
            epoch,
        }
    }

    pub fn set_filename(&mut self, filename: String) {
        self.filename = filename;
        self.first_write = true;
    }

    pub fn set_start_time(&mut self, queue: &mut EventQueue, t: SimTime) {
        self.epoch.set_start_time(queue, RachEntity::RaCompleteStats, t);
    }

    pub fn set_epoch_duration(&mut self, queue: &mut EventQueue, e: SimTime) {
        self.epoch.set_epoch_duration(queue, RachEntity::RaCompleteStats, e);
    }

    /// Record a preamble transmission attempt
    pub fn store_preamble_tx(&mut self, now: SimTime, imsi: Imsi, cell_id: CellId, rnti: Rnti) {
        self.preamble_tx_events
            .entry(imsi)
            .or_default()
            .push(AttemptInfo { time: now, cell_id, rnti });
    }

    /// Record a Msg3 transmission
    pub fn store_msg3_tx(&mut self, now: SimTime, imsi: Imsi, cell_id: CellId, rnti: Rnti) {
        self.msg3_tx_events
            .entry(imsi)
            .or_default()
            .push(AttemptInfo { time: now, cell_id, rnti });
    }

    /// Record a Msg4 reception and compute the procedure delay against the
    /// earliest preamble transmission for the same (IMSI, cell) pair. The
    /// pair's raw preamble timestamps are purged afterwards, so a second
    /// Msg4 without a fresh preamble violates the precondition.
    pub fn store_msg4_rx(&mut self, now: SimTime, imsi: Imsi, cell_id: CellId, rnti: Rnti) {
        self.msg4_rx_events
            .entry(imsi)
            .or_default()
            .push(AttemptInfo { time: now, cell_id, rnti });

        let attempts = self
            .preamble_tx_events
            .get_mut(&imsi)
            .unwrap_or_else(|| panic!("IMSI {} never inserted", imsi));
        attempts.sort_by_key(|a| a.time);
        let first = attempts
            .iter()
            .find(|a| a.cell_id == cell_id)
            .unwrap_or_else(|| panic!("cellId {} for IMSI {} not found", cell_id, imsi));
        let delay = now.since(first.time);

        // Delete all other entries related to this (imsi, cellId) pair
        attempts.retain(|a| a.cell_id != cell_id);

        tracing::debug!("imsi {}: procedure delay {}", imsi, delay);
        self.delay_map
            .entry(imsi)
            .or_default()
            .push(DelayInfo { cell_id, rnti, delay });
        self.pending_output = true;
    }

    /// Write collected statistics to the output file. The first call
    /// creates the file and writes the header; later calls append.
    fn show_results(&mut self, now: SimTime) {
        let Some(mut out) = open_stats_file(&self.filename, self.first_write) else {
            return;
        };
        if self.first_write {
            self.first_write = false;
            if let Err(e) = writeln!(out, "wt\tIMSI\tcellId\tdelay") {
                tracing::error!("write to {} failed: {}", self.filename, e);
                return;
            }
        }

        let wt = now.as_secs_f64();
        for (imsi, records) in self.delay_map.iter() {
            for rec in records {
                if let Err(e) = writeln!(
                    out,
                    "{:.3}\t{}\t{}\t{:.6}",
                    wt,
                    imsi,
                    rec.cell_id,
                    rec.delay.as_secs_f64()
                ) {
                    tracing::error!("write to {} failed: {}", self.filename, e);
                    return;
                }
            }
        }
        self.pending_output = false;
    }

    fn reset_results(&mut self) {
        self.delay_map.clear();
    }

    fn end_epoch(&mut self, queue: &mut EventQueue) {
        self.show_results(queue.now());
        self.reset_results();
        self.epoch.advance(queue, RachEntity::RaCompleteStats);
    }
}

impl RachEntityTrait for RaCompleteStats {
    fn entity(&self) -> RachEntity {
        RachEntity::RaCompleteStats
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        let now = queue.now();
        match message.msg {
            SapMsgInner::StorePreambleTx(p) => self.store_preamble_tx(now, p.imsi, p.cell_id, p.rnti),
            SapMsgInner::StoreMsg3Tx(p) => self.store_msg3_tx(now, p.imsi, p.cell_id, p.rnti),
            SapMsgInner::StoreMsg4Rx(p) => self.store_msg4_rx(now, p.imsi, p.cell_id, p.rnti),
            SapMsgInner::EpochEnd(_) => self.end_epoch(queue),
            other => {
                tracing::warn!("RaCompleteStats: unexpected primitive {}", other);
            }
        }
    }

    fn shutdown(&mut self, queue: &mut EventQueue) {
        if self.pending_output {
            self.show_results(queue.now());
        }
    }
}
