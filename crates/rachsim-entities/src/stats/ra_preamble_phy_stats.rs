use std::collections::BTreeMap;
use std::io::Write;

use rachsim_config::SharedConfig;
use rachsim_core::entities::RachEntity;
use rachsim_core::{CellId, Imsi, SimTime};
use rachsim_saps::stats::StorePreamblePhyRx;
use rachsim_saps::{SapMsg, SapMsgInner};

use crate::stats::epoch::EpochTimer;
use crate::stats::open_stats_file;
use crate::{EventQueue, RachEntityTrait};

#[derive(Debug, Clone, Copy)]
struct PhyRxInfo {
    cell_id: CellId,
    imsi: Imsi,
    correct: bool,
    delay: SimTime,
}

/// Collector for raw PHY-layer preamble receptions: every reception window
/// that closed at the eNB, with its decodability outcome and the elapsed
/// time since the preamble left the terminal.
pub struct RaPreamblePhyStats {
    filename: String,
    first_write: bool,
    pending_output: bool,

    /// Receptions of the current epoch, ordered by reception time
    rx_events: BTreeMap<SimTime, Vec<PhyRxInfo>>,

    epoch: EpochTimer,
}

impl RaPreamblePhyStats {
    /// Builds the collector and schedules its first epoch boundary
    pub fn new(config: &SharedConfig, queue: &mut EventQueue) -> Self {
        let c = config.config();
        let mut epoch = EpochTimer::new(
            SimTime::from_secs(c.stats.start_time_s),
            SimTime::from_secs(c.stats.epoch_duration_s),
        );
        epoch.reschedule(queue, RachEntity::RaPreamblePhyStats);
        Self {
            filename: c.stats.preamble_phy_rx_filename.clone(),
            first_write: true,
            pending_output: false,
            rx_events: BTreeMap::new(),
            epoch,
        }
    }

    pub fn set_filename(&mut self, filename: String) {
        self.filename = filename;
        self.first_write = true;
    }

    pub fn set_start_time(&mut self, queue: &mut EventQueue, t: SimTime) {
        self.epoch.set_start_time(queue, RachEntity::RaPreamblePhyStats, t);
    }

    pub fn set_epoch_duration(&mut self, queue: &mut EventQueue, e: SimTime) {
        self.epoch.set_epoch_duration(queue, RachEntity::RaPreamblePhyStats, e);
    }

    pub fn store_preamble_rx(&mut self, now: SimTime, p: StorePreamblePhyRx) {
        self.rx_events.entry(now).or_default().push(PhyRxInfo {
            cell_id: p.cell_id,
            imsi: p.imsi,
            correct: p.correct,
            delay: now.since(p.start_time),
        });
        self.pending_output = true;
    }

    fn show_results(&mut self) {
        let Some(mut out) = open_stats_file(&self.filename, self.first_write) else {
            return;
        };
        if self.first_write {
            self.first_write = false;
            if let Err(e) = writeln!(out, "% time\tcellId\tIMSI\tcorrect\tdelay") {
                tracing::error!("write to {} failed: {}", self.filename, e);
                return;
            }
        }

        for (time, group) in self.rx_events.iter() {
            for info in group {
                if let Err(e) = writeln!(
                    out,
                    "{:.6}\t{}\t{}\t{}\t{:.6}",
                    time.as_secs_f64(),
                    info.cell_id,
                    info.imsi,
                    info.correct as u32,
                    info.delay.as_secs_f64()
                ) {
                    tracing::error!("write to {} failed: {}", self.filename, e);
                    return;
                }
            }
        }
        self.pending_output = false;
    }

    fn reset_results(&mut self) {
        self.rx_events.clear();
    }

    fn end_epoch(&mut self, queue: &mut EventQueue) {
        self.show_results();
        self.reset_results();
        self.epoch.advance(queue, RachEntity::RaPreamblePhyStats);
    }
}

impl RachEntityTrait for RaPreamblePhyStats {
    fn entity(&self) -> RachEntity {
        RachEntity::RaPreamblePhyStats
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        let now = queue.now();
        match message.msg {
            SapMsgInner::StorePreamblePhyRx(p) => self.store_preamble_rx(now, p),
            SapMsgInner::EpochEnd(_) => self.end_epoch(queue),
            other => {
                tracing::warn!("RaPreamblePhyStats: unexpected primitive {}", other);
            }
        }
    }

    fn shutdown(&mut self, _queue: &mut EventQueue) {
        if self.pending_output {
            self.show_results();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rachsim_config::SimConfig;
    use rachsim_saps::Sap;
    use rachsim_saps::stats::EpochEnd;

    fn test_collector(name: &str) -> (RaPreamblePhyStats, EventQueue) {
        let mut cfg = SimConfig::default();
        cfg.stats.preamble_phy_rx_filename = std::env::temp_dir()
            .join(format!("rachsim_phy_{}_{}.txt", std::process::id(), name))
            .to_string_lossy()
            .into_owned();
        let config = SharedConfig::from_config(cfg);
        let mut queue = EventQueue::new();
        let stats = RaPreamblePhyStats::new(&config, &mut queue);
        (stats, queue)
    }

    #[test]
    fn rows_are_time_ordered_and_cleared_at_epoch_end() {
        let (mut stats, mut queue) = test_collector("order");
        let filename = stats.filename.clone();

        // Insert out of order; the flush must come out time-ordered
        stats.store_preamble_rx(
            SimTime::from_millis(20),
            StorePreamblePhyRx {
                imsi: 2,
                cell_id: 1,
                correct: false,
                start_time: SimTime::from_millis(19),
            },
        );
        stats.store_preamble_rx(
            SimTime::from_millis(10),
            StorePreamblePhyRx {
                imsi: 1,
                cell_id: 1,
                correct: true,
                start_time: SimTime::from_millis(9),
            },
        );

        queue.set_now(SimTime::from_millis(250));
        let msg = SapMsg::new(
            Sap::StatsSap,
            RachEntity::RaPreamblePhyStats,
            RachEntity::RaPreamblePhyStats,
            queue.now(),
            SapMsgInner::EpochEnd(EpochEnd {}),
        );
        stats.rx_prim(&mut queue, msg);

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "% time\tcellId\tIMSI\tcorrect\tdelay");
        assert!(lines[1].starts_with("0.010000\t1\t1\t1\t0.001000"));
        assert!(lines[2].starts_with("0.020000\t1\t2\t0\t0.001000"));
        assert!(stats.rx_events.is_empty());

        std::fs::remove_file(&filename).ok();
    }

    #[test]
    fn empty_epoch_after_first_flush_appends_nothing() {
        let (mut stats, mut queue) = test_collector("empty");
        let filename = stats.filename.clone();

        stats.store_preamble_rx(
            SimTime::from_millis(10),
            StorePreamblePhyRx {
                imsi: 1,
                cell_id: 1,
                correct: true,
                start_time: SimTime::from_millis(9),
            },
        );
        queue.set_now(SimTime::from_millis(250));
        let epoch_end = || {
            SapMsg::new(
                Sap::StatsSap,
                RachEntity::RaPreamblePhyStats,
                RachEntity::RaPreamblePhyStats,
                SimTime::from_millis(250),
                SapMsgInner::EpochEnd(EpochEnd {}),
            )
        };
        stats.rx_prim(&mut queue, epoch_end());
        let after_first = std::fs::read_to_string(&filename).unwrap();

        queue.set_now(SimTime::from_millis(500));
        stats.rx_prim(&mut queue, epoch_end());
        let after_second = std::fs::read_to_string(&filename).unwrap();
        assert_eq!(after_first, after_second);

        std::fs::remove_file(&filename).ok();
    }

    #[test]
    fn shutdown_flushes_pending_records() {
        let (mut stats, mut queue) = test_collector("shutdown");
        let filename = stats.filename.clone();

        stats.store_preamble_rx(
            SimTime::from_millis(10),
            StorePreamblePhyRx {
                imsi: 4,
                cell_id: 1,
                correct: true,
                start_time: SimTime::from_millis(9),
            },
        );
        stats.shutdown(&mut queue);

        let contents = std::fs::read_to_string(&filename).unwrap();
        assert_eq!(contents.lines().count(), 2);

        std::fs::remove_file(&filename).ok();
    }
}
