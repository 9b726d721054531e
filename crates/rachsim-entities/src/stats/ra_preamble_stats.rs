use std::collections::BTreeMap;
use std::io::Write;

use rachsim_config::SharedConfig;
use rachsim_core::entities::RachEntity;
use rachsim_core::{CellId, Imsi, RapId, SimTime};
use rachsim_saps::stats::{StorePreamblePhyRx, StorePreambleRx};
use rachsim_saps::{SapMsg, SapMsgInner};

use crate::mac::subcomp::preamble_collision::PreambleTally;
use crate::stats::epoch::EpochTimer;
use crate::stats::open_stats_file;
use crate::{EventQueue, RachEntityTrait};

#[derive(Debug, Clone, Copy)]
struct RxPreambleInfo {
    imsi: Imsi,
    rap_id: RapId,
}

#[derive(Debug, Clone, Copy)]
struct RxPhyInfo {
    cell_id: CellId,
    correct: bool,
    delay: SimTime,
    /// Filled in at flush time from the decoded-preamble records
    rap_id: Option<RapId>,
    collided: Option<bool>,
}

/// Collector for preamble receptions with collision outcomes.
///
/// Decoded preambles are stored keyed by reception time; at flush time each
/// same-time group forms one detection window, whose collision flags are
/// computed with the preamble tally (counts first, flags second) and
/// correlated onto the PHY reception records by (time, IMSI). Undecoded
/// receptions appear in the log with placeholder id/collision columns.
pub struct RaPreambleStats {
    filename: String,
    first_write: bool,
    pending_output: bool,

    /// Decoded preambles, grouped by reception time
    preamble_rx_events: BTreeMap<SimTime, Vec<RxPreambleInfo>>,
    /// All PHY receptions, keyed by (reception time, IMSI)
    preamble_phy_rx_events: BTreeMap<(SimTime, Imsi), RxPhyInfo>,

    epoch: EpochTimer,
}

impl RaPreambleStats {
    /// Builds the collector and schedules its first epoch boundary
    pub fn new(config: &SharedConfig, queue: &mut EventQueue) -> Self {
        let c = config.config();
        let mut epoch = EpochTimer::new(
            SimTime::from_secs(c.stats.start_time_s),
            SimTime::from_secs(c.stats.epoch_duration_s),
        );
        epoch.reschedule(queue, RachEntity::RaPreambleStats);
        Self {
            filename: c.stats.preamble_rx_filename.clone(),
            first_write: true,
            pending_output: false,
            preamble_rx_events: BTreeMap::new(),
            preamble_phy_rx_events: BTreeMap::new(),
            epoch,
        }
    }

    pub fn set_filename(&mut self, filename: String) {
        self.filename = filename;
        self.first_write = true;
    }

    pub fn set_start_time(&mut self, queue: &mut EventQueue, t: SimTime) {
        self.epoch.set_start_time(queue, RachEntity::RaPreambleStats, t);
    }

    pub fn set_epoch_duration(&mut self, queue: &mut EventQueue, e: SimTime) {
        self.epoch.set_epoch_duration(queue, RachEntity::RaPreambleStats, e);
    }

    pub fn store_preamble_rx(&mut self, now: SimTime, p: StorePreambleRx) {
        self.preamble_rx_events
            .entry(now)
            .or_default()
            .push(RxPreambleInfo {
                imsi: p.imsi,
                rap_id: p.rap_id,
            });
        self.pending_output = true;
    }

    pub fn store_preamble_phy_rx(&mut self, now: SimTime, p: StorePreamblePhyRx) {
        self.preamble_phy_rx_events.insert(
            (now, p.imsi),
            RxPhyInfo {
                cell_id: p.cell_id,
                correct: p.correct,
                delay: now.since(p.start_time),
                rap_id: None,
                collided: None,
            },
        );
        self.pending_output = true;
    }

    fn show_results(&mut self) {
        let Some(mut out) = open_stats_file(&self.filename, self.first_write) else {
            return;
        };
        if self.first_write {
            self.first_write = false;
            if let Err(e) = writeln!(out, "% time\tcellId\tIMSI\trxok\trapId\tcoll\tdelay") {
                tracing::error!("write to {} failed: {}", self.filename, e);
                return;
            }
        }
        self.write_results(&mut out);
        self.pending_output = false;
    }

    fn write_results(&mut self, out: &mut dyn Write) {
        // First pass over each detection window: tally the preamble ids,
        // then flag every record of the window and correlate the flags onto
        // the PHY records
        let phy_events = &mut self.preamble_phy_rx_events;
        for (time, group) in self.preamble_rx_events.iter() {
            let tally = PreambleTally::from_rap_ids(group.iter().map(|g| g.rap_id));
            for info in group {
                let collided = tally.is_collided(info.rap_id);
                if let Some(phy) = phy_events.get_mut(&(*time, info.imsi)) {
                    phy.collided = Some(collided);
                    phy.rap_id = Some(info.rap_id);
                }
            }
        }

        for ((time, imsi), info) in self.preamble_phy_rx_events.iter() {
            let mut line = format!(
                "{:.3}\t{}\t{}\t{}\t",
                time.as_secs_f64(),
                info.cell_id,
                imsi,
                info.correct as u32
            );
            if info.correct {
                line.push_str(&format!(
                    "{}\t{}\t",
                    info.rap_id.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                    info.collided.map(|c| (c as u32).to_string()).unwrap_or_else(|| "-".to_string()),
                ));
            } else {
                line.push_str("-\t-\t");
            }
            line.push_str(&format!("{:.6}", info.delay.as_secs_f64()));
            if let Err(e) = writeln!(out, "{}", line) {
                tracing::error!("write to {} failed: {}", self.filename, e);
                return;
            }
        }
    }

    fn reset_results(&mut self) {
        self.preamble_rx_events.clear();
        self.preamble_phy_rx_events.clear();
    }

    fn end_epoch(&mut self, queue: &mut EventQueue) {
        self.show_results();
        self.reset_results();
        self.epoch.advance(queue, RachEntity::RaPreambleStats);
    }
}

impl RachEntityTrait for RaPreambleStats {
    fn entity(&self) -> RachEntity {
        RachEntity::RaPreambleStats
    }

    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
        let now = queue.now();
        match message.msg {
            SapMsgInner::StorePreambleRx(p) => self.store_preamble_rx(now, p),
            SapMsgInner::StorePreamblePhyRx(p) => self.store_preamble_phy_rx(now, p),
            SapMsgInner::EpochEnd(_) => self.end_epoch(queue),
            other => {
                tracing::warn!("RaPreambleStats: unexpected primitive {}", other);
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

    fn test_collector(name: &str) -> (RaPreambleStats, EventQueue) {
        let mut cfg = SimConfig::default();
        cfg.stats.preamble_rx_filename = std::env::temp_dir()
            .join(format!("rachsim_preamble_{}_{}.txt", std::process::id(), name))
            .to_string_lossy()
            .into_owned();
        let config = SharedConfig::from_config(cfg);
        let mut queue = EventQueue::new();
        let stats = RaPreambleStats::new(&config, &mut queue);
        (stats, queue)
    }

    fn phy_rx(imsi: Imsi, correct: bool, start: SimTime) -> StorePreamblePhyRx {
        StorePreamblePhyRx {
            imsi,
            cell_id: 1,
            correct,
            start_time: start,
        }
    }

    #[test]
    fn collision_flags_cover_the_whole_window() {
        let (mut stats, _queue) = test_collector("coll");
        let filename = stats.filename.clone();
        let t_tx = SimTime::from_millis(10);
        let t_rx = SimTime::from_millis(11);

        // Attempts (A=1, pid 3), (B=2, pid 3), (C=3, pid 7) in one window
        for (imsi, rap_id) in [(1, 3), (2, 3), (3, 7)] {
            stats.store_preamble_phy_rx(t_rx, phy_rx(imsi, true, t_tx));
            stats.store_preamble_rx(
                t_rx,
                StorePreambleRx {
                    imsi,
                    rap_id,
                    start_time: t_tx,
                },
            );
        }
        stats.show_results();

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "% time\tcellId\tIMSI\trxok\trapId\tcoll\tdelay");
        // Both transmitters of pid 3 are flagged collided, pid 7 is clean
        assert!(lines[1].contains("\t1\t1\t3\t1\t"));
        assert!(lines[2].contains("\t2\t1\t3\t1\t"));
        assert!(lines[3].contains("\t3\t1\t7\t0\t"));

        std::fs::remove_file(&filename).ok();
    }

    #[test]
    fn undecoded_rows_use_placeholders() {
        let (mut stats, _queue) = test_collector("lost");
        let filename = stats.filename.clone();
        let t_tx = SimTime::from_millis(10);
        let t_rx = SimTime::from_millis(11);

        stats.store_preamble_phy_rx(t_rx, phy_rx(9, false, t_tx));
        stats.show_results();

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[1].contains("\t9\t0\t-\t-\t"));

        std::fs::remove_file(&filename).ok();
    }

    #[test]
    fn separate_windows_do_not_collide() {
        let (mut stats, _queue) = test_collector("windows");
        let filename = stats.filename.clone();

        // Same preamble id, different reception times: no collision
        for (imsi, t_ms) in [(1u64, 11u64), (2, 12)] {
            let t_tx = SimTime::from_millis(t_ms - 1);
            let t_rx = SimTime::from_millis(t_ms);
            stats.store_preamble_phy_rx(t_rx, phy_rx(imsi, true, t_tx));
            stats.store_preamble_rx(
                t_rx,
                StorePreambleRx {
                    imsi,
                    rap_id: 5,
                    start_time: t_tx,
                },
            );
        }
        stats.show_results();

        let contents = std::fs::read_to_string(&filename).unwrap();
        for line in contents.lines().skip(1) {
            assert!(line.contains("\t5\t0\t"), "unexpected collision in: {}", line);
        }

        std::fs::remove_file(&filename).ok();
    }
}
