use clap::Parser;
use rand::Rng;

use rachsim_config::{SharedConfig, SimConfig, toml_config};
use rachsim_core::entities::RachEntity;
use rachsim_core::{Imsi, SimTime, debug};
use rachsim_entities::mac::mac_enb::EnbMac;
use rachsim_entities::phy::phy_enb::EnbPhy;
use rachsim_entities::stats::ra_complete_stats::RaCompleteStats;
use rachsim_entities::stats::ra_preamble_phy_stats::RaPreamblePhyStats;
use rachsim_entities::stats::ra_preamble_stats::RaPreambleStats;
use rachsim_entities::ue::ue_mac::UeMac;
use rachsim_entities::{EventQueue, MessageRouter, RachEntityTrait};
use rachsim_saps::cmac::RaStartReq;
use rachsim_saps::cphy::SubframeInd;
use rachsim_saps::{Sap, SapMsg, SapMsgInner};

/// Scenario-level endpoint: counts procedure outcomes reported by the UEs
struct UserLog {
    completed: u32,
    failed: u32,
}

impl UserLog {
    fn new() -> Self {
        Self { completed: 0, failed: 0 }
    }
}

impl RachEntityTrait for UserLog {
    fn entity(&self) -> RachEntity {
        RachEntity::User
    }

    fn rx_prim(&mut self, _queue: &mut EventQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::RaCompletedInd(ind) => {
                tracing::info!("imsi {} connected with rnti {}", ind.imsi, ind.rnti);
                self.completed += 1;
            }
            SapMsgInner::RaFailedInd(ind) => {
                tracing::warn!("imsi {} gave up: {:?}", ind.imsi, ind.reason);
                self.failed += 1;
            }
            other => {
                tracing::warn!("UserLog: unexpected primitive {}", other);
            }
        }
    }
}

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

/// Build the eNB stack, the collectors and the contending terminals
fn build_stack(cfg: &SharedConfig) -> MessageRouter {
    let mut router = MessageRouter::new();

    let phy = EnbPhy::new(cfg.clone());
    router.register_entity(Box::new(phy));
    let mac = EnbMac::new(cfg.clone());
    router.register_entity(Box::new(mac));

    let complete = RaCompleteStats::new(cfg, router.event_queue_mut());
    router.register_entity(Box::new(complete));
    let preamble = RaPreambleStats::new(cfg, router.event_queue_mut());
    router.register_entity(Box::new(preamble));
    let phy_stats = RaPreamblePhyStats::new(cfg, router.event_queue_mut());
    router.register_entity(Box::new(phy_stats));

    router.register_entity(Box::new(UserLog::new()));

    let c = cfg.config();
    let arrival_window = SimTime::from_secs(c.scenario.arrival_window_s.max(0.001));
    for imsi in 1..=(c.scenario.num_ues as Imsi) {
        let ue = UeMac::new(cfg.clone(), imsi);
        router.register_entity(Box::new(ue));

        // Terminals start uniformly within the arrival window
        let start_ns = {
            let mut state = cfg.state_write();
            state.rng.random_range(0..arrival_window.as_nanos())
        };
        router.schedule_message(
            SimTime::from_nanos(start_ns),
            SapMsg::new(
                Sap::CmacSap,
                RachEntity::User,
                RachEntity::UeMac(imsi),
                SimTime::ZERO,
                SapMsgInner::RaStartReq(RaStartReq {}),
            ),
        );
    }

    // Seed the subframe clock driven by the PHY
    router.submit_message(SapMsg::new(
        Sap::CphySap,
        RachEntity::EnbPhy,
        RachEntity::EnbPhy,
        SimTime::ZERO,
        SapMsgInner::SubframeInd(SubframeInd {
            frame_no: 1,
            subframe_no: 1,
        }),
    ));

    router
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LTE RACH procedure simulator",
    long_about = "Runs a discrete-event simulation of the LTE random access procedure \
using the provided TOML configuration file"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with RACH/PHY/statistics parameters")]
    config: String,

    /// Override the number of contending terminals
    #[arg(long)]
    num_ues: Option<u32>,

    /// Override the simulated duration, in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Override the RNG seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    let shared = load_config_from_toml(&args.config);
    let mut cfg: SimConfig = (*shared.config()).clone();
    if let Some(n) = args.num_ues {
        cfg.scenario.num_ues = n;
    }
    if let Some(d) = args.duration {
        cfg.scenario.duration_s = d;
    }
    if let Some(s) = args.seed {
        cfg.seed = s;
    }
    let duration = SimTime::from_secs(cfg.scenario.duration_s);
    let num_ues = cfg.scenario.num_ues;
    let seed = cfg.seed;
    let _log_guard = debug::setup_logging_default(cfg.debug_log.clone());
    let shared = SharedConfig::from_config(cfg);

    eprintln!("rachsim: {} terminal(s), {} simulated, seed {}", num_ues, duration, seed);

    let mut router = build_stack(&shared);
    router.run_until(duration);
    router.finalize();

    if let Some(log) = router
        .get_entity(RachEntity::User)
        .and_then(|e| e.as_any_mut().downcast_mut::<UserLog>())
    {
        let pending = num_ues - log.completed - log.failed;
        eprintln!(
            "rachsim: {} completed, {} failed, {} still in progress",
            log.completed, log.failed, pending
        );
    }

    let c = shared.config();
    eprintln!(
        "rachsim: logs written to {}, {}, {}",
        c.stats.ra_delay_filename, c.stats.preamble_rx_filename, c.stats.preamble_phy_rx_filename
    );
}
