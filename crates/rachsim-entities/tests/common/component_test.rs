use rachsim_config::{SharedConfig, SimConfig};
use rachsim_core::entities::RachEntity;
use rachsim_core::{Imsi, SimTime};
use rachsim_entities::mac::mac_enb::EnbMac;
use rachsim_entities::phy::phy_enb::EnbPhy;
use rachsim_entities::stats::ra_complete_stats::RaCompleteStats;
use rachsim_entities::stats::ra_preamble_phy_stats::RaPreamblePhyStats;
use rachsim_entities::stats::ra_preamble_stats::RaPreambleStats;
use rachsim_entities::ue::ue_mac::UeMac;
use rachsim_entities::{MessageRouter, RachEntityTrait};
use rachsim_saps::cmac::RaStartReq;
use rachsim_saps::cphy::SubframeInd;
use rachsim_saps::sapmsg::{Sap, SapMsg, SapMsgInner};

use super::sink::Sink;

/// Creates a default config for testing. It can still be modified as needed
/// before passing it to the ComponentTest constructor. Collector output is
/// redirected to unique files under the system temp directory.
pub fn default_test_config(tag: &str) -> SimConfig {
    let mut cfg = SimConfig::default();
    let tmp = std::env::temp_dir();
    let pid = std::process::id();
    cfg.stats.ra_delay_filename = tmp
        .join(format!("rachsim_it_{}_{}_complete.txt", pid, tag))
        .to_string_lossy()
        .into_owned();
    cfg.stats.preamble_rx_filename = tmp
        .join(format!("rachsim_it_{}_{}_preamble.txt", pid, tag))
        .to_string_lossy()
        .into_owned();
    cfg.stats.preamble_phy_rx_filename = tmp
        .join(format!("rachsim_it_{}_{}_phy.txt", pid, tag))
        .to_string_lossy()
        .into_owned();
    cfg
}

/// Infrastructure for testing the RACH stack
/// Quick setup of all entities for end-to-end testing
/// Supports optional sinks for collecting messages for later inspection
pub struct ComponentTest {
    pub config: SharedConfig,
    pub router: MessageRouter,
    pub sinks: Vec<RachEntity>,
}

impl ComponentTest {
    pub fn new(config: SimConfig) -> Self {
        let shared_config = SharedConfig::from_config(config);
        let router = MessageRouter::new();

        Self {
            config: shared_config,
            router,
            sinks: vec![],
        }
    }

    /// Registers the eNB stack, the statistics collectors and one UE per
    /// IMSI, then seeds the subframe clock.
    pub fn populate_entities(&mut self, ues: &[Imsi], sinks: Vec<RachEntity>) {
        let phy = EnbPhy::new(self.config.clone());
        self.router.register_entity(Box::new(phy));

        let mac = EnbMac::new(self.config.clone());
        self.router.register_entity(Box::new(mac));

        let complete = RaCompleteStats::new(&self.config, self.router.event_queue_mut());
        self.router.register_entity(Box::new(complete));
        let preamble = RaPreambleStats::new(&self.config, self.router.event_queue_mut());
        self.router.register_entity(Box::new(preamble));
        let phy_stats = RaPreamblePhyStats::new(&self.config, self.router.event_queue_mut());
        self.router.register_entity(Box::new(phy_stats));

        for imsi in ues {
            let ue = UeMac::new(self.config.clone(), *imsi);
            self.router.register_entity(Box::new(ue));
        }

        self.create_sinks(sinks);

        // Seed the subframe clock driven by the PHY
        self.router.submit_message(SapMsg::new(
            Sap::CphySap,
            RachEntity::EnbPhy,
            RachEntity::EnbPhy,
            SimTime::ZERO,
            SapMsgInner::SubframeInd(SubframeInd {
                frame_no: 1,
                subframe_no: 1,
            }),
        ));
    }

    fn create_sinks(&mut self, sinks: Vec<RachEntity>) {
        for sink in sinks.iter() {
            assert!(!self.sinks.contains(sink), "Sink already exists: {:?}", sink);
            assert!(
                self.router.get_entity(*sink).is_none(),
                "Sink already registered as entity: {:?}",
                sink
            );

            self.sinks.push(*sink);
            let sink = Sink::new(*sink);
            self.router.register_entity(Box::new(sink));
        }
    }

    /// Schedule the start of a UE's access procedure
    pub fn start_ue_at(&mut self, imsi: Imsi, t: SimTime) {
        let msg = SapMsg::new(
            Sap::CmacSap,
            RachEntity::User,
            RachEntity::UeMac(imsi),
            SimTime::ZERO,
            SapMsgInner::RaStartReq(RaStartReq {}),
        );
        self.router.schedule_message(t, msg);
    }

    pub fn run_until(&mut self, t: SimTime) {
        self.router.run_until(t);
    }

    pub fn submit_message(&mut self, message: SapMsg) {
        self.router.submit_message(message);
    }

    /// Downcast access to a registered UE, for state inspection
    pub fn ue_mut(&mut self, imsi: Imsi) -> &mut UeMac {
        self.router
            .get_entity(RachEntity::UeMac(imsi))
            .expect("UE not registered")
            .as_any_mut()
            .downcast_mut::<UeMac>()
            .expect("entity is not a UeMac")
    }

    /// Downcast access to the eNB MAC, e.g. for non-contention allocation
    pub fn mac_mut(&mut self) -> &mut EnbMac {
        self.router
            .get_entity(RachEntity::EnbMac)
            .expect("MAC not registered")
            .as_any_mut()
            .downcast_mut::<EnbMac>()
            .expect("entity is not an EnbMac")
    }

    pub fn dump_sinks(&mut self) -> Vec<SapMsg> {
        let mut msgs = vec![];
        for sink in self.sinks.clone().iter() {
            if let Some(entity) = self.router.get_entity(*sink) {
                if let Some(sink) = entity.as_any_mut().downcast_mut::<Sink>() {
                    let mut sink_msgs = sink.take_msgqueue();
                    msgs.append(&mut sink_msgs);
                }
            }
        }
        msgs
    }
}
