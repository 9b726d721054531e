use std::sync::{Arc, RwLock};

use rand::SeedableRng;
use rand::rngs::StdRng;

use rachsim_core::{CellId, NUM_RA_PREAMBLES_TOTAL, SimTime, SpectralDensity};

/// RACH procedure parameters, as broadcast in SIB2 by a real eNB
#[derive(Debug, Clone)]
pub struct CfgRach {
    /// Number of preambles available for contention-based access.
    /// Ids from this value up to 64 are reserved for non-contention allocation.
    pub num_contention_preambles: u8,
    /// Maximum number of preamble transmissions before the UE aborts
    pub preamble_trans_max: u8,
    /// RAR response window, in subframes
    pub ra_response_window_size: u8,
    /// Contention resolution timer, in subframes
    pub contention_resolution_timer_sf: u8,
    /// Maximum backoff after a failed attempt, in milliseconds
    pub backoff_indicator_ms: u16,
    /// Delay between preamble detection and RAR transmission, in subframes.
    /// Must not exceed ra_response_window_size.
    pub rar_delay_sf: u8,
    /// eNB processing delay between Msg3 reception and Msg4 transmission,
    /// in subframes
    pub msg4_delay_sf: u8,
}

impl Default for CfgRach {
    fn default() -> Self {
        Self {
            num_contention_preambles: 52,
            preamble_trans_max: 50,
            ra_response_window_size: 3,
            contention_resolution_timer_sf: 8,
            backoff_indicator_ms: 20,
            rar_delay_sf: 2,
            msg4_delay_sf: 4,
        }
    }
}

/// PHY-layer model parameters
#[derive(Debug, Clone)]
pub struct CfgPhy {
    /// Receiver noise power spectral density, in dBm/Hz
    /// (thermal floor -174 dBm/Hz plus the receiver noise figure)
    pub noise_psd_dbm_hz: f64,
    /// SNR threshold below which a preamble is not detected, in dB
    pub detection_threshold_db: f64,
    /// Preamble duration (format 0), in microseconds
    pub preamble_duration_us: u64,
    /// Target preamble received power for the first transmission, in dBm
    pub initial_received_target_power_dbm: f64,
    /// Received power increase per retransmission, in dB
    pub power_ramping_step_db: f64,
}

impl Default for CfgPhy {
    fn default() -> Self {
        Self {
            noise_psd_dbm_hz: -169.0,
            detection_threshold_db: 4.0,
            preamble_duration_us: 900,
            initial_received_target_power_dbm: -90.0,
            power_ramping_step_db: 2.0,
        }
    }
}

impl CfgPhy {
    pub fn noise_psd(&self) -> SpectralDensity {
        SpectralDensity::from_watts_per_hz(rachsim_core::power::dbm_to_watts(self.noise_psd_dbm_hz))
    }

    pub fn preamble_duration(&self) -> SimTime {
        SimTime::from_micros(self.preamble_duration_us)
    }
}

/// Statistics output parameters. Epoch and start time are shared by the
/// three collectors; each can still be retargeted at runtime through its
/// entity interface.
#[derive(Debug, Clone)]
pub struct CfgStats {
    pub start_time_s: f64,
    pub epoch_duration_s: f64,
    pub ra_delay_filename: String,
    pub preamble_rx_filename: String,
    pub preamble_phy_rx_filename: String,
}

impl Default for CfgStats {
    fn default() -> Self {
        Self {
            start_time_s: 0.0,
            epoch_duration_s: 0.25,
            ra_delay_filename: "RaCompleted.txt".to_string(),
            preamble_rx_filename: "PreambleRxCollisions.txt".to_string(),
            preamble_phy_rx_filename: "PreamblePhyRx.txt".to_string(),
        }
    }
}

/// Scenario parameters consumed by the simulation binary
#[derive(Debug, Clone)]
pub struct CfgScenario {
    /// Number of contending terminals
    pub num_ues: u32,
    /// Terminals start their access procedure uniformly within this window
    pub arrival_window_s: f64,
    /// Total simulated duration
    pub duration_s: f64,
}

impl Default for CfgScenario {
    fn default() -> Self {
        Self {
            num_ues: 10,
            arrival_window_s: 0.05,
            duration_s: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed for the simulation-wide RNG; a fixed seed reproduces a run exactly
    pub seed: u64,
    pub debug_log: Option<String>,
    pub cell_id: CellId,

    pub rach: CfgRach,
    pub phy: CfgPhy,
    pub stats: CfgStats,
    pub scenario: CfgScenario,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            debug_log: None,
            cell_id: 1,
            rach: CfgRach::default(),
            phy: CfgPhy::default(),
            stats: CfgStats::default(),
            scenario: CfgScenario::default(),
        }
    }
}

impl SimConfig {
    /// Validate that all required configuration fields are properly set.
    pub fn validate(&self) -> Result<(), &str> {
        if self.rach.num_contention_preambles == 0 {
            return Err("num_contention_preambles must be at least 1");
        }
        if self.rach.num_contention_preambles > NUM_RA_PREAMBLES_TOTAL {
            return Err("num_contention_preambles must not exceed 64");
        }
        if self.rach.preamble_trans_max == 0 {
            return Err("preamble_trans_max must be at least 1");
        }
        if self.rach.rar_delay_sf > self.rach.ra_response_window_size {
            return Err("rar_delay_sf must not exceed ra_response_window_size");
        }
        if self.stats.epoch_duration_s <= 0.0 {
            return Err("epoch_duration_s must be positive");
        }
        if self.phy.preamble_duration_us == 0 {
            return Err("preamble_duration_us must be positive");
        }
        Ok(())
    }
}

/// Mutable simulation state: the single deterministic random stream.
/// All stochastic draws (preamble selection, backoff) go through this RNG,
/// so a fixed seed fixes the whole run.
pub struct SimState {
    pub rng: StdRng,
}

impl SimState {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Global shared configuration: immutable config + mutable state.
#[derive(Clone)]
pub struct SharedConfig {
    /// Read-only configuration (immutable after construction).
    cfg: Arc<SimConfig>,
    /// Mutable state guarded with RwLock (the RNG stream).
    state: Arc<RwLock<SimState>>,
}

impl SharedConfig {
    pub fn from_config(cfg: SimConfig) -> Self {
        let state = SimState::from_seed(cfg.seed);
        Self::from_parts(cfg, state)
    }

    pub fn from_parts(cfg: SimConfig, state: SimState) -> Self {
        // Check config for validity before returning the SharedConfig object
        match cfg.validate() {
            Ok(_) => {}
            Err(e) => panic!("Invalid simulation configuration: {}", e),
        }

        Self {
            cfg: Arc::new(cfg),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<SimConfig> {
        Arc::clone(&self.cfg)
    }

    /// Write guard for mutable state.
    pub fn state_write(&self) -> std::sync::RwLockWriteGuard<'_, SimState> {
        self.state.write().expect("SimState RwLock blocked")
    }
}
