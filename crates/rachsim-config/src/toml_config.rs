use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::sim_config::{CfgPhy, CfgRach, CfgScenario, CfgStats, SharedConfig, SimConfig};

/// Build `SharedConfig` from a TOML configuration file
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.1";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref rach) = root.rach {
        if !rach.extra.is_empty() {
            return Err(format!("Unrecognized fields: rach::{:?}", sorted_keys(&rach.extra)).into());
        }
    }
    if let Some(ref phy) = root.phy {
        if !phy.extra.is_empty() {
            return Err(format!("Unrecognized fields: phy::{:?}", sorted_keys(&phy.extra)).into());
        }
    }
    if let Some(ref stats) = root.stats {
        if !stats.extra.is_empty() {
            return Err(format!("Unrecognized fields: stats::{:?}", sorted_keys(&stats.extra)).into());
        }
    }
    if let Some(ref sc) = root.scenario {
        if !sc.extra.is_empty() {
            return Err(format!("Unrecognized fields: scenario::{:?}", sorted_keys(&sc.extra)).into());
        }
    }

    // Build config from required and optional values
    let mut cfg = SimConfig {
        seed: root.seed.unwrap_or(1),
        debug_log: root.debug_log,
        cell_id: root.cell_id.unwrap_or(1),
        rach: CfgRach::default(),
        phy: CfgPhy::default(),
        stats: CfgStats::default(),
        scenario: CfgScenario::default(),
    };

    if let Some(rach) = root.rach {
        apply_rach_patch(&mut cfg.rach, rach);
    }
    if let Some(phy) = root.phy {
        apply_phy_patch(&mut cfg.phy, phy);
    }
    if let Some(stats) = root.stats {
        apply_stats_patch(&mut cfg.stats, stats);
    }
    if let Some(sc) = root.scenario {
        apply_scenario_patch(&mut cfg.scenario, sc);
    }

    Ok(SharedConfig::from_config(cfg))
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let cfg = from_reader(r)?;
    Ok(cfg)
}

fn apply_rach_patch(dst: &mut CfgRach, src: RachDto) {
    if let Some(v) = src.num_contention_preambles {
        dst.num_contention_preambles = v;
    }
    if let Some(v) = src.preamble_trans_max {
        dst.preamble_trans_max = v;
    }
    if let Some(v) = src.ra_response_window_size {
        dst.ra_response_window_size = v;
    }
    if let Some(v) = src.contention_resolution_timer_sf {
        dst.contention_resolution_timer_sf = v;
    }
    if let Some(v) = src.backoff_indicator_ms {
        dst.backoff_indicator_ms = v;
    }
    if let Some(v) = src.rar_delay_sf {
        dst.rar_delay_sf = v;
    }
    if let Some(v) = src.msg4_delay_sf {
        dst.msg4_delay_sf = v;
    }
}

fn apply_phy_patch(dst: &mut CfgPhy, src: PhyDto) {
    if let Some(v) = src.noise_psd_dbm_hz {
        dst.noise_psd_dbm_hz = v;
    }
    if let Some(v) = src.detection_threshold_db {
        dst.detection_threshold_db = v;
    }
    if let Some(v) = src.preamble_duration_us {
        dst.preamble_duration_us = v;
    }
    if let Some(v) = src.initial_received_target_power_dbm {
        dst.initial_received_target_power_dbm = v;
    }
    if let Some(v) = src.power_ramping_step_db {
        dst.power_ramping_step_db = v;
    }
}

fn apply_stats_patch(dst: &mut CfgStats, src: StatsDto) {
    if let Some(v) = src.start_time_s {
        dst.start_time_s = v;
    }
    if let Some(v) = src.epoch_duration_s {
        dst.epoch_duration_s = v;
    }
    if let Some(v) = src.ra_delay_filename {
        dst.ra_delay_filename = v;
    }
    if let Some(v) = src.preamble_rx_filename {
        dst.preamble_rx_filename = v;
    }
    if let Some(v) = src.preamble_phy_rx_filename {
        dst.preamble_phy_rx_filename = v;
    }
}

fn apply_scenario_patch(dst: &mut CfgScenario, src: ScenarioDto) {
    if let Some(v) = src.num_ues {
        dst.num_ues = v;
    }
    if let Some(v) = src.arrival_window_s {
        dst.arrival_window_s = v;
    }
    if let Some(v) = src.duration_s {
        dst.duration_s = v;
    }
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    seed: Option<u64>,
    debug_log: Option<String>,
    cell_id: Option<u16>,

    #[serde(default)]
    rach: Option<RachDto>,

    #[serde(default)]
    phy: Option<PhyDto>,

    #[serde(default)]
    stats: Option<StatsDto>,

    #[serde(default)]
    scenario: Option<ScenarioDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct RachDto {
    pub num_contention_preambles: Option<u8>,
    pub preamble_trans_max: Option<u8>,
    pub ra_response_window_size: Option<u8>,
    pub contention_resolution_timer_sf: Option<u8>,
    pub backoff_indicator_ms: Option<u16>,
    pub rar_delay_sf: Option<u8>,
    pub msg4_delay_sf: Option<u8>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct PhyDto {
    pub noise_psd_dbm_hz: Option<f64>,
    pub detection_threshold_db: Option<f64>,
    pub preamble_duration_us: Option<u64>,
    pub initial_received_target_power_dbm: Option<f64>,
    pub power_ramping_step_db: Option<f64>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct StatsDto {
    pub start_time_s: Option<f64>,
    pub epoch_duration_s: Option<f64>,
    pub ra_delay_filename: Option<String>,
    pub preamble_rx_filename: Option<String>,
    pub preamble_phy_rx_filename: Option<String>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct ScenarioDto {
    pub num_ues: Option<u32>,
    pub arrival_window_s: Option<f64>,
    pub duration_s: Option<f64>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let cfg = from_toml_str("config_version = \"0.1\"\n").unwrap();
        assert_eq!(cfg.config().seed, 1);
        assert_eq!(cfg.config().rach.num_contention_preambles, 52);
    }

    #[test]
    fn parse_full_sections() {
        let toml = r#"
config_version = "0.1"
seed = 42
cell_id = 7

[rach]
num_contention_preambles = 12
preamble_trans_max = 6

[phy]
detection_threshold_db = 6.0

[stats]
epoch_duration_s = 0.5
ra_delay_filename = "delays.txt"

[scenario]
num_ues = 30
"#;
        let cfg = from_toml_str(toml).unwrap();
        let c = cfg.config();
        assert_eq!(c.seed, 42);
        assert_eq!(c.cell_id, 7);
        assert_eq!(c.rach.num_contention_preambles, 12);
        assert_eq!(c.rach.preamble_trans_max, 6);
        assert!((c.phy.detection_threshold_db - 6.0).abs() < 1e-12);
        assert!((c.stats.epoch_duration_s - 0.5).abs() < 1e-12);
        assert_eq!(c.stats.ra_delay_filename, "delays.txt");
        assert_eq!(c.scenario.num_ues, 30);
    }

    #[test]
    fn rejects_wrong_version() {
        assert!(from_toml_str("config_version = \"0.9\"\n").is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = "config_version = \"0.1\"\nbogus = 1\n";
        assert!(from_toml_str(toml).is_err());
        let toml = "config_version = \"0.1\"\n[rach]\nbogus = 1\n";
        assert!(from_toml_str(toml).is_err());
    }
}
