pub mod epoch;
pub mod ra_complete_stats;
pub mod ra_preamble_phy_stats;
pub mod ra_preamble_stats;

use std::fs::{File, OpenOptions};

/// Open a collector output file: truncating on the first write, appending
/// afterwards. I/O failures are logged and reported as None; telemetry is
/// best-effort and never stops the simulation.
pub(crate) fn open_stats_file(filename: &str, first_write: bool) -> Option<File> {
    let result = if first_write {
        File::create(filename)
    } else {
        OpenOptions::new().append(true).open(filename)
    };
    match result {
        Ok(f) => Some(f),
        Err(e) => {
            tracing::error!("can't open file {}: {}", filename, e);
            None
        }
    }
}
