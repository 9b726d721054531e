use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// Bandwidth occupied by a PRACH preamble (6 resource blocks)
pub const PRACH_BANDWIDTH_HZ: f64 = 1.08e6;

/// Power spectral density in W/Hz.
///
/// The simulator models the PRACH band as a single flat chunk, so a scalar
/// density is sufficient; per-subcarrier shaping is out of scope.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct SpectralDensity(f64);

impl SpectralDensity {
    pub const ZERO: SpectralDensity = SpectralDensity(0.0);

    pub fn from_watts_per_hz(w: f64) -> Self {
        SpectralDensity(w)
    }

    /// Density of `dbm` total power spread evenly over the PRACH bandwidth
    pub fn from_total_dbm(dbm: f64) -> Self {
        SpectralDensity(dbm_to_watts(dbm) / PRACH_BANDWIDTH_HZ)
    }

    pub fn watts_per_hz(self) -> f64 {
        self.0
    }

    /// Linear power ratio against a reference density (e.g. SINR, SNR)
    pub fn ratio(self, reference: SpectralDensity) -> f64 {
        self.0 / reference.0
    }
}

impl Add for SpectralDensity {
    type Output = SpectralDensity;

    fn add(self, rhs: Self) -> Self::Output {
        SpectralDensity(self.0 + rhs.0)
    }
}

impl AddAssign for SpectralDensity {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for SpectralDensity {
    type Output = SpectralDensity;

    fn sub(self, rhs: Self) -> Self::Output {
        SpectralDensity(self.0 - rhs.0)
    }
}

impl SubAssign for SpectralDensity {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl fmt::Debug for SpectralDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3e} W/Hz", self.0)
    }
}

pub fn dbm_to_watts(dbm: f64) -> f64 {
    1e-3 * 10f64.powf(dbm / 10.0)
}

pub fn watts_to_dbm(watts: f64) -> f64 {
    10.0 * (watts / 1e-3).log10()
}

pub fn ratio_to_db(ratio: f64) -> f64 {
    10.0 * ratio.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbm_watts_roundtrip() {
        for dbm in [-120.0, -90.0, -30.0, 0.0, 23.0] {
            let w = dbm_to_watts(dbm);
            assert!((watts_to_dbm(w) - dbm).abs() < 1e-9);
        }
    }

    #[test]
    fn density_arithmetic() {
        let a = SpectralDensity::from_watts_per_hz(2e-18);
        let b = SpectralDensity::from_watts_per_hz(3e-18);
        let sum = a + b;
        assert!((sum.watts_per_hz() - 5e-18).abs() < 1e-30);
        assert!(((sum - a).watts_per_hz() - 3e-18).abs() < 1e-30);
        assert!((b.ratio(a) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn total_dbm_spreads_over_prach_band() {
        let d = SpectralDensity::from_total_dbm(-90.0);
        let expected = dbm_to_watts(-90.0) / PRACH_BANDWIDTH_HZ;
        assert!((d.watts_per_hz() - expected).abs() < 1e-30);
    }
}
