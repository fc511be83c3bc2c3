//! Indoor path-loss model.
//!
//! Tuned Hata-Okumura form from "A Practical Path Loss Model For Indoor WiFi
//! Positioning Enhancement":
//!
//!   PL  = Ptx − Prx + Gtx + Grx
//!   d   = 10 ^ ((PL − Xa + 20·log10(λ) − 20·log10(4π)) / (10·n))
//!
//! `n` is the interference exponent, looked up from the received power.

use crate::core::constants::*;
use crate::validation::error::{LocalizationError, LocalizationResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-sensor radio calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathLossParams {
    /// Transmit power (dBm)
    pub ptx: f64,
    /// Transmitter antenna gain (dBi)
    pub gtx: f64,
    /// Receiver antenna gain (dBi)
    pub grx: f64,
    /// Environment bias (dB), the value the calibration tuner adjusts
    pub xa: f64,
    /// Carrier wavelength (meters)
    pub wavelength: f64,
}

impl Default for PathLossParams {
    fn default() -> Self {
        Self {
            ptx: DEFAULT_PTX_DBM,
            gtx: DEFAULT_GTX_DBI,
            grx: DEFAULT_GRX_DBI,
            xa: DEFAULT_XA_DB,
            wavelength: DEFAULT_WAVELENGTH_M,
        }
    }
}

impl PathLossParams {
    pub fn with_xa(mut self, xa: f64) -> Self {
        self.xa = xa;
        self
    }

    pub fn distance_from_power(&self, prx: f64, n: f64) -> f64 {
        distance_from_power(self.ptx, prx, self.gtx, self.grx, self.xa, self.wavelength, n)
    }

    pub fn power_from_distance(&self, distance_m: f64, n: f64) -> f64 {
        power_from_distance(self.ptx, distance_m, self.gtx, self.grx, self.xa, self.wavelength, n)
    }

    pub fn validate(&self) -> LocalizationResult<()> {
        if !(self.wavelength > 0.0) {
            return Err(LocalizationError::InvalidParameter {
                parameter: "wavelength".to_string(),
                value: self.wavelength.to_string(),
            });
        }
        Ok(())
    }
}

/// Free-space constant term 20·log10(λ) − 20·log10(4π)
fn wavelength_term(wavelength: f64) -> f64 {
    20.0 * wavelength.log10() - 20.0 * (4.0 * PI).log10()
}

/// Distance (meters) implied by a received power. Returns NaN when `λ` or `n` is not positive.
pub fn distance_from_power(ptx: f64, prx: f64, gtx: f64, grx: f64, xa: f64, wavelength: f64, n: f64) -> f64 {
    if !(wavelength > 0.0) || !(n > 0.0) {
        return f64::NAN;
    }
    let path_loss = ptx - prx + gtx + grx;
    let exponent = (path_loss - xa + wavelength_term(wavelength)) / (10.0 * n);
    10f64.powf(exponent)
}

/// Received power (dBm) predicted at a distance; inverse of [`distance_from_power`]
pub fn power_from_distance(ptx: f64, distance_m: f64, gtx: f64, grx: f64, xa: f64, wavelength: f64, n: f64) -> f64 {
    if !(wavelength > 0.0) || !(distance_m > 0.0) {
        return f64::NAN;
    }
    let distance_loss = 10.0 * n * distance_m.log10();
    ptx + gtx + grx - xa - distance_loss + wavelength_term(wavelength)
}

/// Checked variant of [`distance_from_power`]
pub fn try_distance_from_power(params: &PathLossParams, prx: f64, n: f64) -> LocalizationResult<f64> {
    params.validate()?;
    if !(n > 0.0) {
        return Err(LocalizationError::InvalidParameter {
            parameter: "interference_exponent".to_string(),
            value: n.to_string(),
        });
    }
    Ok(params.distance_from_power(prx, n))
}

/// One breakpoint of an interference table: powers strictly above `above_dbm` map to `exponent`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterferenceStep {
    pub above_dbm: f64,
    pub exponent: f64,
}

/// Step function from received power to interference exponent.
///
/// Steps are checked in order; the first whose threshold the power exceeds wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterferenceTable {
    pub steps: Vec<InterferenceStep>,
    pub fallback: f64,
}

impl InterferenceTable {
    pub fn new(steps: Vec<(f64, f64)>, fallback: f64) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|(above_dbm, exponent)| InterferenceStep { above_dbm, exponent })
                .collect(),
            fallback,
        }
    }

    /// Empirical table used when converting readings to distances
    pub fn forward() -> Self {
        Self::new(
            vec![(-33.0, 8.0), (-36.0, 7.0), (-40.0, 6.0), (-49.0, 5.0), (-55.0, 4.0)],
            3.5,
        )
    }

    /// Coarse table used when predicting power from distance
    pub fn reverse() -> Self {
        Self::new(vec![(-37.0, 5.0)], 4.0)
    }

    pub fn exponent(&self, prx: f64) -> f64 {
        self.steps
            .iter()
            .find(|step| prx > step.above_dbm)
            .map_or(self.fallback, |step| step.exponent)
    }

    /// Distinct exponents in ascending order
    pub fn candidate_exponents(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.steps.iter().map(|s| s.exponent).collect();
        values.push(self.fallback);
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        values
    }

    /// Thresholds must be strictly descending and every exponent positive
    pub fn is_well_formed(&self) -> bool {
        self.fallback > 0.0
            && self.steps.iter().all(|s| s.exponent > 0.0)
            && self.steps.windows(2).all(|w| w[0].above_dbm > w[1].above_dbm)
    }
}

/// Both interference tables plus the global exponent multiplier.
///
/// The forward and reverse tables describe the same physical quantity with different
/// breakpoints; they are tuned independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterferenceModel {
    pub forward: InterferenceTable,
    pub reverse: InterferenceTable,
    /// Scales every forward-table exponent
    pub multiplier: f64,
}

impl Default for InterferenceModel {
    fn default() -> Self {
        Self {
            forward: InterferenceTable::forward(),
            reverse: InterferenceTable::reverse(),
            multiplier: 1.0,
        }
    }
}

impl InterferenceModel {
    /// Exponent used for a reading's distance estimate
    pub fn interference_exponent(&self, prx: f64) -> f64 {
        self.forward.exponent(prx) * self.multiplier
    }

    /// Exponent the reverse direction expects at a predicted power
    pub fn reverse_exponent(&self, prx: f64) -> f64 {
        self.reverse.exponent(prx)
    }

    /// Power predicted at `distance_m`, choosing the reverse-table exponent that is
    /// most self-consistent with the power it predicts.
    pub fn predicted_power(&self, params: &PathLossParams, distance_m: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for n in self.reverse.candidate_exponents() {
            let prx = params.power_from_distance(distance_m, n);
            if prx.is_nan() {
                continue;
            }
            let difference = (n - self.reverse_exponent(prx)).abs();
            if best.map_or(true, |(d, _)| difference < d) {
                best = Some((difference, prx));
            }
        }
        best.map(|(_, prx)| prx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reference_scenario_distance() {
        let params = PathLossParams::default();
        let model = InterferenceModel::default();
        let n = model.interference_exponent(-40.0);
        assert_eq!(n, 5.0);

        let d = params.distance_from_power(-40.0, n);
        assert_abs_diff_eq!(d, 3.9083059409359, epsilon = 1e-9);
    }

    #[test]
    fn test_power_distance_round_trip() {
        let params = PathLossParams {
            ptx: 18.0,
            gtx: 3.0,
            grx: 1.5,
            xa: 7.25,
            wavelength: 0.125,
        };
        for &(prx, n) in &[(-30.0, 8.0), (-52.5, 4.0), (-71.0, 3.5), (-44.0, 2.0)] {
            let d = params.distance_from_power(prx, n);
            assert!(d > 0.0);
            assert_abs_diff_eq!(params.power_from_distance(d, n), prx, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_wavelength_is_nan() {
        let params = PathLossParams::default();
        assert!(distance_from_power(20.0, -40.0, 2.5, 2.5, -5.0, 0.0, 5.0).is_nan());
        assert!(distance_from_power(20.0, -40.0, 2.5, 2.5, -5.0, -0.12, 5.0).is_nan());
        assert!(try_distance_from_power(&params.with_xa(0.0), -40.0, 0.0).is_err());

        let bad = PathLossParams { wavelength: 0.0, ..params };
        assert!(matches!(
            try_distance_from_power(&bad, -40.0, 5.0),
            Err(LocalizationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_forward_table_breakpoints() {
        let table = InterferenceTable::forward();
        assert_eq!(table.exponent(-20.0), 8.0);
        assert_eq!(table.exponent(-33.0), 7.0);
        assert_eq!(table.exponent(-35.0), 7.0);
        assert_eq!(table.exponent(-36.0), 6.0);
        assert_eq!(table.exponent(-40.0), 5.0);
        assert_eq!(table.exponent(-49.0), 4.0);
        assert_eq!(table.exponent(-55.0), 3.5);
        assert_eq!(table.exponent(-90.0), 3.5);
        assert!(table.is_well_formed());
    }

    #[test]
    fn test_tables_stay_distinct() {
        let model = InterferenceModel::default();
        assert_eq!(model.reverse_exponent(-30.0), 5.0);
        assert_eq!(model.reverse_exponent(-45.0), 4.0);
        assert_eq!(model.interference_exponent(-45.0), 5.0);
        assert_eq!(model.reverse.candidate_exponents(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_multiplier_scales_forward_only() {
        let model = InterferenceModel {
            multiplier: 0.5,
            ..InterferenceModel::default()
        };
        assert_eq!(model.interference_exponent(-20.0), 4.0);
        assert_eq!(model.reverse_exponent(-20.0), 5.0);
    }

    #[test]
    fn test_predicted_power_is_self_consistent() {
        let params = PathLossParams::default();
        let model = InterferenceModel::default();

        let far = model.predicted_power(&params, 30.0).unwrap();
        assert_eq!(model.reverse_exponent(far), 4.0);
        assert_abs_diff_eq!(far, params.power_from_distance(30.0, 4.0), epsilon = 1e-12);

        assert!(model.predicted_power(&params, 0.0).is_none());
    }

    #[test]
    fn test_malformed_table_detected() {
        let table = InterferenceTable::new(vec![(-50.0, 4.0), (-40.0, 5.0)], 3.0);
        assert!(!table.is_well_formed());
    }
}
