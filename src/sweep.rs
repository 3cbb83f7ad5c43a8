//! Power sweep over an I-V curve: maximum power point and fill factor.

use crate::pvcell::{CellState, PvCell};
use crate::{Error, Result};
use tracing::{debug, warn};

/// Number of voltage steps in a standard sweep (`SWEEP_STEPS + 1` samples).
pub const SWEEP_STEPS: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct IvCurve {
    pub voltages: Vec<f64>, // [V] 0..=voc
    pub currents: Vec<f64>, // [A] index-aligned with voltages
    pub vmp: f64,
    pub imp: f64,
    pub pmp: f64,
    /// pmp / (isc * voc). NaN when isc * voc == 0.
    pub fill_factor: f64,
    pub isc: f64,
    pub voc: f64,
    /// Samples whose solve hit the iteration cap or went non-finite.
    pub non_converged: usize,
}

impl IvCurve {
    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.voltages.iter().zip(&self.currents).map(|(v, i)| v * i).collect()
    }

    pub fn checked_fill_factor(&self) -> Result<f64> {
        if self.isc * self.voc == 0.0 {
            return Err(Error::DegenerateRatio { isc: self.isc, voc: self.voc });
        }
        Ok(self.fill_factor)
    }

    /// Conversion efficiency at the maximum power point. NaN when insolation * area == 0.
    pub fn efficiency(&self, area: f64, insolation: f64) -> f64 {
        let p_in = insolation * area;
        if p_in == 0.0 {
            return f64::NAN;
        }
        self.pmp / p_in
    }
}

impl PvCell {
    pub fn sweep(&self, insolation: f64) -> Result<IvCurve> {
        self.sweep_with_steps(insolation, SWEEP_STEPS)
    }

    pub fn sweep_with_steps(&self, insolation: f64, steps: usize) -> Result<IvCurve> {
        if steps == 0 {
            return Err(Error::invalid("steps", 0.0));
        }
        let state = self.state(insolation)?;
        Ok(self.sweep_state_with_steps(&state, steps))
    }

    pub fn sweep_state(&self, state: &CellState) -> IvCurve {
        self.sweep_state_with_steps(state, SWEEP_STEPS)
    }

    fn sweep_state_with_steps(&self, state: &CellState, steps: usize) -> IvCurve {
        let (voc, isc) = (state.voc, state.isc);
        let voltages: Vec<f64> = (0..=steps).map(|k| voc * k as f64 / steps as f64).collect();
        let solutions = self.solve_iv(state, &voltages);
        let non_converged = solutions.iter().filter(|s| !s.converged).count();
        let currents: Vec<f64> = solutions.iter().map(|s| s.i).collect();

        // first maximum wins
        let (mut pmp, mut vmp, mut imp) = (0.0, 0.0, 0.0);
        for (&v, &i) in voltages.iter().zip(&currents) {
            let p = v * i;
            if p > pmp {
                pmp = p;
                vmp = v;
                imp = i;
            }
        }

        let denom = isc * voc;
        let fill_factor = if denom == 0.0 { f64::NAN } else { pmp / denom };

        if non_converged > 0 {
            warn!("({:p}) PvCell::sweep: {} of {} samples did not converge", self, non_converged, voltages.len());
        }
        debug!("PvCell::sweep(isc={}, voc={}) -> vmp={} imp={} pmp={} ff={}", isc, voc, vmp, imp, pmp, fill_factor);

        IvCurve { voltages, currents, vmp, imp, pmp, fill_factor, isc, voc, non_converged }
    }

    pub fn efficiency(&self, curve: &IvCurve, insolation: f64) -> f64 {
        curve.efficiency(self.area, insolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvcell::{BasicParams, PvCellSolver};

    fn cell() -> PvCell {
        PvCell::new(&BasicParams {
            voc_stc: 0.6,
            isc_stc: 6.0,
            dvoc_dt: -0.002,
            disc_dt: 0.003,
            area: 0.01,
            n_ideal: 1.0,
            series_r: 0.01,
        }).unwrap()
    }

    #[test]
    fn sweep_shape() {
        let curve = cell().sweep(1000.0).unwrap();
        assert_eq!(curve.len(), SWEEP_STEPS + 1);
        assert_eq!(curve.currents.len(), SWEEP_STEPS + 1);
        assert_eq!(curve.voltages[0], 0.0);
        assert!((curve.voltages[SWEEP_STEPS] - 0.6).abs() < 1e-12);
        assert_eq!(curve.non_converged, 0);
    }

    #[test]
    fn mpp_is_the_largest_power_sample() {
        let curve = cell().sweep(1000.0).unwrap();
        let powers = curve.powers();
        let best = powers.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(curve.pmp, best);
        let k = powers.iter().position(|&p| p == best).unwrap();
        assert_eq!(curve.vmp, curve.voltages[k]);
        assert_eq!(curve.imp, curve.currents[k]);
    }

    #[test]
    fn custom_resolution() {
        let curve = cell().sweep_with_steps(1000.0, 10).unwrap();
        assert_eq!(curve.len(), 11);
        assert!(cell().sweep_with_steps(1000.0, 0).is_err());
    }

    #[test]
    fn dark_cell_has_undefined_fill_factor() {
        let curve = cell().sweep(0.0).unwrap();
        assert_eq!(curve.isc, 0.0);
        assert!(curve.fill_factor.is_nan());
        assert_eq!(curve.pmp, 0.0);
        assert!(matches!(curve.checked_fill_factor(), Err(Error::DegenerateRatio { .. })));
    }

    #[test]
    fn efficiency_uses_area() {
        let c = cell();
        let curve = c.sweep(1000.0).unwrap();
        let eta = c.efficiency(&curve, 1000.0);
        assert!((eta - curve.pmp / 10.0).abs() < 1e-12);
        assert!(curve.efficiency(0.0, 1000.0).is_nan());
    }

    #[test]
    fn truncated_solver_counts_non_converged_samples() {
        let c = cell().with_solver(PvCellSolver { max_iter: 5, ..PvCellSolver::default() });
        let curve = c.sweep(1000.0).unwrap();
        assert!(curve.non_converged > 0);
        assert_eq!(curve.len(), SWEEP_STEPS + 1);
        assert!(curve.currents.iter().all(|i| i.is_finite()));
    }
}
