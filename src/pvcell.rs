use crate::{Error, Result, BOLTZMANN_K, C_IN_KELVIN, ELECTRON_CHARGE_Q, STC_INSOLATION, STC_TEMP};
use std::fmt;
use tracing::{error, trace, warn};

/// Upper bound on the diode exponent argument. Keeps the dark current finite.
pub const EXP_ARG_MAX: f64 = 500.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PvCellSolver {
    pub max_iter: usize, // max number of iterations per voltage sample
    pub tol_i: f64,      // [A] current tolerance
    pub damping: f64,    // [-] weight of the new estimate in each update
}

impl Default for PvCellSolver {
    fn default() -> Self {
        PvCellSolver { max_iter: 2000, tol_i: 1e-6, damping: 0.05 }
    }
}

impl PvCellSolver {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(Error::invalid("max_iter", 0.0));
        }
        if !(self.tol_i.is_finite() && self.tol_i > 0.0) {
            return Err(Error::invalid("tol_i", self.tol_i));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(Error::invalid("damping", self.damping));
        }
        Ok(())
    }
}

/// Operating point of a cell at a given insolation and temperature.
#[derive(Clone, Debug, PartialEq)]
pub struct CellState {
    pub temp_k: f64, // [K]
    pub voc: f64,    // [V] adjusted open-circuit voltage
    pub isc: f64,    // [A] adjusted short-circuit current
    pub i0: f64,     // [A] reverse saturation current
    pub n_vt: f64,   // [V] n*k*T/q
}

/// Outcome of solving the implicit diode equation at one voltage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    pub v: f64,
    pub i: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Solution {
    /// Turns a solve that hit the iteration cap (or went non-finite) into an error.
    pub fn into_result(self) -> Result<f64> {
        if self.converged {
            Ok(self.i)
        } else {
            Err(Error::NonConvergence { v: self.v, iterations: self.iterations, i: self.i })
        }
    }
}

/// Cell ratings at standard test conditions.
#[derive(Clone, Debug)]
pub struct BasicParams {
    pub voc_stc: f64,  // [V]
    pub isc_stc: f64,  // [A]
    pub dvoc_dt: f64,  // [V/°C]
    pub disc_dt: f64,  // [A/°C]
    pub area: f64,     // [m^2]
    pub n_ideal: f64,  // [-] 1.0 = ideal diode
    pub series_r: f64, // [Ohm] ~10 mOhm for a silicon cell
}

#[derive(Clone, PartialEq)]
pub struct PvCell {
    pub voc_stc: f64,
    pub isc_stc: f64,
    pub dvoc_dt: f64,
    pub disc_dt: f64,
    pub temperature: f64, // [°C] cell temperature
    pub area: f64,
    pub n_ideal: f64,
    pub series_r: f64,
    pub solver: PvCellSolver,
}

impl PvCell {
    pub fn new(params: &BasicParams) -> Result<Self> {
        let cell = PvCell {
            voc_stc: params.voc_stc, isc_stc: params.isc_stc, dvoc_dt: params.dvoc_dt,
            disc_dt: params.disc_dt, area: params.area, n_ideal: params.n_ideal,
            series_r: params.series_r,
            temperature: STC_TEMP,
            solver: PvCellSolver::default(),
        };
        cell.validate()?;
        Ok(cell)
    }

    /// builders
    pub fn with_temperature(mut self, celsius: f64) -> Self { self.temperature = celsius; self }
    pub fn with_solver(mut self, settings: PvCellSolver) -> Self { self.solver = settings; self }

    pub fn set_temperature(&mut self, celsius: f64) {
        self.temperature = celsius;
    }

    /// Checks the parameter invariants. Fields are public, so every state
    /// computation re-runs this.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("voc_stc", self.voc_stc),
            ("isc_stc", self.isc_stc),
            ("dvoc_dt", self.dvoc_dt),
            ("disc_dt", self.disc_dt),
            ("area", self.area),
            ("n_ideal", self.n_ideal),
            ("series_r", self.series_r),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, x)| !x.is_finite()) {
            return Err(Error::invalid(name, *value));
        }
        if self.n_ideal < 1.0 {
            return Err(Error::invalid("n_ideal", self.n_ideal));
        }
        if self.series_r < 0.0 {
            return Err(Error::invalid("series_r", self.series_r));
        }
        if self.area <= 0.0 {
            return Err(Error::invalid("area", self.area));
        }
        if self.isc_stc < 0.0 {
            return Err(Error::invalid("isc_stc", self.isc_stc));
        }
        self.solver.validate()
    }

    pub fn temp_k(&self) -> f64 {
        self.temperature + C_IN_KELVIN
    }

    /// Open-circuit voltage. Insolation is not taken into account yet; only
    /// the temperature correction applies.
    pub fn voc(&self, insolation: f64) -> f64 {
        self.voc_at(insolation, self.temperature)
    }

    pub fn isc(&self, insolation: f64) -> f64 {
        self.isc_at(insolation, self.temperature)
    }

    /// Reverse saturation current, from requiring I = 0 at V = Voc.
    pub fn i0(&self, insolation: f64) -> Result<f64> {
        Ok(self.state(insolation)?.i0)
    }

    fn voc_at(&self, _insolation: f64, cell_temp: f64) -> f64 {
        // TODO: insolation correction (logarithmic in G) once a product decision is made
        self.voc_stc + (cell_temp - STC_TEMP) * self.dvoc_dt
    }

    fn isc_at(&self, insolation: f64, cell_temp: f64) -> f64 {
        insolation / STC_INSOLATION * (self.isc_stc + (cell_temp - STC_TEMP) * self.disc_dt)
    }

    /// Operating point at the stored cell temperature.
    pub fn state(&self, insolation: f64) -> Result<CellState> {
        self.compute_state(insolation, self.temperature)
    }

    /// Operating point as a pure function of insolation [W/m^2] and cell temperature [°C].
    pub fn compute_state(&self, insolation: f64, cell_temp: f64) -> Result<CellState> {
        self.validate()?;
        if !(insolation.is_finite() && insolation >= 0.0) {
            return Err(Error::invalid("insolation", insolation));
        }
        if !cell_temp.is_finite() {
            return Err(Error::invalid("temperature", cell_temp));
        }
        let temp_k = cell_temp + C_IN_KELVIN;
        if temp_k <= 0.0 {
            return Err(Error::invalid("temperature", cell_temp));
        }
        let voc = self.voc_at(insolation, cell_temp);
        if voc <= 0.0 {
            return Err(Error::invalid("voc", voc));
        }
        let isc = self.isc_at(insolation, cell_temp);
        let n_vt = self.n_ideal * BOLTZMANN_K * temp_k / ELECTRON_CHARGE_Q;
        let i0 = isc / ((voc / n_vt).exp() - 1.0);
        if !i0.is_finite() {
            return Err(Error::invalid("i0", i0));
        }
        Ok(CellState { temp_k, voc, isc, i0, n_vt })
    }

    /// Solves I = Isc - I0*(exp((v + I*Rs)/(n*Vt)) - 1) by damped fixed-point iteration.
    pub fn solve_i(&self, state: &CellState, v: f64) -> Solution {
        let damping = self.solver.damping;
        let mut i_prev: f64 = 0.0;
        let mut i_curr: f64 = 0.0;
        let mut iterations: usize = 0;
        let mut converged = false;

        for j in 0..self.solver.max_iter {
            iterations = j + 1;
            let v_drop = i_prev * self.series_r;
            let i_dark = state.i0 * (clamp_exp_arg((v + v_drop) / state.n_vt).exp() - 1.0);
            i_curr = state.isc - i_dark;
            if !i_curr.is_finite() {
                break;
            }
            if (i_curr - i_prev).abs() < self.solver.tol_i {
                converged = true;
                break;
            }
            i_prev = (1.0 - damping) * i_prev + damping * i_curr;
        }

        if converged {
            trace!("PvCell::solve_i(v={:e}) converged in {} iterations -> (i={})", v, iterations, i_curr);
        } else if i_curr.is_finite() {
            warn!("({:p}) PvCell::solve_i(v={:e}) did not converge (tol={:e}, max_iter={}) -> (i={})",
                self, v, self.solver.tol_i, self.solver.max_iter, i_curr);
        } else {
            error!("({:p}) PvCell::solve_i(v={:e}) produced a non-finite current after {} iterations -> (i={})",
                self, v, iterations, i_curr);
        }
        Solution { v, i: i_curr, iterations, converged }
    }

    /// Solves each voltage independently, each starting from I = 0.
    pub fn solve_iv(&self, state: &CellState, voltages: &[f64]) -> Vec<Solution> {
        voltages.iter().map(|&v| self.solve_i(state, v)).collect()
    }

    /// Currents for an ordered set of voltages, index-aligned with the input.
    pub fn is_from_vs(&self, insolation: f64, voltages: &[f64]) -> Result<Vec<f64>> {
        let state = self.state(insolation)?;
        Ok(self.solve_iv(&state, voltages).iter().map(|s| s.i).collect())
    }

    pub fn i_from_v(&self, insolation: f64, v: f64) -> Result<f64> {
        let currents = self.is_from_vs(insolation, &[v])?;
        Ok(currents[0])
    }
}

// Clamps from above only, and lets NaN through.
fn clamp_exp_arg(x: f64) -> f64 {
    if x > EXP_ARG_MAX { EXP_ARG_MAX } else { x }
}

impl fmt::Debug for PvCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PvCell {{voc_stc: {}, isc_stc: {}, t: {}, n: {}, rs: {}}}",
            self.voc_stc, self.isc_stc, self.temperature, self.n_ideal, self.series_r)
    }
}
