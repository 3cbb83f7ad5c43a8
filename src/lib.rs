//! Single-diode photovoltaic cell model: temperature and insolation adjusted
//! Voc/Isc, reverse saturation current, implicit I-V solve and power sweep.

mod pvcell;
mod sweep;

pub use pvcell::{BasicParams, CellState, PvCell, PvCellSolver, Solution, EXP_ARG_MAX};
pub use sweep::{IvCurve, SWEEP_STEPS};

pub const STC_TEMP: f64 = 25.0; // [°C] rated temperature
pub const STC_INSOLATION: f64 = 1000.0; // [W/m^2] rated insolation
pub const C_IN_KELVIN: f64 = 273.15;
pub const BOLTZMANN_K: f64 = 1.380649e-23; // [J/K]
pub const ELECTRON_CHARGE_Q: f64 = 1.602176634e-19; // [C]

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: String, value: f64 },
    #[error("solver did not converge at v={v} after {iterations} iterations (last i={i})")]
    NonConvergence { v: f64, iterations: usize, i: f64 },
    #[error("fill factor undefined for isc={isc}, voc={voc}")]
    DegenerateRatio { isc: f64, voc: f64 },
}

impl Error {
    pub(crate) fn invalid(name: &str, value: f64) -> Self {
        Error::InvalidParameter { name: name.to_string(), value }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
