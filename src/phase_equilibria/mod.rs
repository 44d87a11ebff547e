use ndarray::Array1;
use std::fmt;

mod bubble_dew;
mod lle;
mod root;
mod tp_flash;
mod vle;

pub use lle::{LiquidLiquidOutcome, LleSolver};
pub use vle::{FlashSpec, VleSolver};

/// Maximum absolute mole-fraction deviation below which two phase
/// compositions are considered identical.
pub(crate) const IDENTICAL_COMPOSITION: f64 = 1e-5;

/// The scalar degree of freedom handed to the bubble/dew solver; the paired
/// unknown is iterated.
#[derive(Copy, Clone, Debug)]
pub enum TemperatureOrPressure {
    /// Temperature in K; the solver iterates the pressure.
    Temperature(f64),
    /// Pressure in Pa; the solver iterates the temperature.
    Pressure(f64),
}

/// A converged two-phase equilibrium state.
///
/// Immutable snapshot: the composition arrays are owned and do not alias any
/// solver-internal state.
#[derive(Clone, Debug)]
pub struct PhaseEquilibrium {
    temperature: f64,
    pressure: f64,
    liquid_molefracs: Array1<f64>,
    vapor_molefracs: Array1<f64>,
    vapor_fraction: f64,
}

impl PhaseEquilibrium {
    pub(crate) fn new(
        temperature: f64,
        pressure: f64,
        liquid_molefracs: Array1<f64>,
        vapor_molefracs: Array1<f64>,
        vapor_fraction: f64,
    ) -> Self {
        Self {
            temperature,
            pressure,
            liquid_molefracs,
            vapor_molefracs,
            vapor_fraction,
        }
    }

    /// Temperature in K.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Pressure in Pa.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn liquid_molefracs(&self) -> &Array1<f64> {
        &self.liquid_molefracs
    }

    pub fn vapor_molefracs(&self) -> &Array1<f64> {
        &self.vapor_molefracs
    }

    /// Molar vapor fraction; 0 at a bubble point, 1 at a dew point.
    pub fn vapor_fraction(&self) -> f64 {
        self.vapor_fraction
    }

    /// Check whether two compositions coincide within
    /// [IDENTICAL_COMPOSITION].
    pub(crate) fn is_identical_composition(x1: &Array1<f64>, x2: &Array1<f64>) -> bool {
        x1.iter()
            .zip(x2.iter())
            .fold(0.0, |acc: f64, (&a, &b)| acc.max((a - b).abs()))
            < IDENTICAL_COMPOSITION
    }
}

impl fmt::Display for PhaseEquilibrium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "T = {:.5} K, p = {:.5} Pa, V = {:.5}",
            self.temperature, self.pressure, self.vapor_fraction
        )?;
        writeln!(f, "vapor:  {:.8}", self.vapor_molefracs)?;
        write!(f, "liquid: {:.8}", self.liquid_molefracs)
    }
}
