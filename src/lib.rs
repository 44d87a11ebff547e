#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

//! Multi-phase equilibrium solvers for mixtures of chemical species.
//!
//! The crate combines pluggable non-ideality models (activity coefficients,
//! fugacity coefficients, Poynting corrections) with pure-component property
//! evaluators into a γ-φ fugacity formulation and solves for bubble/dew
//! points, vapor-liquid flashes with various specifications, and
//! liquid-liquid phase splits.

/// Print messages with level `Verbosity::Iter` or higher.
#[macro_export]
macro_rules! log_iter {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::Verbosity::Iter {
            println!($($arg)*);
        }
    }
}

/// Print messages with level `Verbosity::Result` or higher.
#[macro_export]
macro_rules! log_result {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::Verbosity::Result {
            println!($($arg)*);
        }
    }
}

mod components;
mod errors;
mod fugacity;
pub mod models;
mod phase_equilibria;
pub mod properties;
mod state;

pub use components::ComponentSet;
pub use errors::{PhaseqError, PhaseqResult};
pub use fugacity::FugacityEngine;
pub use phase_equilibria::{
    FlashSpec, LiquidLiquidOutcome, LleSolver, PhaseEquilibrium, TemperatureOrPressure, VleSolver,
};
pub use state::{MaterialIndexer, Phase, ThermalCondition};

/// Level of detail in the iteration output.
#[derive(Copy, Clone, PartialOrd, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Do not print output.
    #[default]
    None,
    /// Print information about the success or failure of the iteration.
    Result,
    /// Print a detailed output for every iteration.
    Iter,
}

/// Options for the various phase equilibria solvers.
///
/// If the values are [None], solver specific default
/// values are used.
#[derive(Copy, Clone, Default)]
pub struct SolverOptions {
    /// Maximum number of iterations.
    pub max_iter: Option<usize>,
    /// Tolerance.
    pub tol: Option<f64>,
    /// Iteration output indicated by the [Verbosity] enum.
    pub verbosity: Verbosity,
}

impl From<(Option<usize>, Option<f64>, Option<Verbosity>)> for SolverOptions {
    fn from(options: (Option<usize>, Option<f64>, Option<Verbosity>)) -> Self {
        Self {
            max_iter: options.0,
            tol: options.1,
            verbosity: options.2.unwrap_or(Verbosity::None),
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn unwrap_or(self, max_iter: usize, tol: f64) -> (usize, f64, Verbosity) {
        (
            self.max_iter.unwrap_or(max_iter),
            self.tol.unwrap_or(tol),
            self.verbosity,
        )
    }
}

/// Universal gas constant in J/(mol K).
pub const RGAS: f64 = 8.31446261815324;
