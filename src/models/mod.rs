//! Pluggable non-ideality models.
//!
//! A single trait, [CorrectionModel], covers the three correction roles of
//! the γ-φ formulation: activity coefficients for the liquid, fugacity
//! coefficients for the vapor, and Poynting factors. An ideal variant of
//! each role returns unit vectors.

use crate::errors::{PhaseqError, PhaseqResult};
use ndarray::Array1;
use std::cell::{Cell, RefCell};

mod activity;
mod vapor;
pub use activity::{Nrtl, NrtlRecord};
pub use vapor::{MolarVolumePoynting, VirialFugacity};

/// Per-component correction factors as a function of composition,
/// temperature, and pressure.
///
/// Implementations must be pure functions of their inputs; factors must be
/// finite and positive. Out-of-domain results are reported through
/// [PhaseqError::ModelEvaluation], never clamped.
pub trait CorrectionModel {
    /// Number of components the model is parameterized for.
    fn components(&self) -> usize;

    /// Model name used in error messages and logs.
    fn name(&self) -> &str;

    /// Evaluate the per-component correction factors.
    fn evaluate(
        &self,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>>;
}

/// Ideal variant of every correction role: all factors are unity.
pub struct IdealCorrection(pub usize);

impl CorrectionModel for IdealCorrection {
    fn components(&self) -> usize {
        self.0
    }

    fn name(&self) -> &str {
        "ideal"
    }

    fn evaluate(
        &self,
        molefracs: &Array1<f64>,
        _temperature: f64,
        _pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        Ok(Array1::ones(molefracs.len()))
    }
}

/// Exact evaluation point of a correction model.
///
/// Keys compare bit-for-bit: a cache hit requires the identical (T, P, x)
/// tuple down to the last bit of every entry. Anything else recomputes, so a
/// stale factor can never leak into a neighboring iterate.
#[derive(Clone, PartialEq, Eq)]
struct EvaluationKey {
    temperature: u64,
    pressure: u64,
    molefracs: Vec<u64>,
}

impl EvaluationKey {
    fn new(molefracs: &Array1<f64>, temperature: f64, pressure: f64) -> Self {
        Self {
            temperature: temperature.to_bits(),
            pressure: pressure.to_bits(),
            molefracs: molefracs.iter().map(|x| x.to_bits()).collect(),
        }
    }
}

/// A correction model with an explicit last-evaluation cache.
///
/// Nested solver loops evaluate the same model repeatedly at an unchanged
/// iterate; the cache removes those duplicate calls. The cache is
/// instance-local and not thread-safe, matching the single-threaded solver
/// contract.
pub struct CachedCorrection {
    model: Box<dyn CorrectionModel>,
    last: RefCell<Option<(EvaluationKey, Array1<f64>)>>,
    hit: Cell<u64>,
    miss: Cell<u64>,
}

impl CachedCorrection {
    pub fn new(model: Box<dyn CorrectionModel>) -> Self {
        Self {
            model,
            last: RefCell::new(None),
            hit: Cell::new(0),
            miss: Cell::new(0),
        }
    }

    pub fn ideal(components: usize) -> Self {
        Self::new(Box::new(IdealCorrection(components)))
    }

    pub fn components(&self) -> usize {
        self.model.components()
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// Cache hit and miss counters.
    pub fn cache_statistics(&self) -> (u64, u64) {
        (self.hit.get(), self.miss.get())
    }

    /// Evaluate the wrapped model, reusing the last result if the inputs are
    /// bit-identical, and validate the returned factors.
    pub fn evaluate(
        &self,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        let key = EvaluationKey::new(molefracs, temperature, pressure);
        if let Some((last_key, factors)) = self.last.borrow().as_ref() {
            if *last_key == key {
                self.hit.set(self.hit.get() + 1);
                return Ok(factors.clone());
            }
        }
        self.miss.set(self.miss.get() + 1);
        let factors = self.model.evaluate(molefracs, temperature, pressure)?;
        validate_factors(self.model.name(), molefracs.len(), &factors)?;
        *self.last.borrow_mut() = Some((key, factors.clone()));
        Ok(factors)
    }
}

/// Check a correction-factor vector for the right length and strictly
/// positive, finite entries.
fn validate_factors(model: &str, components: usize, factors: &Array1<f64>) -> PhaseqResult<()> {
    if factors.len() != components {
        return Err(PhaseqError::ModelEvaluation {
            model: model.to_owned(),
            reason: format!(
                "returned {} factors for {} components",
                factors.len(),
                components
            ),
        });
    }
    if let Some(bad) = factors.iter().find(|&&f| !f.is_finite() || f <= 0.0) {
        return Err(PhaseqError::ModelEvaluation {
            model: model.to_owned(),
            reason: format!("returned a non-finite or non-positive factor {bad}"),
        });
    }
    Ok(())
}
