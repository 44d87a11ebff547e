use crate::errors::{PhaseqError, PhaseqResult};
use crate::models::{CachedCorrection, CorrectionModel};
use crate::properties::PropertyPackage;
use crate::state::validate_molefracs;
use ndarray::Array1;
use std::sync::Arc;

/// Combines raw vapor pressures with activity, fugacity, and Poynting
/// corrections into per-component fugacities.
///
/// Liquid: `f_i = x_i γ_i(x,T,P) Psat_i(T) Poynting_i(x,T,P)`.
/// Vapor: `f_i = y_i φ_i(y,T,P) P`.
///
/// The engine is a pure function of its inputs; the wrapped models cache
/// their last evaluation point behind an explicit bit-exact key.
pub struct FugacityEngine<P> {
    properties: Arc<P>,
    activity: CachedCorrection,
    fugacity: CachedCorrection,
    poynting: CachedCorrection,
}

impl<P: PropertyPackage> FugacityEngine<P> {
    pub fn new(
        properties: Arc<P>,
        activity: Box<dyn CorrectionModel>,
        fugacity: Box<dyn CorrectionModel>,
        poynting: Box<dyn CorrectionModel>,
    ) -> PhaseqResult<Self> {
        let n = properties.components();
        for model in [&activity, &fugacity, &poynting] {
            if model.components() != n {
                return Err(PhaseqError::IncompatibleComponents(
                    n,
                    model.components(),
                ));
            }
        }
        Ok(Self {
            properties,
            activity: CachedCorrection::new(activity),
            fugacity: CachedCorrection::new(fugacity),
            poynting: CachedCorrection::new(poynting),
        })
    }

    /// Engine with all corrections set to their ideal (unit) variants.
    pub fn ideal(properties: Arc<P>) -> Self {
        let n = properties.components();
        Self {
            properties,
            activity: CachedCorrection::ideal(n),
            fugacity: CachedCorrection::ideal(n),
            poynting: CachedCorrection::ideal(n),
        }
    }

    pub fn components(&self) -> usize {
        self.properties.components()
    }

    pub fn properties(&self) -> &Arc<P> {
        &self.properties
    }

    /// Activity coefficients of the liquid at the given state.
    pub fn activity(
        &self,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        self.activity.evaluate(molefracs, temperature, pressure)
    }

    /// Per-component liquid fugacities.
    pub fn liquid_fugacity(
        &self,
        liquid_molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        validate_molefracs(liquid_molefracs, self.components())?;
        Ok(liquid_molefracs
            * &self.liquid_standard_fugacity(liquid_molefracs, temperature, pressure)?)
    }

    /// Per-component vapor fugacities.
    pub fn gas_fugacity(
        &self,
        vapor_molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        validate_molefracs(vapor_molefracs, self.components())?;
        let phi = self
            .fugacity
            .evaluate(vapor_molefracs, temperature, pressure)?;
        Ok(vapor_molefracs * &(phi * pressure))
    }

    /// `γ_i Psat_i Poynting_i`, the liquid fugacity per unit mole fraction.
    pub(crate) fn liquid_standard_fugacity(
        &self,
        liquid_molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        let psat = self.properties.vapor_pressure(temperature)?;
        if let Some(bad) = psat.iter().find(|&&p| !p.is_finite() || p <= 0.0) {
            return Err(PhaseqError::ModelEvaluation {
                model: "vapor pressure".to_owned(),
                reason: format!("returned a non-finite or non-positive pressure {bad}"),
            });
        }
        let gamma = self
            .activity
            .evaluate(liquid_molefracs, temperature, pressure)?;
        let poynting = self
            .poynting
            .evaluate(liquid_molefracs, temperature, pressure)?;
        Ok(gamma * psat * poynting)
    }

    /// Equilibrium ratios `K_i = γ_i Psat_i Poynting_i / (φ_i P)` evaluated
    /// at the given pair of phase compositions.
    pub(crate) fn k_values(
        &self,
        liquid_molefracs: &Array1<f64>,
        vapor_molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        let liquid = self.liquid_standard_fugacity(liquid_molefracs, temperature, pressure)?;
        let phi = self
            .fugacity
            .evaluate(vapor_molefracs, temperature, pressure)?;
        Ok(liquid / (phi * pressure))
    }
}
