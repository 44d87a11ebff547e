use crate::components::ComponentSet;
use crate::errors::{PhaseqError, PhaseqResult};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tolerance for the sum of a mole fraction vector.
const MOLEFRAC_SUM_TOL: f64 = 1e-8;

/// Phase labels used to key the [MaterialIndexer].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Vapor,
    Liquid,
    Liquid1,
    Liquid2,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Vapor => write!(f, "vapor"),
            Phase::Liquid => write!(f, "liquid"),
            Phase::Liquid1 => write!(f, "liquid 1"),
            Phase::Liquid2 => write!(f, "liquid 2"),
        }
    }
}

/// Temperature and pressure of a material.
///
/// Owned by the caller and updated in place by the solvers on every
/// successful solve, so post-solve conditions are visible without
/// re-querying. Both values are strictly positive at all times.
#[derive(Clone, Debug, PartialEq)]
pub struct ThermalCondition {
    temperature: f64,
    pressure: f64,
}

impl ThermalCondition {
    /// Create a condition from an absolute temperature in K and an absolute
    /// pressure in Pa.
    pub fn new(temperature: f64, pressure: f64) -> PhaseqResult<Self> {
        let mut condition = Self {
            temperature: 1.0,
            pressure: 1.0,
        };
        condition.set_temperature(temperature)?;
        condition.set_pressure(pressure)?;
        Ok(condition)
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn set_temperature(&mut self, temperature: f64) -> PhaseqResult<()> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(PhaseqError::Configuration(format!(
                "temperature must be positive and finite, got {temperature}"
            )));
        }
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_pressure(&mut self, pressure: f64) -> PhaseqResult<()> {
        if !pressure.is_finite() || pressure <= 0.0 {
            return Err(PhaseqError::Configuration(format!(
                "pressure must be positive and finite, got {pressure}"
            )));
        }
        self.pressure = pressure;
        Ok(())
    }
}

/// Phase- and component-keyed storage of molar amounts.
///
/// The equilibrium solvers read and overwrite the entries for exactly the
/// phases they are configured over; they never create or remove phases.
#[derive(Clone, Debug)]
pub struct MaterialIndexer {
    components: Arc<ComponentSet>,
    phases: IndexMap<Phase, Array1<f64>>,
}

impl MaterialIndexer {
    /// Create an indexer with zero amounts for the given phases.
    pub fn new(components: &Arc<ComponentSet>, phases: &[Phase]) -> PhaseqResult<Self> {
        let mut map = IndexMap::with_capacity(phases.len());
        for &phase in phases {
            if map
                .insert(phase, Array1::zeros(components.len()))
                .is_some()
            {
                return Err(PhaseqError::Configuration(format!(
                    "phase `{phase}` listed twice"
                )));
            }
        }
        Ok(Self {
            components: components.clone(),
            phases: map,
        })
    }

    pub fn components(&self) -> &Arc<ComponentSet> {
        &self.components
    }

    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.phases.keys().copied()
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.phases.contains_key(&phase)
    }

    /// Molar amounts of the given phase.
    pub fn amounts(&self, phase: Phase) -> PhaseqResult<&Array1<f64>> {
        self.phases.get(&phase).ok_or_else(|| {
            PhaseqError::Configuration(format!("material holds no `{phase}` phase"))
        })
    }

    /// Overwrite the molar amounts of the given phase.
    pub fn set_amounts(&mut self, phase: Phase, amounts: Array1<f64>) -> PhaseqResult<()> {
        validate_amounts(&amounts, self.components.len())?;
        match self.phases.get_mut(&phase) {
            Some(entry) => {
                *entry = amounts;
                Ok(())
            }
            None => Err(PhaseqError::Configuration(format!(
                "material holds no `{phase}` phase"
            ))),
        }
    }

    /// Total molar amount of each component, summed over all phases.
    pub fn total_amounts(&self) -> Array1<f64> {
        let mut total = Array1::zeros(self.components.len());
        for amounts in self.phases.values() {
            total += amounts;
        }
        total
    }

    /// Total moles over all phases and components.
    pub fn total_moles(&self) -> f64 {
        self.phases.values().map(|n| n.sum()).sum()
    }

    /// Mole fractions of the given phase, or [None] if the phase is empty.
    pub fn molefracs(&self, phase: Phase) -> PhaseqResult<Option<Array1<f64>>> {
        let amounts = self.amounts(phase)?;
        let total = amounts.sum();
        Ok((total > 0.0).then(|| amounts / total))
    }
}

/// Check that an amount vector has the right length and no negative entries.
pub(crate) fn validate_amounts(amounts: &Array1<f64>, components: usize) -> PhaseqResult<()> {
    if amounts.len() != components {
        return Err(PhaseqError::IncompatibleComponents(
            components,
            amounts.len(),
        ));
    }
    if amounts.iter().any(|&n| !n.is_finite() || n < 0.0) {
        return Err(PhaseqError::Configuration(format!(
            "amount vector contains negative or non-finite entries: {amounts}"
        )));
    }
    Ok(())
}

/// Check that a fraction vector is a valid composition: correct length,
/// non-negative entries, sum equal to 1 within tolerance.
pub(crate) fn validate_molefracs(molefracs: &Array1<f64>, components: usize) -> PhaseqResult<()> {
    validate_amounts(molefracs, components)?;
    let sum = molefracs.sum();
    if (sum - 1.0).abs() > MOLEFRAC_SUM_TOL {
        return Err(PhaseqError::Configuration(format!(
            "mole fractions sum to {sum} instead of 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn binary() -> Arc<ComponentSet> {
        Arc::new(ComponentSet::new(["pentane", "hexane"]).unwrap())
    }

    #[test]
    fn thermal_condition_rejects_nonpositive() {
        assert!(ThermalCondition::new(-300.0, 1e5).is_err());
        assert!(ThermalCondition::new(300.0, 0.0).is_err());
        assert!(ThermalCondition::new(f64::NAN, 1e5).is_err());
        let mut condition = ThermalCondition::new(300.0, 1e5).unwrap();
        assert!(condition.set_pressure(-1.0).is_err());
        assert_relative_eq!(condition.pressure(), 1e5);
    }

    #[test]
    fn amounts_round_trip() -> PhaseqResult<()> {
        let components = binary();
        let mut material = MaterialIndexer::new(&components, &[Phase::Vapor, Phase::Liquid])?;
        material.set_amounts(Phase::Liquid, arr1(&[2.0, 6.0]))?;
        assert_relative_eq!(material.total_moles(), 8.0);
        let x = material.molefracs(Phase::Liquid)?.unwrap();
        assert_relative_eq!(x[0], 0.25);
        assert!(material.molefracs(Phase::Vapor)?.is_none());
        assert_relative_eq!(material.total_amounts()[1], 6.0);
        Ok(())
    }

    #[test]
    fn unknown_phase_rejected() -> PhaseqResult<()> {
        let components = binary();
        let mut material = MaterialIndexer::new(&components, &[Phase::Liquid1, Phase::Liquid2])?;
        assert!(material.amounts(Phase::Vapor).is_err());
        assert!(material
            .set_amounts(Phase::Vapor, arr1(&[1.0, 1.0]))
            .is_err());
        Ok(())
    }

    #[test]
    fn malformed_amounts_rejected() -> PhaseqResult<()> {
        let components = binary();
        let mut material = MaterialIndexer::new(&components, &[Phase::Liquid])?;
        assert!(material
            .set_amounts(Phase::Liquid, arr1(&[1.0, -0.5]))
            .is_err());
        assert!(matches!(
            material.set_amounts(Phase::Liquid, arr1(&[1.0, 1.0, 1.0])),
            Err(PhaseqError::IncompatibleComponents(2, 3))
        ));
        Ok(())
    }
}
