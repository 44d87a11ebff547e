//! Pure-component and mixture property evaluators consumed by the solvers.
//!
//! The equilibrium engine treats properties as black boxes behind the
//! [PropertyPackage] trait: vapor pressures drive the fugacity formulation,
//! enthalpies/entropies drive the energy-balance flashes. [IdealMixture]
//! provides a reference implementation built from Clausius-Clapeyron
//! correlations with constant heat capacities.

use crate::errors::{PhaseqError, PhaseqResult};
use crate::state::Phase;
use crate::RGAS;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Reference temperature for enthalpy and entropy departures in K.
const T0: f64 = 298.15;
/// Reference pressure for the ideal-gas entropy in Pa.
const P0: f64 = 101325.0;

const MAX_ITER_TSAT: usize = 200;
const TOL_TSAT: f64 = 1e-12;

/// Mixture-property evaluator used by the equilibrium solvers.
///
/// Implementations must be deterministic functions of their inputs.
pub trait PropertyPackage {
    /// Number of components the package is parameterized for.
    fn components(&self) -> usize;

    /// Pure-component saturation pressures at the given temperature.
    fn vapor_pressure(&self, temperature: f64) -> PhaseqResult<Array1<f64>>;

    /// Validity window of the underlying correlations, used to bracket
    /// temperature iterations.
    fn temperature_limits(&self) -> (f64, f64);

    /// Temperature at which the pure component `i` has the given saturation
    /// pressure.
    ///
    /// The default implementation bisects [Self::vapor_pressure] over the
    /// correlation window; packages with invertible correlations should
    /// override it.
    fn saturation_temperature(&self, i: usize, pressure: f64) -> PhaseqResult<f64> {
        let (mut t_lo, mut t_hi) = self.temperature_limits();
        let p_lo = self.vapor_pressure(t_lo)?[i];
        let p_hi = self.vapor_pressure(t_hi)?[i];
        if pressure < p_lo || pressure > p_hi {
            return Err(PhaseqError::InfeasibleSpecification(format!(
                "saturation pressure {pressure} Pa of component {i} lies outside \
                 the correlation window [{p_lo}, {p_hi}] Pa"
            )));
        }
        let mut t = 0.5 * (t_lo + t_hi);
        for _ in 0..MAX_ITER_TSAT {
            if self.vapor_pressure(t)?[i] > pressure {
                t_hi = t;
            } else {
                t_lo = t;
            }
            let t_new = 0.5 * (t_lo + t_hi);
            if (t_new - t).abs() < TOL_TSAT * t_new {
                return Ok(t_new);
            }
            t = t_new;
        }
        Ok(t)
    }

    /// Molar enthalpy of a phase in J/mol.
    fn molar_enthalpy(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<f64>;

    /// Molar isobaric heat capacity of a phase in J/(mol K).
    fn molar_heat_capacity(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<f64>;

    /// Molar entropy of a phase in J/(mol K).
    fn molar_entropy(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<f64>;
}

/// Two-parameter Clausius-Clapeyron vapor pressure correlation.
///
/// `ln(p/p_ref) = -Δh_vap/R (1/T - 1/T_ref)`
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ClausiusClapeyron {
    /// Reference temperature in K.
    pub reference_temperature: f64,
    /// Saturation pressure at the reference temperature in Pa.
    pub reference_pressure: f64,
    /// Enthalpy of vaporization in J/mol, assumed constant.
    pub vaporization_enthalpy: f64,
}

impl ClausiusClapeyron {
    pub fn vapor_pressure(&self, temperature: f64) -> f64 {
        self.reference_pressure
            * (-self.vaporization_enthalpy / RGAS
                * (temperature.recip() - self.reference_temperature.recip()))
            .exp()
    }

    /// Closed-form inverse of [Self::vapor_pressure].
    pub fn saturation_temperature(&self, pressure: f64) -> f64 {
        (self.reference_temperature.recip()
            - RGAS / self.vaporization_enthalpy * (pressure / self.reference_pressure).ln())
        .recip()
    }
}

/// Pure-component record for the [IdealMixture] property package.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PureParameters {
    pub saturation: ClausiusClapeyron,
    /// Liquid isobaric heat capacity in J/(mol K).
    pub liquid_heat_capacity: f64,
    /// Vapor isobaric heat capacity in J/(mol K).
    pub vapor_heat_capacity: f64,
    /// Liquid molar volume in m³/mol.
    pub liquid_molar_volume: f64,
}

/// Property package for an ideal mixture of components with
/// Clausius-Clapeyron vapor pressures and constant heat capacities.
///
/// Liquid enthalpies follow the liquid heat capacity from the reference
/// state; vapor enthalpies vaporize at the correlation reference temperature
/// and follow the vapor heat capacity from there.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdealMixture(Vec<PureParameters>);

impl IdealMixture {
    pub fn new(records: Vec<PureParameters>) -> PhaseqResult<Self> {
        if records.is_empty() {
            return Err(PhaseqError::Configuration(
                "property package requires at least one component".into(),
            ));
        }
        Ok(Self(records))
    }

    pub fn from_json(json: &str) -> PhaseqResult<Self> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Liquid molar volumes, e.g. to parameterize a Poynting correction.
    pub fn liquid_molar_volumes(&self) -> Array1<f64> {
        self.0.iter().map(|r| r.liquid_molar_volume).collect()
    }

    fn pure_molar_enthalpy(&self, phase: Phase, i: usize, temperature: f64) -> f64 {
        let record = &self.0[i];
        let t_ref = record.saturation.reference_temperature;
        match phase {
            Phase::Vapor => {
                record.liquid_heat_capacity * (t_ref - T0)
                    + record.saturation.vaporization_enthalpy
                    + record.vapor_heat_capacity * (temperature - t_ref)
            }
            _ => record.liquid_heat_capacity * (temperature - T0),
        }
    }

    fn pure_molar_entropy(&self, phase: Phase, i: usize, temperature: f64, pressure: f64) -> f64 {
        let record = &self.0[i];
        let t_ref = record.saturation.reference_temperature;
        match phase {
            Phase::Vapor => {
                record.liquid_heat_capacity * (t_ref / T0).ln()
                    + record.saturation.vaporization_enthalpy / t_ref
                    + record.vapor_heat_capacity * (temperature / t_ref).ln()
                    - RGAS * (pressure / P0).ln()
            }
            _ => record.liquid_heat_capacity * (temperature / T0).ln(),
        }
    }
}

impl PropertyPackage for IdealMixture {
    fn components(&self) -> usize {
        self.0.len()
    }

    fn vapor_pressure(&self, temperature: f64) -> PhaseqResult<Array1<f64>> {
        Ok(self
            .0
            .iter()
            .map(|r| r.saturation.vapor_pressure(temperature))
            .collect())
    }

    fn temperature_limits(&self) -> (f64, f64) {
        // constant-Δh Clausius-Clapeyron extrapolates reasonably over a
        // generous window around the reference temperatures
        let t_ref_min = self
            .0
            .iter()
            .map(|r| r.saturation.reference_temperature)
            .fold(f64::INFINITY, f64::min);
        let t_ref_max = self
            .0
            .iter()
            .map(|r| r.saturation.reference_temperature)
            .fold(0.0, f64::max);
        (0.4 * t_ref_min, 2.5 * t_ref_max)
    }

    fn saturation_temperature(&self, i: usize, pressure: f64) -> PhaseqResult<f64> {
        let t = self.0[i].saturation.saturation_temperature(pressure);
        let (t_min, t_max) = self.temperature_limits();
        if !t.is_finite() || !(t_min..=t_max).contains(&t) {
            return Err(PhaseqError::InfeasibleSpecification(format!(
                "component {i} does not reach a saturation pressure of {pressure} Pa \
                 within the correlation window [{t_min:.1}, {t_max:.1}] K"
            )));
        }
        Ok(t)
    }

    fn molar_enthalpy(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        _pressure: f64,
    ) -> PhaseqResult<f64> {
        Ok(molefracs
            .iter()
            .enumerate()
            .map(|(i, x)| x * self.pure_molar_enthalpy(phase, i, temperature))
            .sum())
    }

    fn molar_heat_capacity(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        _temperature: f64,
        _pressure: f64,
    ) -> PhaseqResult<f64> {
        Ok(molefracs
            .iter()
            .zip(&self.0)
            .map(|(x, r)| {
                x * match phase {
                    Phase::Vapor => r.vapor_heat_capacity,
                    _ => r.liquid_heat_capacity,
                }
            })
            .sum())
    }

    fn molar_entropy(
        &self,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<f64> {
        // ideal mixing entropy on top of the pure-component contributions
        let mixing: f64 = molefracs
            .iter()
            .filter(|&&x| x > 0.0)
            .map(|&x| x * x.ln())
            .sum();
        Ok(molefracs
            .iter()
            .enumerate()
            .map(|(i, x)| x * self.pure_molar_entropy(phase, i, temperature, pressure))
            .sum::<f64>()
            - RGAS * mixing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn package() -> IdealMixture {
        IdealMixture::from_json(
            r#"[
                {
                    "saturation": {
                        "reference_temperature": 350.0,
                        "reference_pressure": 50000.0,
                        "vaporization_enthalpy": 35000.0
                    },
                    "liquid_heat_capacity": 130.0,
                    "vapor_heat_capacity": 90.0,
                    "liquid_molar_volume": 9.5e-5
                },
                {
                    "saturation": {
                        "reference_temperature": 350.0,
                        "reference_pressure": 80000.0,
                        "vaporization_enthalpy": 32000.0
                    },
                    "liquid_heat_capacity": 120.0,
                    "vapor_heat_capacity": 85.0,
                    "liquid_molar_volume": 8.9e-5
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn vapor_pressure_at_reference() -> PhaseqResult<()> {
        let package = package();
        let psat = package.vapor_pressure(350.0)?;
        assert_relative_eq!(psat[0], 50000.0, max_relative = 1e-12);
        assert_relative_eq!(psat[1], 80000.0, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn saturation_temperature_inverts_vapor_pressure() -> PhaseqResult<()> {
        let package = package();
        let t = package.saturation_temperature(0, 65000.0)?;
        let psat = package.vapor_pressure(t)?;
        assert_relative_eq!(psat[0], 65000.0, max_relative = 1e-10);
        Ok(())
    }

    #[test]
    fn default_bisection_matches_closed_form() -> PhaseqResult<()> {
        // route the default trait implementation through vapor_pressure only
        struct Opaque(IdealMixture);
        impl PropertyPackage for Opaque {
            fn components(&self) -> usize {
                self.0.components()
            }
            fn vapor_pressure(&self, t: f64) -> PhaseqResult<Array1<f64>> {
                self.0.vapor_pressure(t)
            }
            fn temperature_limits(&self) -> (f64, f64) {
                self.0.temperature_limits()
            }
            fn molar_enthalpy(
                &self,
                phase: Phase,
                x: &Array1<f64>,
                t: f64,
                p: f64,
            ) -> PhaseqResult<f64> {
                self.0.molar_enthalpy(phase, x, t, p)
            }
            fn molar_heat_capacity(
                &self,
                phase: Phase,
                x: &Array1<f64>,
                t: f64,
                p: f64,
            ) -> PhaseqResult<f64> {
                self.0.molar_heat_capacity(phase, x, t, p)
            }
            fn molar_entropy(
                &self,
                phase: Phase,
                x: &Array1<f64>,
                t: f64,
                p: f64,
            ) -> PhaseqResult<f64> {
                self.0.molar_entropy(phase, x, t, p)
            }
        }
        let package = package();
        let opaque = Opaque(package.clone());
        let exact = package.saturation_temperature(1, 101325.0)?;
        let bisected = opaque.saturation_temperature(1, 101325.0)?;
        assert_relative_eq!(exact, bisected, max_relative = 1e-9);
        Ok(())
    }

    #[test]
    fn vaporization_raises_enthalpy() -> PhaseqResult<()> {
        let package = package();
        let x = arr1(&[0.5, 0.5]);
        let h_liquid = package.molar_enthalpy(Phase::Liquid, &x, 350.0, 1e5)?;
        let h_vapor = package.molar_enthalpy(Phase::Vapor, &x, 350.0, 1e5)?;
        assert!(h_vapor > h_liquid + 30000.0);
        Ok(())
    }
}
