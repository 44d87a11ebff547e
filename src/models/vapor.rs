use super::CorrectionModel;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::properties::ClausiusClapeyron;
use crate::RGAS;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Parameters of the pressure-truncated virial equation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirialRecord {
    /// Second virial coefficients B_ij in m³/mol (symmetric).
    pub b: Vec<Vec<f64>>,
}

/// Vapor fugacity coefficients from the pressure-truncated virial equation.
///
/// `ln φ_i = (2 Σ_j y_j B_ij - B_mix) P / (R T)`
pub struct VirialFugacity {
    b: Array2<f64>,
}

impl VirialFugacity {
    pub fn from_record(record: VirialRecord) -> PhaseqResult<Self> {
        let n = record.b.len();
        if record.b.iter().any(|row| row.len() != n) {
            return Err(PhaseqError::Configuration(
                "virial coefficient matrix is not square".into(),
            ));
        }
        Ok(Self {
            b: Array2::from_shape_fn((n, n), |(i, j)| record.b[i][j]),
        })
    }

    pub fn from_json(json: &str) -> PhaseqResult<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }
}

impl CorrectionModel for VirialFugacity {
    fn components(&self) -> usize {
        self.b.nrows()
    }

    fn name(&self) -> &str {
        "virial"
    }

    fn evaluate(
        &self,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        let n = self.components();
        let b_i = Array1::from_shape_fn(n, |i| {
            (0..n).map(|j| molefracs[j] * self.b[(i, j)]).sum::<f64>()
        });
        let b_mix: f64 = (0..n).map(|i| molefracs[i] * b_i[i]).sum();
        Ok(b_i.mapv(|b| ((2.0 * b - b_mix) * pressure / (RGAS * temperature)).exp()))
    }
}

/// Poynting correction from a constant liquid molar volume.
///
/// `Poynting_i = exp(v_i (P - Psat_i(T)) / (R T))`
pub struct MolarVolumePoynting {
    molar_volumes: Array1<f64>,
    saturation: Vec<ClausiusClapeyron>,
}

impl MolarVolumePoynting {
    pub fn new(
        molar_volumes: Array1<f64>,
        saturation: Vec<ClausiusClapeyron>,
    ) -> PhaseqResult<Self> {
        if molar_volumes.len() != saturation.len() {
            return Err(PhaseqError::Configuration(format!(
                "{} molar volumes for {} saturation correlations",
                molar_volumes.len(),
                saturation.len()
            )));
        }
        Ok(Self {
            molar_volumes,
            saturation,
        })
    }
}

impl CorrectionModel for MolarVolumePoynting {
    fn components(&self) -> usize {
        self.molar_volumes.len()
    }

    fn name(&self) -> &str {
        "Poynting"
    }

    fn evaluate(
        &self,
        _molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        Ok(Array1::from_shape_fn(self.components(), |i| {
            let psat = self.saturation[i].vapor_pressure(temperature);
            (self.molar_volumes[i] * (pressure - psat) / (RGAS * temperature)).exp()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn virial_pure_limit() -> PhaseqResult<()> {
        // for a pure component ln phi = B11 P / RT
        let model = VirialFugacity::from_json(r#"{"b": [[-1.2e-3, -0.9e-3], [-0.9e-3, -0.7e-3]]}"#)?;
        let phi = model.evaluate(&arr1(&[1.0, 0.0]), 350.0, 1e5)?;
        assert_relative_eq!(
            phi[0],
            (-1.2e-3 * 1e5 / (RGAS * 350.0)).exp(),
            max_relative = 1e-12
        );
        Ok(())
    }

    #[test]
    fn virial_below_unity_for_negative_b() -> PhaseqResult<()> {
        let model = VirialFugacity::from_json(r#"{"b": [[-1.2e-3, -0.9e-3], [-0.9e-3, -0.7e-3]]}"#)?;
        let phi = model.evaluate(&arr1(&[0.4, 0.6]), 350.0, 2e5)?;
        assert!(phi.iter().all(|&p| p < 1.0 && p > 0.0));
        Ok(())
    }

    #[test]
    fn poynting_is_unity_at_saturation() -> PhaseqResult<()> {
        let saturation = ClausiusClapeyron {
            reference_temperature: 350.0,
            reference_pressure: 50000.0,
            vaporization_enthalpy: 35000.0,
        };
        let model = MolarVolumePoynting::new(arr1(&[9.5e-5]), vec![saturation])?;
        let factor = model.evaluate(&arr1(&[1.0]), 350.0, 50000.0)?;
        assert_relative_eq!(factor[0], 1.0, max_relative = 1e-12);
        // compression above saturation increases the liquid fugacity
        let factor = model.evaluate(&arr1(&[1.0]), 350.0, 10e5)?;
        assert!(factor[0] > 1.0);
        Ok(())
    }
}
