use super::CorrectionModel;
use crate::errors::{PhaseqError, PhaseqResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Interaction parameters for the [Nrtl] activity model.
///
/// `tau_ij = a_ij + b_ij / T`, `G_ij = exp(-alpha_ij * tau_ij)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NrtlRecord {
    pub a: Vec<Vec<f64>>,
    #[serde(default)]
    pub b: Option<Vec<Vec<f64>>>,
    pub alpha: Vec<Vec<f64>>,
}

/// Non-random two-liquid activity-coefficient model.
///
/// Composition dependent, so it can represent strongly non-ideal liquids up
/// to and including liquid-liquid demixing.
pub struct Nrtl {
    a: Array2<f64>,
    b: Array2<f64>,
    alpha: Array2<f64>,
}

impl Nrtl {
    pub fn from_record(record: NrtlRecord) -> PhaseqResult<Self> {
        let a = matrix("a", record.a)?;
        let n = a.nrows();
        let b = match record.b {
            Some(b) => matrix("b", b)?,
            None => Array2::zeros((n, n)),
        };
        let alpha = matrix("alpha", record.alpha)?;
        if b.nrows() != n || alpha.nrows() != n {
            return Err(PhaseqError::Configuration(
                "NRTL parameter matrices differ in size".into(),
            ));
        }
        Ok(Self { a, b, alpha })
    }

    pub fn from_json(json: &str) -> PhaseqResult<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }

    /// Symmetric binary parameterization with temperature-independent
    /// interaction parameters.
    pub fn binary(a12: f64, a21: f64, alpha: f64) -> Self {
        Self {
            a: Array2::from_shape_fn((2, 2), |(i, j)| match (i, j) {
                (0, 1) => a12,
                (1, 0) => a21,
                _ => 0.0,
            }),
            b: Array2::zeros((2, 2)),
            alpha: Array2::from_shape_fn((2, 2), |(i, j)| if i == j { 0.0 } else { alpha }),
        }
    }
}

fn matrix(name: &str, rows: Vec<Vec<f64>>) -> PhaseqResult<Array2<f64>> {
    let n = rows.len();
    if rows.iter().any(|row| row.len() != n) {
        return Err(PhaseqError::Configuration(format!(
            "NRTL parameter matrix `{name}` is not square"
        )));
    }
    Ok(Array2::from_shape_fn((n, n), |(i, j)| rows[i][j]))
}

impl CorrectionModel for Nrtl {
    fn components(&self) -> usize {
        self.a.nrows()
    }

    fn name(&self) -> &str {
        "NRTL"
    }

    fn evaluate(
        &self,
        molefracs: &Array1<f64>,
        temperature: f64,
        _pressure: f64,
    ) -> PhaseqResult<Array1<f64>> {
        let n = self.components();
        let tau = Array2::from_shape_fn((n, n), |(i, j)| {
            self.a[(i, j)] + self.b[(i, j)] / temperature
        });
        let g = Array2::from_shape_fn((n, n), |(i, j)| (-self.alpha[(i, j)] * tau[(i, j)]).exp());

        // s_j = sum_k x_k G_kj, q_j = sum_k x_k tau_kj G_kj
        let s = Array1::from_shape_fn(n, |j| {
            (0..n).map(|k| molefracs[k] * g[(k, j)]).sum::<f64>()
        });
        let q = Array1::from_shape_fn(n, |j| {
            (0..n)
                .map(|k| molefracs[k] * tau[(k, j)] * g[(k, j)])
                .sum::<f64>()
        });

        let ln_gamma = Array1::from_shape_fn(n, |i| {
            q[i] / s[i]
                + (0..n)
                    .map(|j| molefracs[j] * g[(i, j)] / s[j] * (tau[(i, j)] - q[j] / s[j]))
                    .sum::<f64>()
        });
        Ok(ln_gamma.mapv(f64::exp))
    }
}
