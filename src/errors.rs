use thiserror::Error;

/// Error type for improperly specified problems and convergence failures.
#[derive(Error, Debug)]
pub enum PhaseqError {
    // errors raised before any iteration starts
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("The models are initialized for {0} components while the input specifies {1} components.")]
    IncompatibleComponents(usize, usize),

    // errors raised by the iterative solvers
    #[error("`{name}` did not converge within {iterations} iterations. Last residual: {residual:.8e}.")]
    NotConverged {
        name: String,
        iterations: usize,
        residual: f64,
        last_iterate: Vec<f64>,
    },
    #[error("Infeasible specification: {0}")]
    InfeasibleSpecification(String),

    // errors propagated from pluggable property and correction models
    #[error("Model evaluation failed in `{model}`: {reason}")]
    ModelEvaluation { model: String, reason: String },

    // json errors from parameter records
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl PhaseqError {
    pub(crate) fn not_converged(
        name: &str,
        iterations: usize,
        residual: f64,
        last_iterate: &[f64],
    ) -> Self {
        Self::NotConverged {
            name: name.to_owned(),
            iterations,
            residual,
            last_iterate: last_iterate.to_vec(),
        }
    }
}

/// Convenience type for `Result<T, PhaseqError>`.
pub type PhaseqResult<T> = Result<T, PhaseqError>;
