use super::{PhaseEquilibrium, TemperatureOrPressure};
use crate::errors::{PhaseqError, PhaseqResult};
use crate::fugacity::FugacityEngine;
use crate::properties::PropertyPackage;
use crate::state::validate_molefracs;
use crate::SolverOptions;
use ndarray::Array1;

const MAX_ITER_TP: usize = 400;
const TOL_TP: f64 = 1e-8;

/// # Flash calculations
impl PhaseEquilibrium {
    /// Perform a Tp-flash calculation for the given feed composition.
    ///
    /// The bubble and dew pressures at the flash temperature delimit the
    /// two-phase window; feeds outside it are committed to a single phase
    /// with the incipient conjugate composition attached. Inside the window
    /// the equilibrium ratios are iterated by successive substitution with
    /// the phase fraction recomputed from the Rachford-Rice equation at
    /// every step.
    pub fn tp_flash<P: PropertyPackage>(
        engine: &FugacityEngine<P>,
        temperature: f64,
        pressure: f64,
        feed_molefracs: &Array1<f64>,
        initial_state: Option<&PhaseEquilibrium>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        validate_molefracs(feed_molefracs, engine.components())?;
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_TP, TOL_TP);

        // locate the two-phase window at this temperature
        let bubble = Self::bubble_point(
            engine,
            feed_molefracs,
            TemperatureOrPressure::Temperature(temperature),
            initial_state.map(|init| init.vapor_molefracs()),
            Default::default(),
        )?;
        if pressure >= bubble.pressure() {
            // subcooled liquid
            return Ok(Self::new(
                temperature,
                pressure,
                feed_molefracs.clone(),
                bubble.vapor_molefracs().clone(),
                0.0,
            ));
        }
        let dew = Self::dew_point(
            engine,
            feed_molefracs,
            TemperatureOrPressure::Temperature(temperature),
            initial_state.map(|init| init.liquid_molefracs()),
            Default::default(),
        )?;
        if pressure <= dew.pressure() {
            // superheated vapor
            return Ok(Self::new(
                temperature,
                pressure,
                dew.liquid_molefracs().clone(),
                feed_molefracs.clone(),
                1.0,
            ));
        }

        let (mut liquid, mut vapor, mut beta) = match initial_state {
            Some(init) => (
                init.liquid_molefracs().clone(),
                init.vapor_molefracs().clone(),
                init.vapor_fraction(),
            ),
            None => (
                feed_molefracs.clone(),
                bubble.vapor_molefracs().clone(),
                (bubble.pressure() - pressure) / (bubble.pressure() - dew.pressure()),
            ),
        };

        log_iter!(verbosity, " iter |    residual    |      beta      ");
        log_iter!(verbosity, "{:-<48}", "");

        let mut residual = f64::INFINITY;
        for iteration in 1..=max_iter {
            let k = engine.k_values(&liquid, &vapor, temperature, pressure)?;
            beta = match rachford_rice(feed_molefracs, &k, Some(beta)) {
                Ok(beta) => beta,
                // the pressure lies strictly inside the window, so a ratio
                // iterate without a root in [0, 1] has merely drifted out of
                // the two-phase region; a step on the extended interval lets
                // the composition update pull it back
                Err(PhaseqError::InfeasibleSpecification(_)) => {
                    match negative_flash(feed_molefracs, &k) {
                        Some(beta) => beta,
                        // all ratios on one side of unity: this iterate
                        // cannot split at all
                        None => {
                            return Ok(if (feed_molefracs * &k).sum() <= 1.0 {
                                Self::new(
                                    temperature,
                                    pressure,
                                    feed_molefracs.clone(),
                                    vapor,
                                    0.0,
                                )
                            } else {
                                Self::new(
                                    temperature,
                                    pressure,
                                    liquid,
                                    feed_molefracs.clone(),
                                    1.0,
                                )
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            };

            let denominator = k.mapv(|ki| 1.0 - beta + beta * ki);
            let liquid_raw = feed_molefracs / &denominator;
            let vapor_raw = feed_molefracs * &k / &denominator;
            let liquid_new = &liquid_raw / liquid_raw.sum();
            let vapor_new = &vapor_raw / vapor_raw.sum();

            // the substitution step restores x_i K_i / y_i = 1 exactly, so
            // convergence is judged by the compositions (and with them the
            // correction factors) coming to rest
            let delta_liquid = &liquid_new - &liquid;
            let delta_vapor = &vapor_new - &vapor;
            residual = (delta_liquid.dot(&delta_liquid) + delta_vapor.dot(&delta_vapor)).sqrt();
            liquid = liquid_new;
            vapor = vapor_new;

            log_iter!(
                verbosity,
                " {:4} | {:14.8e} | {:14.8e}",
                iteration,
                residual,
                beta
            );
            if residual < tol {
                log_result!(
                    verbosity,
                    "Tp flash: calculation converged in {} step(s)\n",
                    iteration
                );
                // an extended-interval step can leave the phase fraction a
                // rounding error outside [0, 1] near the window edges
                let beta = beta.clamp(0.0, 1.0);
                return Ok(Self::new(temperature, pressure, liquid, vapor, beta));
            }
        }
        Err(PhaseqError::not_converged(
            "Tp flash",
            max_iter,
            residual,
            &[beta],
        ))
    }
}

/// Solve the Rachford-Rice equation for the vapor phase fraction.
///
/// The per-component bounds on the phase fraction are tightened before the
/// Newton iteration starts; steps leaving the current bounds fall back to
/// bisection.
pub(crate) fn rachford_rice(
    feed: &Array1<f64>,
    k: &Array1<f64>,
    beta_init: Option<f64>,
) -> PhaseqResult<f64> {
    const MAX_ITER_RR: usize = 50;
    const TOL_RR: f64 = 1e-12;

    // a root in (0, 1) exists iff the residual is positive at 0 and negative at 1
    let sum_zk = (feed * k).sum();
    let sum_z_over_k: f64 = feed
        .iter()
        .zip(k.iter())
        .filter(|&(_, &ki)| ki > 0.0)
        .map(|(&z, &ki)| z / ki)
        .sum();
    if sum_zk <= 1.0 || sum_z_over_k <= 1.0 {
        return Err(PhaseqError::InfeasibleSpecification(format!(
            "rachford-rice: no phase fraction in (0, 1), boundary residuals {:.4e} and {:.4e}",
            sum_zk - 1.0,
            1.0 - sum_z_over_k
        )));
    }
    let (mut beta_min, mut beta_max) = (0.0f64, 1.0f64);

    // look for tighter bounds
    for (&ki, &zi) in k.iter().zip(feed.iter()) {
        if ki > 1.0 {
            beta_min = beta_min.max((ki * zi - 1.0) / (ki - 1.0));
        }
        if ki < 1.0 {
            beta_max = beta_max.min((1.0 - zi) / (1.0 - ki));
        }
    }

    let mut beta = match beta_init {
        Some(b) if b > beta_min && b < beta_max => b,
        _ => 0.5 * (beta_min + beta_max),
    };
    let mut residual = f64::INFINITY;
    for _ in 0..MAX_ITER_RR {
        let frac = k.mapv(|ki| (ki - 1.0) / (1.0 - beta + beta * ki));
        let g = (feed * &frac).sum();
        let dg = -(feed * &frac * &frac).sum();
        residual = g.abs();
        if g > 0.0 {
            beta_min = beta;
        } else {
            beta_max = beta;
        }

        let dbeta = g / dg;
        beta -= dbeta;
        if beta < beta_min || beta > beta_max {
            beta = 0.5 * (beta_min + beta_max);
        }
        if dbeta.abs() < TOL_RR {
            return Ok(beta);
        }
    }
    Err(PhaseqError::not_converged(
        "Rachford-Rice",
        MAX_ITER_RR,
        residual,
        &[beta],
    ))
}

/// Bisect the Rachford-Rice residual on the extended interval
/// `(1/(1 - K_max), 1/(1 - K_min))`, where a root exists as long as the
/// ratios straddle unity. Returns [None] when they do not.
fn negative_flash(feed: &Array1<f64>, k: &Array1<f64>) -> Option<f64> {
    const MAX_ITER_NF: usize = 80;

    let mut k_min = f64::INFINITY;
    let mut k_max = f64::NEG_INFINITY;
    for (&zi, &ki) in feed.iter().zip(k.iter()) {
        if zi > 0.0 {
            k_min = k_min.min(ki);
            k_max = k_max.max(ki);
        }
    }
    if !(k_min < 1.0 && 1.0 < k_max) {
        return None;
    }
    let (mut lo, mut hi) = (1.0 / (1.0 - k_max), 1.0 / (1.0 - k_min));
    let mut beta = 0.5 * (lo + hi);
    for _ in 0..MAX_ITER_NF {
        let g: f64 = feed
            .iter()
            .zip(k.iter())
            .map(|(&zi, &ki)| zi * (ki - 1.0) / (1.0 - beta + beta * ki))
            .sum();
        if g > 0.0 {
            lo = beta;
        } else {
            hi = beta;
        }
        beta = 0.5 * (lo + hi);
    }
    Some(beta)
}
