use super::root::{brent_hybrid, expand_bracket};
use super::{PhaseEquilibrium, TemperatureOrPressure};
use crate::errors::PhaseqResult;
use crate::fugacity::FugacityEngine;
use crate::properties::PropertyPackage;
use crate::state::validate_molefracs;
use crate::SolverOptions;

use ndarray::Array1;

const MAX_ITER_INNER: usize = 50;
const TOL_INNER: f64 = 1e-6;
const MAX_ITER_OUTER: usize = 100;
const TOL_OUTER: f64 = 1e-10;

/// Components below this feed fraction keep a fixed near-zero conjugate
/// fraction and are excluded from the inner convergence check.
const NEGLIGIBLE_FRACTION: f64 = 1e-12;

/// Relative widening applied to the saturation-temperature bracket; repeated
/// a few times for mixtures whose boiling window extends past the pure
/// components (azeotropes).
const BRACKET_MARGIN: f64 = 0.02;
const MAX_WIDENINGS: usize = 4;

/// Geometric expansion factor for the pressure bracket around the Raoult
/// estimate.
const PRESSURE_BRACKET_FACTOR: f64 = 2.0;
const MAX_PRESSURE_EXPANSIONS: usize = 60;

/// # Bubble and dew point calculations
impl PhaseEquilibrium {
    /// Calculate a phase equilibrium for a given temperature or pressure and
    /// composition of the liquid phase.
    ///
    /// The first element of `options` controls the inner composition
    /// fixed-point loop, the second the outer scalar iteration.
    pub fn bubble_point<P: PropertyPackage>(
        engine: &FugacityEngine<P>,
        liquid_molefracs: &Array1<f64>,
        temperature_or_pressure: TemperatureOrPressure,
        vapor_init: Option<&Array1<f64>>,
        options: (SolverOptions, SolverOptions),
    ) -> PhaseqResult<Self> {
        Self::bubble_dew_point(
            engine,
            liquid_molefracs,
            temperature_or_pressure,
            vapor_init,
            true,
            options,
        )
    }

    /// Calculate a phase equilibrium for a given temperature or pressure and
    /// composition of the vapor phase.
    pub fn dew_point<P: PropertyPackage>(
        engine: &FugacityEngine<P>,
        vapor_molefracs: &Array1<f64>,
        temperature_or_pressure: TemperatureOrPressure,
        liquid_init: Option<&Array1<f64>>,
        options: (SolverOptions, SolverOptions),
    ) -> PhaseqResult<Self> {
        Self::bubble_dew_point(
            engine,
            vapor_molefracs,
            temperature_or_pressure,
            liquid_init,
            false,
            options,
        )
    }

    fn bubble_dew_point<P: PropertyPackage>(
        engine: &FugacityEngine<P>,
        molefracs_spec: &Array1<f64>,
        temperature_or_pressure: TemperatureOrPressure,
        molefracs_init: Option<&Array1<f64>>,
        bubble: bool,
        options: (SolverOptions, SolverOptions),
    ) -> PhaseqResult<Self> {
        validate_molefracs(molefracs_spec, engine.components())?;
        let (options_inner, options_outer) = options;
        let (max_inner, tol_inner, verbosity_inner) =
            options_inner.unwrap_or(MAX_ITER_INNER, TOL_INNER);
        let (max_outer, tol_outer, verbosity_outer) =
            options_outer.unwrap_or(MAX_ITER_OUTER, TOL_OUTER);

        let name = if bubble { "bubble point" } else { "dew point" };

        let mut conjugate = match molefracs_init {
            Some(init) => {
                validate_molefracs(init, engine.components())?;
                init.clone()
            }
            None => molefracs_spec.clone(),
        };

        let (temperature, pressure) = match temperature_or_pressure {
            TemperatureOrPressure::Temperature(temperature) => {
                // seed the conjugate composition from Raoult's law
                if molefracs_init.is_none() {
                    let psat = engine.properties().vapor_pressure(temperature)?;
                    seed_conjugate(&mut conjugate, molefracs_spec, &psat, bubble);
                }
                let psat = engine.properties().vapor_pressure(temperature)?;
                let p0 = if bubble {
                    molefracs_spec.dot(&psat)
                } else {
                    (molefracs_spec / &psat).sum().recip()
                };

                let (p_lo, p_hi) = expand_bracket(
                    name,
                    |p| {
                        conjugate_update(
                            engine,
                            molefracs_spec,
                            &mut conjugate,
                            bubble,
                            temperature,
                            p,
                            max_inner,
                            tol_inner,
                            verbosity_inner,
                        )
                    },
                    p0,
                    PRESSURE_BRACKET_FACTOR,
                    MAX_PRESSURE_EXPANSIONS,
                )?;
                let pressure = brent_hybrid(
                    name,
                    |p| {
                        conjugate_update(
                            engine,
                            molefracs_spec,
                            &mut conjugate,
                            bubble,
                            temperature,
                            p,
                            max_inner,
                            tol_inner,
                            verbosity_inner,
                        )
                    },
                    p_lo,
                    p_hi,
                    max_outer,
                    tol_outer,
                    verbosity_outer,
                )?;
                (temperature, pressure)
            }
            TemperatureOrPressure::Pressure(pressure) => {
                // bracket with the pure-component saturation temperatures,
                // widened stepwise for azeotropic boiling windows
                let properties = engine.properties();
                let mut t_lo = f64::INFINITY;
                let mut t_hi = 0.0f64;
                for i in 0..engine.components() {
                    if molefracs_spec[i] > NEGLIGIBLE_FRACTION {
                        let tsat = properties.saturation_temperature(i, pressure)?;
                        t_lo = t_lo.min(tsat);
                        t_hi = t_hi.max(tsat);
                    }
                }
                let (t_min, t_max) = properties.temperature_limits();

                if molefracs_init.is_none() {
                    let psat = properties.vapor_pressure(0.5 * (t_lo + t_hi))?;
                    seed_conjugate(&mut conjugate, molefracs_spec, &psat, bubble);
                }

                let mut temperature = None;
                for widening in 0..=MAX_WIDENINGS {
                    let margin = BRACKET_MARGIN * widening as f64;
                    let lo = (t_lo * (1.0 - margin)).max(t_min);
                    let hi = (t_hi * (1.0 + margin)).min(t_max);
                    let result = brent_hybrid(
                        name,
                        |t| {
                            conjugate_update(
                                engine,
                                molefracs_spec,
                                &mut conjugate,
                                bubble,
                                t,
                                pressure,
                                max_inner,
                                tol_inner,
                                verbosity_inner,
                            )
                        },
                        lo,
                        hi,
                        max_outer,
                        tol_outer,
                        verbosity_outer,
                    );
                    match result {
                        Err(crate::PhaseqError::InfeasibleSpecification(_))
                            if widening < MAX_WIDENINGS =>
                        {
                            continue
                        }
                        Err(e) => return Err(e),
                        Ok(t) => {
                            temperature = Some(t);
                            break;
                        }
                    }
                }
                // the loop either sets the temperature or returns the error
                let temperature = temperature.unwrap();
                (temperature, pressure)
            }
        };

        // leave the conjugate composition consistent with the converged scalar
        conjugate_update(
            engine,
            molefracs_spec,
            &mut conjugate,
            bubble,
            temperature,
            pressure,
            max_inner,
            tol_inner,
            verbosity_inner,
        )?;

        Ok(if bubble {
            PhaseEquilibrium::new(
                temperature,
                pressure,
                molefracs_spec.clone(),
                conjugate,
                0.0,
            )
        } else {
            PhaseEquilibrium::new(
                temperature,
                pressure,
                conjugate,
                molefracs_spec.clone(),
                1.0,
            )
        })
    }
}

fn seed_conjugate(
    conjugate: &mut Array1<f64>,
    molefracs_spec: &Array1<f64>,
    psat: &Array1<f64>,
    bubble: bool,
) {
    let seed = if bubble {
        molefracs_spec * psat
    } else {
        molefracs_spec / psat
    };
    *conjugate = &seed / seed.sum();
}

/// One evaluation of the bubble/dew residual at fixed (T, p).
///
/// Runs the inner fixed-point loop: recompute the correction factors at the
/// current conjugate composition guess and renormalize until the fraction
/// vector is stable component-wise. Returns `Σ_i f_i - 1` where `f_i` are
/// the unnormalized conjugate fractions; the residual is zero exactly at the
/// phase boundary.
fn conjugate_update<P: PropertyPackage>(
    engine: &FugacityEngine<P>,
    molefracs_spec: &Array1<f64>,
    conjugate: &mut Array1<f64>,
    bubble: bool,
    temperature: f64,
    pressure: f64,
    max_iter: usize,
    tol: f64,
    verbosity: crate::Verbosity,
) -> PhaseqResult<f64> {
    let mut residual = 0.0;
    for k in 0..max_iter {
        let fractions = if bubble {
            // y_i ∝ x_i K_i
            molefracs_spec * &engine.k_values(molefracs_spec, conjugate, temperature, pressure)?
        } else {
            // x_i ∝ y_i / K_i
            molefracs_spec / &engine.k_values(conjugate, molefracs_spec, temperature, pressure)?
        };
        let sum = fractions.sum();
        residual = sum - 1.0;
        let normalized = fractions / sum;
        let delta = normalized
            .iter()
            .zip(conjugate.iter())
            .zip(molefracs_spec.iter())
            .filter(|(_, &spec)| spec > NEGLIGIBLE_FRACTION)
            .fold(0.0f64, |acc, ((&new, &old), _)| acc.max((new - old).abs()));
        *conjugate = normalized;
        log_iter!(
            verbosity,
            "        inner {:2} | {:14.8e} | {:14.8e}",
            k + 1,
            delta,
            residual
        );
        if delta < tol {
            break;
        }
    }
    Ok(residual)
}
