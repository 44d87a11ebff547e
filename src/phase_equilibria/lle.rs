use super::tp_flash::rachford_rice;
use super::PhaseEquilibrium;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::fugacity::FugacityEngine;
use crate::properties::PropertyPackage;
use crate::state::{MaterialIndexer, Phase};
use crate::SolverOptions;
use ndarray::Array1;

const MAX_ITER_LLE: usize = 500;
const TOL_LLE: f64 = 1e-8;

/// Mole fraction of the dominant component in the trial phase used to kick
/// off the split.
const X_DOMINANT: f64 = 0.99;

/// Phase fractions closer to 0 or 1 than this are treated as a collapsed
/// split.
const PSI_LIMIT: f64 = 1e-8;

/// Activity coefficients are pressure-independent to the accuracy of the
/// models in this crate; liquid-liquid equilibria are evaluated at a fixed
/// reference pressure.
const REFERENCE_PRESSURE: f64 = 101325.0;

/// Result of a liquid-liquid solve.
///
/// A feed that is stable as one liquid is a regular outcome, not an error.
#[derive(Clone, Debug)]
pub enum LiquidLiquidOutcome {
    /// The feed splits into two liquid phases.
    TwoPhase {
        liquid1_molefracs: Array1<f64>,
        liquid2_molefracs: Array1<f64>,
        /// Molar fraction of the second liquid phase.
        phase2_fraction: f64,
    },
    /// The feed is stable as a single liquid phase.
    SinglePhase,
}

/// Liquid-liquid equilibrium solver over the two liquid phases of a
/// [MaterialIndexer].
///
/// Successive substitution on the activity-coefficient ratio
/// `K_i = γ¹_i / γ²_i` with the phase fraction recomputed from the
/// Rachford-Rice equation. The iteration starts from a trial phase
/// concentrated in the component with the largest activity coefficient at
/// the feed, or from the committed phase compositions when the material
/// already holds two distinct liquids.
pub struct LleSolver<P> {
    engine: FugacityEngine<P>,
}

impl<P: PropertyPackage> LleSolver<P> {
    pub fn new(engine: FugacityEngine<P>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FugacityEngine<P> {
        &self.engine
    }

    /// Solve the liquid-liquid split of the material's feed at the given
    /// temperature.
    ///
    /// On success the two liquid phases of the material are overwritten; a
    /// collapsed split commits all material to the first liquid phase.
    pub fn solve(
        &self,
        material: &mut MaterialIndexer,
        temperature: f64,
        options: SolverOptions,
    ) -> PhaseqResult<LiquidLiquidOutcome> {
        if material.components().len() != self.engine.components() {
            return Err(PhaseqError::IncompatibleComponents(
                self.engine.components(),
                material.components().len(),
            ));
        }
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_LLE, TOL_LLE);

        let feed = material.amounts(Phase::Liquid1)? + material.amounts(Phase::Liquid2)?;
        let total = feed.sum();
        if total <= 0.0 {
            return Err(PhaseqError::Configuration(
                "material holds no moles in the liquid phases".into(),
            ));
        }
        let z = &feed / total;

        let outcome = self.phase_split(&z, temperature, material, max_iter, tol, verbosity)?;

        match &outcome {
            LiquidLiquidOutcome::SinglePhase => {
                material.set_amounts(Phase::Liquid1, feed.clone())?;
                material.set_amounts(Phase::Liquid2, Array1::zeros(feed.len()))?;
            }
            LiquidLiquidOutcome::TwoPhase {
                liquid1_molefracs,
                liquid2_molefracs,
                phase2_fraction,
            } => {
                let psi = *phase2_fraction;
                let second = Array1::from_shape_fn(feed.len(), |i| {
                    let w2 = psi * liquid2_molefracs[i];
                    let w1 = (1.0 - psi) * liquid1_molefracs[i];
                    if w1 + w2 > 0.0 {
                        feed[i] * w2 / (w1 + w2)
                    } else {
                        0.0
                    }
                });
                let first = &feed - &second;
                material.set_amounts(Phase::Liquid1, first)?;
                material.set_amounts(Phase::Liquid2, second)?;
            }
        }
        Ok(outcome)
    }

    fn phase_split(
        &self,
        z: &Array1<f64>,
        temperature: f64,
        material: &MaterialIndexer,
        max_iter: usize,
        tol: f64,
        verbosity: crate::Verbosity,
    ) -> PhaseqResult<LiquidLiquidOutcome> {
        let (mut x1, mut x2, mut psi) = match self.warm_start(material)? {
            Some(split) => split,
            None => match self.trial_split(z, temperature)? {
                Some(split) => split,
                None => return Ok(LiquidLiquidOutcome::SinglePhase),
            },
        };

        log_iter!(verbosity, " iter |    residual    |      psi       ");
        log_iter!(verbosity, "{:-<48}", "");

        let mut residual = f64::INFINITY;
        for iteration in 1..=max_iter {
            let gamma1 = self.engine.activity(&x1, temperature, REFERENCE_PRESSURE)?;
            let gamma2 = self.engine.activity(&x2, temperature, REFERENCE_PRESSURE)?;
            let k = gamma1 / &gamma2;

            psi = match rachford_rice(z, &k, Some(psi)) {
                Ok(psi) => psi,
                // the activity ratios admit no split: the feed is stable
                Err(PhaseqError::InfeasibleSpecification(_)) => {
                    log_result!(
                        verbosity,
                        "LLE: no feasible split after {} step(s), feed is stable\n",
                        iteration
                    );
                    return Ok(LiquidLiquidOutcome::SinglePhase);
                }
                Err(e) => return Err(e),
            };

            let denominator = k.mapv(|ki| 1.0 - psi + psi * ki);
            let first_raw = z / &denominator;
            let second_raw = z * &k / &denominator;
            let x1_new = &first_raw / first_raw.sum();
            let x2_new = &second_raw / second_raw.sum();

            // the substitution step restores x1_i K_i / x2_i = 1 exactly, so
            // convergence is judged by the compositions (and with them the
            // activity coefficients) coming to rest
            let delta1 = &x1_new - &x1;
            let delta2 = &x2_new - &x2;
            residual = (delta1.dot(&delta1) + delta2.dot(&delta2)).sqrt();
            x1 = x1_new;
            x2 = x2_new;
            log_iter!(
                verbosity,
                " {:4} | {:14.8e} | {:14.8e}",
                iteration,
                residual,
                psi
            );

            if PhaseEquilibrium::is_identical_composition(&x1, &x2)
                || psi < PSI_LIMIT
                || psi > 1.0 - PSI_LIMIT
            {
                log_result!(
                    verbosity,
                    "LLE: split collapsed after {} step(s), feed is stable\n",
                    iteration
                );
                return Ok(LiquidLiquidOutcome::SinglePhase);
            }
            if residual < tol {
                log_result!(verbosity, "LLE: converged in {} step(s)\n", iteration);
                return Ok(LiquidLiquidOutcome::TwoPhase {
                    liquid1_molefracs: x1,
                    liquid2_molefracs: x2,
                    phase2_fraction: psi,
                });
            }
        }
        Err(PhaseqError::not_converged(
            "LLE",
            max_iter,
            residual,
            &[psi],
        ))
    }

    /// Use the committed phase compositions when the material already holds
    /// two distinct liquids.
    fn warm_start(
        &self,
        material: &MaterialIndexer,
    ) -> PhaseqResult<Option<(Array1<f64>, Array1<f64>, f64)>> {
        let first = material.molefracs(Phase::Liquid1)?;
        let second = material.molefracs(Phase::Liquid2)?;
        Ok(match (first, second) {
            (Some(x1), Some(x2)) if !PhaseEquilibrium::is_identical_composition(&x1, &x2) => {
                let n2 = material.amounts(Phase::Liquid2)?.sum();
                let psi = n2
                    / (material.amounts(Phase::Liquid1)?.sum() + n2);
                Some((x1, x2, psi))
            }
            _ => None,
        })
    }

    /// Trial phase concentrated in the component with the largest activity
    /// coefficient at the feed. Returns [None] for feeds that cannot split
    /// (effectively pure).
    fn trial_split(
        &self,
        z: &Array1<f64>,
        temperature: f64,
    ) -> PhaseqResult<Option<(Array1<f64>, Array1<f64>, f64)>> {
        let gamma = self.engine.activity(z, temperature, REFERENCE_PRESSURE)?;
        let dominant = gamma
            .iter()
            .enumerate()
            .filter(|&(i, _)| z[i] > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| {
                PhaseqError::Configuration("feed composition contains no material".into())
            })?;
        let rest: f64 = z
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != dominant)
            .map(|(_, &zi)| zi)
            .sum();
        if rest <= 0.0 {
            return Ok(None);
        }
        let trial = Array1::from_shape_fn(z.len(), |i| {
            if i == dominant {
                X_DOMINANT
            } else {
                (1.0 - X_DOMINANT) * z[i] / rest
            }
        });
        Ok(Some((z.clone(), trial, 0.5)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentSet;
    use crate::models::Nrtl;
    use crate::properties::IdealMixture;
    use approx::assert_relative_eq;
    use ndarray::arr1;
    use std::sync::Arc;

    fn package() -> Arc<IdealMixture> {
        Arc::new(
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
            .unwrap(),
        )
    }

    fn material(amounts: [f64; 2]) -> MaterialIndexer {
        let components = Arc::new(ComponentSet::new(["alpha", "beta"]).unwrap());
        let mut material =
            MaterialIndexer::new(&components, &[Phase::Liquid1, Phase::Liquid2]).unwrap();
        material
            .set_amounts(Phase::Liquid1, arr1(&amounts))
            .unwrap();
        material
    }

    fn immiscible_solver() -> LleSolver<IdealMixture> {
        use crate::models::IdealCorrection;
        let package = package();
        let engine = FugacityEngine::new(
            package,
            Box::new(Nrtl::binary(3.5, 3.5, 0.2)),
            Box::new(IdealCorrection(2)),
            Box::new(IdealCorrection(2)),
        )
        .unwrap();
        LleSolver::new(engine)
    }

    #[test]
    fn immiscible_binary_splits() -> PhaseqResult<()> {
        let solver = immiscible_solver();
        let mut material = material([1.0, 1.0]);
        let outcome = solver.solve(&mut material, 320.0, Default::default())?;
        let LiquidLiquidOutcome::TwoPhase {
            liquid1_molefracs: x1,
            liquid2_molefracs: x2,
            phase2_fraction: psi,
        } = outcome
        else {
            panic!("expected a two-phase split");
        };
        // symmetric parameters and feed: mirrored compositions, even split
        assert!(x2[0] > 0.9 && x1[0] < 0.1);
        assert_relative_eq!(psi, 0.5, max_relative = 1e-5);
        assert_relative_eq!(x1[0], x2[1], max_relative = 1e-5);

        // isoactivity across the converged phases
        let gamma1 = solver.engine().activity(&x1, 320.0, 101325.0)?;
        let gamma2 = solver.engine().activity(&x2, 320.0, 101325.0)?;
        for i in 0..2 {
            assert_relative_eq!(
                gamma1[i] * x1[i],
                gamma2[i] * x2[i],
                max_relative = 1e-6
            );
        }

        // conservation across the committed phases
        let total = material.total_amounts();
        assert_relative_eq!(total[0], 1.0, max_relative = 1e-12);
        assert_relative_eq!(total[1], 1.0, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn ideal_feed_is_single_phase() -> PhaseqResult<()> {
        let solver = LleSolver::new(FugacityEngine::ideal(package()));
        let mut material = material([1.0, 3.0]);
        let outcome = solver.solve(&mut material, 320.0, Default::default())?;
        assert!(matches!(outcome, LiquidLiquidOutcome::SinglePhase));
        assert_relative_eq!(material.amounts(Phase::Liquid1)?[1], 3.0);
        assert_relative_eq!(material.amounts(Phase::Liquid2)?.sum(), 0.0);
        Ok(())
    }

    #[test]
    fn weakly_nonideal_feed_is_single_phase() -> PhaseqResult<()> {
        use crate::models::IdealCorrection;
        let engine = FugacityEngine::new(
            package(),
            Box::new(Nrtl::binary(0.5, 0.5, 0.3)),
            Box::new(IdealCorrection(2)),
            Box::new(IdealCorrection(2)),
        )?;
        let solver = LleSolver::new(engine);
        let mut material = material([1.0, 1.0]);
        let outcome = solver.solve(&mut material, 320.0, Default::default())?;
        assert!(matches!(outcome, LiquidLiquidOutcome::SinglePhase));
        Ok(())
    }

    #[test]
    fn warm_start_reproduces_cold_start() -> PhaseqResult<()> {
        let solver = immiscible_solver();
        let mut material = material([1.0, 1.0]);
        solver.solve(&mut material, 320.0, Default::default())?;
        let first = material.amounts(Phase::Liquid2)?.clone();
        // second solve starts from the committed two-phase split
        solver.solve(&mut material, 320.0, Default::default())?;
        let second = material.amounts(Phase::Liquid2)?;
        for i in 0..2 {
            assert_relative_eq!(first[i], second[i], max_relative = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn pure_feed_cannot_split() -> PhaseqResult<()> {
        let solver = immiscible_solver();
        let mut material = material([2.0, 0.0]);
        let outcome = solver.solve(&mut material, 320.0, Default::default())?;
        assert!(matches!(outcome, LiquidLiquidOutcome::SinglePhase));
        Ok(())
    }
}
