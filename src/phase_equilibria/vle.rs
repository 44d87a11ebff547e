use super::root::brent_hybrid;
use super::{PhaseEquilibrium, TemperatureOrPressure};
use crate::errors::{PhaseqError, PhaseqResult};
use crate::fugacity::FugacityEngine;
use crate::properties::PropertyPackage;
use crate::state::{validate_molefracs, MaterialIndexer, Phase, ThermalCondition};
use crate::SolverOptions;
use ndarray::Array1;

const MAX_ITER_VLE: usize = 100;
const TOL_VLE: f64 = 1e-9;

/// Specification of a flash calculation from exactly two degrees of freedom.
///
/// Values are supplied through the builder methods; the combination is
/// checked once when the solver is invoked, before any state is touched.
/// Enthalpy and entropy targets are total (extensive) quantities consistent
/// with the molar amounts held by the material.
#[derive(Clone, Debug, Default)]
pub struct FlashSpec {
    temperature: Option<f64>,
    pressure: Option<f64>,
    vapor_fraction: Option<f64>,
    enthalpy: Option<f64>,
    entropy: Option<f64>,
    liquid_molefracs: Option<Array1<f64>>,
    vapor_molefracs: Option<Array1<f64>>,
}

impl FlashSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Temperature in K.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Pressure in Pa.
    pub fn pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Molar vapor fraction in [0, 1].
    pub fn vapor_fraction(mut self, vapor_fraction: f64) -> Self {
        self.vapor_fraction = Some(vapor_fraction);
        self
    }

    /// Total enthalpy in J.
    pub fn enthalpy(mut self, enthalpy: f64) -> Self {
        self.enthalpy = Some(enthalpy);
        self
    }

    /// Total entropy in J/K.
    pub fn entropy(mut self, entropy: f64) -> Self {
        self.entropy = Some(entropy);
        self
    }

    /// Mole fractions of the liquid phase (bubble point specification).
    pub fn liquid_molefracs(mut self, molefracs: Array1<f64>) -> Self {
        self.liquid_molefracs = Some(molefracs);
        self
    }

    /// Mole fractions of the vapor phase (dew point specification).
    pub fn vapor_molefracs(mut self, molefracs: Array1<f64>) -> Self {
        self.vapor_molefracs = Some(molefracs);
        self
    }

    fn resolve(self, components: usize) -> PhaseqResult<ResolvedSpec> {
        let supplied = self.temperature.is_some() as usize
            + self.pressure.is_some() as usize
            + self.vapor_fraction.is_some() as usize
            + self.enthalpy.is_some() as usize
            + self.entropy.is_some() as usize
            + self.liquid_molefracs.is_some() as usize
            + self.vapor_molefracs.is_some() as usize;
        if supplied != 2 {
            return Err(PhaseqError::Configuration(format!(
                "a flash requires exactly two specified values, got {supplied}"
            )));
        }
        for scalar in [self.temperature, self.pressure] {
            if let Some(value) = scalar {
                if !value.is_finite() || value <= 0.0 {
                    return Err(PhaseqError::Configuration(format!(
                        "temperature and pressure must be positive and finite, got {value}"
                    )));
                }
            }
        }
        if let Some(v) = self.vapor_fraction {
            if !(0.0..=1.0).contains(&v) {
                return Err(PhaseqError::InfeasibleSpecification(format!(
                    "vapor fraction {v} lies outside [0, 1]"
                )));
            }
        }
        for molefracs in [&self.liquid_molefracs, &self.vapor_molefracs].into_iter().flatten() {
            validate_molefracs(molefracs, components)?;
        }

        match (
            self.temperature,
            self.pressure,
            self.vapor_fraction,
            self.enthalpy,
            self.entropy,
            self.liquid_molefracs,
            self.vapor_molefracs,
        ) {
            (Some(t), Some(p), None, None, None, None, None) => Ok(ResolvedSpec::Tp(t, p)),
            (Some(t), None, Some(v), None, None, None, None) => Ok(ResolvedSpec::Tv(t, v)),
            (None, Some(p), Some(v), None, None, None, None) => Ok(ResolvedSpec::Pv(p, v)),
            (None, Some(p), None, Some(h), None, None, None) => Ok(ResolvedSpec::Ph(p, h)),
            (None, Some(p), None, None, Some(s), None, None) => Ok(ResolvedSpec::Ps(p, s)),
            (Some(t), None, None, None, None, Some(x), None) => Ok(ResolvedSpec::Boundary {
                molefracs: x,
                tp: TemperatureOrPressure::Temperature(t),
                bubble: true,
            }),
            (None, Some(p), None, None, None, Some(x), None) => Ok(ResolvedSpec::Boundary {
                molefracs: x,
                tp: TemperatureOrPressure::Pressure(p),
                bubble: true,
            }),
            (Some(t), None, None, None, None, None, Some(y)) => Ok(ResolvedSpec::Boundary {
                molefracs: y,
                tp: TemperatureOrPressure::Temperature(t),
                bubble: false,
            }),
            (None, Some(p), None, None, None, None, Some(y)) => Ok(ResolvedSpec::Boundary {
                molefracs: y,
                tp: TemperatureOrPressure::Pressure(p),
                bubble: false,
            }),
            _ => Err(PhaseqError::Configuration(
                "unsupported specification pair; supported are (T, p), (T, V), (p, V), \
                 (p, H), (p, S), and one phase composition together with T or p"
                    .into(),
            )),
        }
    }
}

enum ResolvedSpec {
    Tp(f64, f64),
    Tv(f64, f64),
    Pv(f64, f64),
    Ph(f64, f64),
    Ps(f64, f64),
    Boundary {
        molefracs: Array1<f64>,
        tp: TemperatureOrPressure,
        bubble: bool,
    },
}

#[derive(Copy, Clone)]
enum EnergyTarget {
    Enthalpy,
    Entropy,
}

impl EnergyTarget {
    fn name(self) -> &'static str {
        match self {
            Self::Enthalpy => "ph flash",
            Self::Entropy => "ps flash",
        }
    }

    fn evaluate<P: PropertyPackage>(
        self,
        properties: &P,
        phase: Phase,
        molefracs: &Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> PhaseqResult<f64> {
        match self {
            Self::Enthalpy => properties.molar_enthalpy(phase, molefracs, temperature, pressure),
            Self::Entropy => properties.molar_entropy(phase, molefracs, temperature, pressure),
        }
    }
}

/// Vapor-liquid equilibrium solver over the vapor and liquid phases of a
/// [MaterialIndexer].
///
/// The solver dispatches on the two degrees of freedom of the [FlashSpec],
/// computes the equilibrium into locals, and commits molar amounts and the
/// [ThermalCondition] only when the calculation succeeds. Per-component
/// totals are conserved exactly by the commit arithmetic.
pub struct VleSolver<P> {
    engine: FugacityEngine<P>,
}

impl<P: PropertyPackage> VleSolver<P> {
    pub fn new(engine: FugacityEngine<P>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FugacityEngine<P> {
        &self.engine
    }

    /// Solve the flash specification for the material's total feed.
    ///
    /// On success the vapor and liquid amounts of the material and both
    /// entries of the condition are overwritten with the converged state; on
    /// any error the material and condition are left untouched.
    pub fn solve(
        &self,
        material: &mut MaterialIndexer,
        condition: &mut ThermalCondition,
        spec: FlashSpec,
        options: SolverOptions,
    ) -> PhaseqResult<PhaseEquilibrium> {
        if material.components().len() != self.engine.components() {
            return Err(PhaseqError::IncompatibleComponents(
                self.engine.components(),
                material.components().len(),
            ));
        }
        let resolved = spec.resolve(self.engine.components())?;

        // both phases must exist before anything is computed
        let vapor_moles = material.amounts(Phase::Vapor)?.sum();
        let liquid_moles = material.amounts(Phase::Liquid)?.sum();
        let feed = material.amounts(Phase::Vapor)? + material.amounts(Phase::Liquid)?;
        let total = feed.sum();
        if total <= 0.0 {
            return Err(PhaseqError::Configuration(
                "material holds no moles in the vapor and liquid phases".into(),
            ));
        }
        let z = &feed / total;

        // a committed two-phase split warms up the iteration
        let init = match (
            material.molefracs(Phase::Liquid)?,
            material.molefracs(Phase::Vapor)?,
        ) {
            (Some(x), Some(y)) => Some(PhaseEquilibrium::new(
                condition.temperature(),
                condition.pressure(),
                x,
                y,
                vapor_moles / (vapor_moles + liquid_moles),
            )),
            _ => None,
        };
        let init = init.as_ref();

        let vle = match resolved {
            ResolvedSpec::Tp(t, p) => {
                PhaseEquilibrium::tp_flash(&self.engine, t, p, &z, init, options)?
            }
            ResolvedSpec::Tv(t, v) => self.tv_flash(t, v, &z, init, options)?,
            ResolvedSpec::Pv(p, v) => self.pv_flash(p, v, &z, init, options)?,
            ResolvedSpec::Ph(p, h) => {
                self.energy_flash(p, h / total, EnergyTarget::Enthalpy, &z, init, options)?
            }
            ResolvedSpec::Ps(p, s) => {
                self.energy_flash(p, s / total, EnergyTarget::Entropy, &z, init, options)?
            }
            ResolvedSpec::Boundary {
                molefracs,
                tp,
                bubble,
            } => {
                if bubble {
                    PhaseEquilibrium::bubble_point(
                        &self.engine,
                        &molefracs,
                        tp,
                        init.map(|s| s.vapor_molefracs()),
                        (Default::default(), options),
                    )?
                } else {
                    PhaseEquilibrium::dew_point(
                        &self.engine,
                        &molefracs,
                        tp,
                        init.map(|s| s.liquid_molefracs()),
                        (Default::default(), options),
                    )?
                }
            }
        };

        // commit: split every component by its converged phase weight so the
        // per-component totals are conserved exactly
        let beta = vle.vapor_fraction();
        let vapor_amounts = Array1::from_shape_fn(feed.len(), |i| {
            let vap = beta * vle.vapor_molefracs()[i];
            let liq = (1.0 - beta) * vle.liquid_molefracs()[i];
            if vap + liq > 0.0 {
                feed[i] * vap / (vap + liq)
            } else {
                0.0
            }
        });
        let liquid_amounts = &feed - &vapor_amounts;
        condition.set_temperature(vle.temperature())?;
        condition.set_pressure(vle.pressure())?;
        material.set_amounts(Phase::Vapor, vapor_amounts)?;
        material.set_amounts(Phase::Liquid, liquid_amounts)?;
        Ok(vle)
    }

    /// Root-find the pressure inside the two-phase window at which the flash
    /// reproduces the specified vapor fraction.
    fn tv_flash(
        &self,
        temperature: f64,
        vapor_fraction: f64,
        feed: &Array1<f64>,
        init: Option<&PhaseEquilibrium>,
        options: SolverOptions,
    ) -> PhaseqResult<PhaseEquilibrium> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_VLE, TOL_VLE);
        let bubble = PhaseEquilibrium::bubble_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Temperature(temperature),
            init.map(|s| s.vapor_molefracs()),
            Default::default(),
        )?;
        if vapor_fraction == 0.0 {
            return Ok(bubble);
        }
        let dew = PhaseEquilibrium::dew_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Temperature(temperature),
            init.map(|s| s.liquid_molefracs()),
            Default::default(),
        )?;
        if vapor_fraction == 1.0 {
            return Ok(dew);
        }

        let mut last = init.cloned();
        let pressure = brent_hybrid(
            "Tv flash",
            |p| {
                let state = PhaseEquilibrium::tp_flash(
                    &self.engine,
                    temperature,
                    p,
                    feed,
                    last.as_ref(),
                    SolverOptions::default(),
                )?;
                let residual = state.vapor_fraction() - vapor_fraction;
                last = Some(state);
                Ok(residual)
            },
            dew.pressure(),
            bubble.pressure(),
            max_iter,
            tol,
            verbosity,
        )?;
        PhaseEquilibrium::tp_flash(
            &self.engine,
            temperature,
            pressure,
            feed,
            last.as_ref(),
            SolverOptions::default(),
        )
    }

    /// Root-find the temperature between the bubble and dew points at which
    /// the flash reproduces the specified vapor fraction.
    fn pv_flash(
        &self,
        pressure: f64,
        vapor_fraction: f64,
        feed: &Array1<f64>,
        init: Option<&PhaseEquilibrium>,
        options: SolverOptions,
    ) -> PhaseqResult<PhaseEquilibrium> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_VLE, TOL_VLE);
        let bubble = PhaseEquilibrium::bubble_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Pressure(pressure),
            init.map(|s| s.vapor_molefracs()),
            Default::default(),
        )?;
        if vapor_fraction == 0.0 {
            return Ok(bubble);
        }
        let dew = PhaseEquilibrium::dew_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Pressure(pressure),
            init.map(|s| s.liquid_molefracs()),
            Default::default(),
        )?;
        if vapor_fraction == 1.0 {
            return Ok(dew);
        }

        let mut last = init.cloned();
        let temperature = brent_hybrid(
            "pV flash",
            |t| {
                let state = PhaseEquilibrium::tp_flash(
                    &self.engine,
                    t,
                    pressure,
                    feed,
                    last.as_ref(),
                    SolverOptions::default(),
                )?;
                let residual = state.vapor_fraction() - vapor_fraction;
                last = Some(state);
                Ok(residual)
            },
            bubble.temperature(),
            dew.temperature(),
            max_iter,
            tol,
            verbosity,
        )?;
        PhaseEquilibrium::tp_flash(
            &self.engine,
            temperature,
            pressure,
            feed,
            last.as_ref(),
            SolverOptions::default(),
        )
    }

    /// Root-find the temperature at which the molar enthalpy or entropy of
    /// the equilibrium state matches the target.
    ///
    /// Targets below the bubble-point or above the dew-point value follow the
    /// single-phase branches over the correlation window; targets inside the
    /// two-phase envelope iterate the flash.
    fn energy_flash(
        &self,
        pressure: f64,
        target: f64,
        kind: EnergyTarget,
        feed: &Array1<f64>,
        init: Option<&PhaseEquilibrium>,
        options: SolverOptions,
    ) -> PhaseqResult<PhaseEquilibrium> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_VLE, TOL_VLE);
        let properties: &P = self.engine.properties();
        let scale = target.abs().max(1.0);
        let name = kind.name();

        let bubble = PhaseEquilibrium::bubble_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Pressure(pressure),
            init.map(|s| s.vapor_molefracs()),
            Default::default(),
        )?;
        let dew = PhaseEquilibrium::dew_point(
            &self.engine,
            feed,
            TemperatureOrPressure::Pressure(pressure),
            init.map(|s| s.liquid_molefracs()),
            Default::default(),
        )?;
        let at_bubble =
            kind.evaluate(properties, Phase::Liquid, feed, bubble.temperature(), pressure)?;
        let at_dew = kind.evaluate(properties, Phase::Vapor, feed, dew.temperature(), pressure)?;
        let (t_min, t_max) = properties.temperature_limits();

        if target < at_bubble {
            // subcooled liquid
            let temperature = brent_hybrid(
                name,
                |t| {
                    Ok((kind.evaluate(properties, Phase::Liquid, feed, t, pressure)? - target)
                        / scale)
                },
                t_min,
                bubble.temperature(),
                max_iter,
                tol,
                verbosity,
            )?;
            return Ok(PhaseEquilibrium::new(
                temperature,
                pressure,
                feed.clone(),
                bubble.vapor_molefracs().clone(),
                0.0,
            ));
        }
        if target > at_dew {
            // superheated vapor
            let temperature = brent_hybrid(
                name,
                |t| {
                    Ok((kind.evaluate(properties, Phase::Vapor, feed, t, pressure)? - target)
                        / scale)
                },
                dew.temperature(),
                t_max,
                max_iter,
                tol,
                verbosity,
            )?;
            return Ok(PhaseEquilibrium::new(
                temperature,
                pressure,
                dew.liquid_molefracs().clone(),
                feed.clone(),
                1.0,
            ));
        }

        // inside the two-phase envelope
        let mut last = init.cloned();
        let temperature = brent_hybrid(
            name,
            |t| {
                let state = PhaseEquilibrium::tp_flash(
                    &self.engine,
                    t,
                    pressure,
                    feed,
                    last.as_ref(),
                    SolverOptions::default(),
                )?;
                let beta = state.vapor_fraction();
                let mixed = beta
                    * kind.evaluate(properties, Phase::Vapor, state.vapor_molefracs(), t, pressure)?
                    + (1.0 - beta)
                        * kind.evaluate(
                            properties,
                            Phase::Liquid,
                            state.liquid_molefracs(),
                            t,
                            pressure,
                        )?;
                last = Some(state);
                Ok((mixed - target) / scale)
            },
            bubble.temperature(),
            dew.temperature(),
            max_iter,
            tol,
            verbosity,
        )?;
        PhaseEquilibrium::tp_flash(
            &self.engine,
            temperature,
            pressure,
            feed,
            last.as_ref(),
            SolverOptions::default(),
        )
    }
}
