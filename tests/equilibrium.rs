//! End-to-end equilibrium scenarios exercising the public API.

use approx::assert_relative_eq;
use ndarray::arr1;
use phaseq::models::{MolarVolumePoynting, Nrtl, VirialFugacity};
use phaseq::properties::{ClausiusClapeyron, IdealMixture, PureParameters};
use phaseq::{
    ComponentSet, FlashSpec, FugacityEngine, LiquidLiquidOutcome, LleSolver, MaterialIndexer,
    Phase, PhaseEquilibrium, PhaseqError, PhaseqResult, TemperatureOrPressure, ThermalCondition,
    VleSolver,
};
use std::sync::Arc;

fn saturation_records() -> [ClausiusClapeyron; 2] {
    [
        ClausiusClapeyron {
            reference_temperature: 350.0,
            reference_pressure: 50000.0,
            vaporization_enthalpy: 35000.0,
        },
        ClausiusClapeyron {
            reference_temperature: 350.0,
            reference_pressure: 80000.0,
            vaporization_enthalpy: 32000.0,
        },
    ]
}

fn package() -> Arc<IdealMixture> {
    let [light, heavy] = saturation_records();
    Arc::new(
        IdealMixture::new(vec![
            PureParameters {
                saturation: light,
                liquid_heat_capacity: 130.0,
                vapor_heat_capacity: 90.0,
                liquid_molar_volume: 9.5e-5,
            },
            PureParameters {
                saturation: heavy,
                liquid_heat_capacity: 120.0,
                vapor_heat_capacity: 85.0,
                liquid_molar_volume: 8.9e-5,
            },
        ])
        .unwrap(),
    )
}

/// NRTL activity, truncated-virial vapor, and Poynting corrections all active.
fn nonideal_engine() -> PhaseqResult<FugacityEngine<IdealMixture>> {
    let package = package();
    let poynting = MolarVolumePoynting::new(
        package.liquid_molar_volumes(),
        saturation_records().to_vec(),
    )?;
    let virial = VirialFugacity::from_json(r#"{"b": [[-1.2e-3, -0.9e-3], [-0.9e-3, -0.7e-3]]}"#)?;
    FugacityEngine::new(
        package,
        Box::new(Nrtl::binary(0.6, 0.3, 0.3)),
        Box::new(virial),
        Box::new(poynting),
    )
}

fn vle_material(amounts: [f64; 2]) -> (MaterialIndexer, ThermalCondition) {
    let components = Arc::new(ComponentSet::new(["light", "heavy"]).unwrap());
    let mut material = MaterialIndexer::new(&components, &[Phase::Vapor, Phase::Liquid]).unwrap();
    material.set_amounts(Phase::Liquid, arr1(&amounts)).unwrap();
    (material, ThermalCondition::new(300.0, 1e5).unwrap())
}

#[test]
fn binary_bubble_point_reference_values() -> PhaseqResult<()> {
    let engine = FugacityEngine::ideal(package());
    let vle = PhaseEquilibrium::bubble_point(
        &engine,
        &arr1(&[0.5, 0.5]),
        TemperatureOrPressure::Temperature(350.0),
        None,
        Default::default(),
    )?;
    assert_relative_eq!(vle.pressure(), 65000.0, max_relative = 1e-8);
    assert_relative_eq!(vle.vapor_molefracs()[0], 5.0 / 13.0, max_relative = 1e-6);
    assert_relative_eq!(vle.vapor_molefracs()[1], 8.0 / 13.0, max_relative = 1e-6);
    Ok(())
}

#[test]
fn flash_conserves_mass_and_equalizes_fugacities() -> PhaseqResult<()> {
    let solver = VleSolver::new(nonideal_engine()?);
    let z = arr1(&[0.6, 0.4]);
    let bubble = PhaseEquilibrium::bubble_point(
        solver.engine(),
        &z,
        TemperatureOrPressure::Temperature(345.0),
        None,
        Default::default(),
    )?;
    let dew = PhaseEquilibrium::dew_point(
        solver.engine(),
        &z,
        TemperatureOrPressure::Temperature(345.0),
        None,
        Default::default(),
    )?;
    let pressure = 0.5 * (bubble.pressure() + dew.pressure());

    let (mut material, mut condition) = vle_material([1.2, 0.8]);
    let spec = FlashSpec::new().temperature(345.0).pressure(pressure);
    let vle = solver.solve(&mut material, &mut condition, spec, Default::default())?;

    let beta = vle.vapor_fraction();
    assert!(beta > 0.0 && beta < 1.0);
    assert!((vle.liquid_molefracs().sum() - 1.0).abs() < 1e-9);
    assert!((vle.vapor_molefracs().sum() - 1.0).abs() < 1e-9);

    // per-component totals survive the commit exactly
    let total = material.total_amounts();
    assert_relative_eq!(total[0], 1.2, max_relative = 1e-12);
    assert_relative_eq!(total[1], 0.8, max_relative = 1e-12);

    // fugacities of the committed phases agree across the full model stack
    let x = material.molefracs(Phase::Liquid)?.unwrap();
    let y = material.molefracs(Phase::Vapor)?.unwrap();
    let f_liquid = solver
        .engine()
        .liquid_fugacity(&x, condition.temperature(), condition.pressure())?;
    let f_vapor = solver
        .engine()
        .gas_fugacity(&y, condition.temperature(), condition.pressure())?;
    for i in 0..2 {
        assert_relative_eq!(f_liquid[i], f_vapor[i], max_relative = 1e-6);
    }
    Ok(())
}

#[test]
fn flash_liquid_sits_on_its_bubble_curve() -> PhaseqResult<()> {
    let engine = FugacityEngine::ideal(package());
    let solver = VleSolver::new(engine);
    let (mut material, mut condition) = vle_material([1.0, 1.0]);
    let spec = FlashSpec::new().temperature(350.0).pressure(63000.0);
    solver.solve(&mut material, &mut condition, spec, Default::default())?;

    let x = material.molefracs(Phase::Liquid)?.unwrap();
    let bubble = PhaseEquilibrium::bubble_point(
        solver.engine(),
        &x,
        TemperatureOrPressure::Temperature(350.0),
        None,
        Default::default(),
    )?;
    assert_relative_eq!(bubble.pressure(), 63000.0, max_relative = 1e-6);
    Ok(())
}

#[test]
fn repeated_solve_is_idempotent() -> PhaseqResult<()> {
    let solver = VleSolver::new(nonideal_engine()?);
    let (mut material, mut condition) = vle_material([1.0, 1.0]);
    let spec = FlashSpec::new().temperature(348.0).vapor_fraction(0.35);
    solver.solve(&mut material, &mut condition, spec.clone(), Default::default())?;
    let vapor = material.amounts(Phase::Vapor)?.clone();
    let pressure = condition.pressure();

    solver.solve(&mut material, &mut condition, spec, Default::default())?;
    assert_relative_eq!(condition.pressure(), pressure, max_relative = 1e-7);
    for i in 0..2 {
        assert_relative_eq!(
            material.amounts(Phase::Vapor)?[i],
            vapor[i],
            max_relative = 1e-6
        );
    }
    Ok(())
}

#[test]
fn vapor_fraction_spec_round_trips_through_tp() -> PhaseqResult<()> {
    let solver = VleSolver::new(FugacityEngine::ideal(package()));
    let (mut material, mut condition) = vle_material([1.0, 1.0]);
    let spec = FlashSpec::new().temperature(350.0).vapor_fraction(0.35);
    solver.solve(&mut material, &mut condition, spec, Default::default())?;
    assert_relative_eq!(
        material.amounts(Phase::Vapor)?.sum() / material.total_moles(),
        0.35,
        max_relative = 1e-6
    );

    // the resolved (T, p) pair reproduces the same split
    let (mut material2, mut condition2) = vle_material([1.0, 1.0]);
    let spec = FlashSpec::new()
        .temperature(350.0)
        .pressure(condition.pressure());
    let vle = solver.solve(&mut material2, &mut condition2, spec, Default::default())?;
    assert_relative_eq!(vle.vapor_fraction(), 0.35, max_relative = 1e-5);
    Ok(())
}

#[test]
fn overdetermined_flash_spec_leaves_material_untouched() {
    let solver = VleSolver::new(FugacityEngine::ideal(package()));
    let (mut material, mut condition) = vle_material([1.0, 1.0]);
    let spec = FlashSpec::new()
        .temperature(350.0)
        .pressure(63000.0)
        .vapor_fraction(0.5);
    let result = solver.solve(&mut material, &mut condition, spec, Default::default());
    assert!(matches!(result, Err(PhaseqError::Configuration(_))));
    assert_relative_eq!(condition.temperature(), 300.0);
    assert_relative_eq!(condition.pressure(), 1e5);
    assert_relative_eq!(material.amounts(Phase::Liquid).unwrap()[0], 1.0);
    assert_relative_eq!(material.amounts(Phase::Vapor).unwrap().sum(), 0.0);
}

#[test]
fn miscible_feed_collapses_to_single_liquid() -> PhaseqResult<()> {
    let engine = FugacityEngine::ideal(package());
    let solver = LleSolver::new(engine);
    let components = Arc::new(ComponentSet::new(["light", "heavy"])?);
    let mut material = MaterialIndexer::new(&components, &[Phase::Liquid1, Phase::Liquid2])?;
    material.set_amounts(Phase::Liquid1, arr1(&[0.7, 1.3]))?;

    let outcome = solver.solve(&mut material, 330.0, Default::default())?;
    assert!(matches!(outcome, LiquidLiquidOutcome::SinglePhase));
    assert_relative_eq!(material.amounts(Phase::Liquid1)?[1], 1.3);
    assert_relative_eq!(material.amounts(Phase::Liquid2)?.sum(), 0.0);
    Ok(())
}

#[test]
fn immiscible_feed_splits_into_two_liquids() -> PhaseqResult<()> {
    use phaseq::models::IdealCorrection;
    let engine = FugacityEngine::new(
        package(),
        Box::new(Nrtl::binary(3.5, 3.5, 0.2)),
        Box::new(IdealCorrection(2)),
        Box::new(IdealCorrection(2)),
    )?;
    let solver = LleSolver::new(engine);
    let components = Arc::new(ComponentSet::new(["light", "heavy"])?);
    let mut material = MaterialIndexer::new(&components, &[Phase::Liquid1, Phase::Liquid2])?;
    material.set_amounts(Phase::Liquid1, arr1(&[1.0, 1.0]))?;

    let outcome = solver.solve(&mut material, 320.0, Default::default())?;
    let LiquidLiquidOutcome::TwoPhase {
        liquid1_molefracs: x1,
        liquid2_molefracs: x2,
        ..
    } = outcome
    else {
        panic!("expected a two-phase split");
    };
    assert!((x1[0] - x2[0]).abs() > 0.5);

    let total = material.total_amounts();
    assert_relative_eq!(total[0], 1.0, max_relative = 1e-12);
    assert_relative_eq!(total[1], 1.0, max_relative = 1e-12);
    Ok(())
}
