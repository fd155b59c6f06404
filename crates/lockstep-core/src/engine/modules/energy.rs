use super::{Module, ModuleCategory, ModuleContext, TargetPolicy};
use crate::core::data::Data1D;
use crate::core::forcefield::term::EnergyTerm;
use crate::core::kernel::{EnergyKernel, PairSum};
use crate::core::models::configuration::Configuration;
use crate::engine::error::EngineError;
use crate::engine::keywords::{KeywordList, KeywordValue};
use tracing::{debug, info, instrument, warn};

/// Total pair energy of each target, with a history and a stability test.
///
/// Per target `<cfg>` the module stores, in its own scope:
/// - `<cfg>//Terms` ([`EnergyTerm`]) and `<cfg>//Total` (`f64`) for the current configuration;
/// - `<cfg>//History` ([`Data1D`]) of total energy against iteration;
/// - `<cfg>//Gradient` (`f64`) and `<cfg>//Stable` (`bool`) from the stability test;
/// - `<cfg>//Version` (`u64`), the contents version the stored energy belongs to.
///
/// The energy is only recomputed when the configuration changed since the last run.
#[derive(Debug, Clone)]
pub struct EnergyModule {
    keywords: KeywordList,
}

impl Default for EnergyModule {
    fn default() -> Self {
        let mut keywords = KeywordList::new();
        keywords
            .define(
                "StabilityWindow",
                "Number of points over which to assess the stability of the energy",
                KeywordValue::Int(10),
            )
            .define(
                "StabilityThreshold",
                "Relative gradient below which the energy is deemed stable over the window",
                KeywordValue::Double(0.01),
            )
            .define(
                "Test",
                "Check the distributed energy against a serial per-atom evaluation",
                KeywordValue::Bool(false),
            )
            .define(
                "TestThreshold",
                "Percentage deviation at which the test comparison fails",
                KeywordValue::Double(0.1),
            );
        Self { keywords }
    }
}

impl EnergyModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for EnergyModule {
    fn type_name(&self) -> &'static str {
        "Energy"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Forcefield
    }

    fn brief(&self) -> &'static str {
        "Calculate the total energy of a configuration"
    }

    fn target_policy(&self) -> TargetPolicy {
        TargetPolicy::OneOrMore
    }

    fn keywords(&self) -> &KeywordList {
        &self.keywords
    }

    fn keywords_mut(&mut self) -> &mut KeywordList {
        &mut self.keywords
    }

    fn create_instance(&self) -> Box<dyn Module> {
        Box::new(EnergyModule::new())
    }

    #[instrument(skip_all, name = "energy_module")]
    fn run(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), EngineError> {
        let window = usize::try_from(self.keywords.get_int("StabilityWindow")?).unwrap_or(0);
        let threshold = self.keywords.get_double("StabilityThreshold")?;
        let test = self.keywords.get_bool("Test")?;
        let test_threshold = self.keywords.get_double("TestThreshold")?;

        for target in ctx.targets.iter() {
            let cfg: &Configuration = target;
            let item = |suffix: &str| format!("{}//{}", cfg.name(), suffix);

            let cached_here = ctx
                .items
                .retrieve::<u64>(&item("Version"), &ctx.scope)
                .is_ok_and(|&version| version == cfg.contents_version())
                && ctx.items.contains(&item("Terms"), &ctx.scope);
            // The recalculation is collective, so every worker must take the same branch.
            let cached = ctx.pool.all_true(cached_here)?;
            let terms = if cached {
                debug!(configuration = cfg.name(), "Configuration unchanged, reusing energy.");
                *ctx.items.retrieve::<EnergyTerm>(&item("Terms"), &ctx.scope)?
            } else {
                let kernel = EnergyKernel::new(cfg, ctx.potentials)?;
                let terms = kernel.total_pair_energy(ctx.pool, PairSum::new())?;
                if test {
                    verify_against_serial(&kernel, cfg, terms.total(), test_threshold)?;
                }
                ctx.items.insert(&item("Terms"), &ctx.scope, terms)?;
                ctx.items
                    .insert(&item("Version"), &ctx.scope, cfg.contents_version())?;
                terms
            };
            let total = terms.total();
            ctx.items.insert(&item("Total"), &ctx.scope, total)?;

            let history = ctx.items.realise::<Data1D>(&item("History"), &ctx.scope)?;
            if history.is_empty() {
                history.tag = item("History");
            }
            history.push(ctx.iteration as f64, total);

            let (gradient, stable) = match stability(history.y(), window, threshold) {
                Some(result) => result,
                None => {
                    debug!(
                        points = history.len(),
                        window, "Too few points to assess energy stability."
                    );
                    (0.0, false)
                }
            };
            ctx.items.insert(&item("Gradient"), &ctx.scope, gradient)?;
            ctx.items.insert(&item("Stable"), &ctx.scope, stable)?;

            info!(
                configuration = cfg.name(),
                total,
                short_range = terms.short_range,
                coulomb = terms.coulomb,
                gradient,
                stable,
                "Energy calculated."
            );
        }
        Ok(())
    }
}

/// Least-squares gradient of the last `window` values and whether its magnitude is below
/// `threshold` times their mean. `None` if fewer than `window` values exist.
fn stability(values: &[f64], window: usize, threshold: f64) -> Option<(f64, bool)> {
    if window < 2 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    let n = window as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = tail.iter().sum::<f64>() / n;

    let (sxy, sxx) = tail
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });
    let gradient = sxy / sxx;
    Some((gradient, gradient.abs() < (threshold * y_mean).abs()))
}

fn verify_against_serial(
    kernel: &EnergyKernel<'_>,
    cfg: &Configuration,
    production: f64,
    threshold_percent: f64,
) -> Result<(), EngineError> {
    let mut reference = 0.0;
    for index in 0..cfg.n_atoms() {
        reference += kernel.atom_energy_by_index(index)?.total();
    }
    // Each pair is counted from both atoms.
    reference *= 0.5;

    let deviation = if reference.abs() > f64::EPSILON {
        100.0 * ((production - reference) / reference).abs()
    } else {
        (production - reference).abs()
    };
    if deviation > threshold_percent {
        warn!(production, reference, deviation, "Energy test failed.");
        return Err(EngineError::TestFailed {
            quantity: format!("energy of '{}'", cfg.name()),
            deviation,
            threshold: threshold_percent,
        });
    }
    debug!(production, reference, deviation, "Energy test passed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{argon_lattice, argon_potentials};
    use super::*;
    use crate::core::items::{ItemStore, Scope};
    use crate::core::pool::{LocalPool, ProcessPool, SerialPool};
    use crate::engine::progress::ProgressReporter;
    use nalgebra::Point3;

    fn run_energy(
        module: &mut EnergyModule,
        cfg: &mut Configuration,
        items: &mut ItemStore,
        iteration: usize,
    ) -> Result<(), EngineError> {
        let potentials = argon_potentials();
        let reporter = ProgressReporter::new();
        let mut ctx = ModuleContext {
            pool: &SerialPool,
            targets: vec![cfg],
            items,
            scope: Scope::module("energy01"),
            potentials: &potentials,
            reporter: &reporter,
            iteration,
        };
        module.run(&mut ctx)
    }

    #[test]
    fn stability_requires_a_full_window() {
        assert_eq!(stability(&[1.0, 1.0], 3, 0.01), None);
        let (gradient, stable) = stability(&[5.0, -10.0, -10.0, -10.0], 3, 0.01).unwrap();
        assert_eq!(gradient, 0.0);
        assert!(stable);
    }

    #[test]
    fn stability_detects_a_drifting_energy() {
        let drifting: Vec<f64> = (0..10).map(|i| -100.0 + 5.0 * i as f64).collect();
        let (gradient, stable) = stability(&drifting, 10, 0.01).unwrap();
        assert!((gradient - 5.0).abs() < 1e-12);
        assert!(!stable);
    }

    #[test]
    fn run_stores_energy_history_and_caches_on_unchanged_contents() {
        let mut module = EnergyModule::new();
        module
            .keywords_mut()
            .set("StabilityWindow", KeywordValue::Int(3))
            .unwrap();
        let mut cfg = argon_lattice("lattice", 3, 3.8);
        let mut items = ItemStore::with_standard_types();
        let scope = Scope::module("energy01");

        for iteration in 1..=3 {
            run_energy(&mut module, &mut cfg, &mut items, iteration).unwrap();
        }

        let total = *items.retrieve::<f64>("lattice//Total", &scope).unwrap();
        assert!(total < 0.0, "argon lattice near its minimum is bound");
        let history = items.retrieve::<Data1D>("lattice//History", &scope).unwrap();
        assert_eq!(history.x(), &[1.0, 2.0, 3.0]);
        assert!(*items.retrieve::<bool>("lattice//Stable", &scope).unwrap());
        assert_eq!(
            items.version("lattice//Terms", &scope),
            Some(1),
            "unchanged configuration is not recomputed"
        );

        cfg.set_atom_position(0, Point3::new(0.5, 0.0, 0.0)).unwrap();
        run_energy(&mut module, &mut cfg, &mut items, 4).unwrap();
        assert_eq!(items.version("lattice//Terms", &scope), Some(2));
        assert_ne!(*items.retrieve::<f64>("lattice//Total", &scope).unwrap(), total);
    }

    #[test]
    fn test_mode_agrees_with_the_serial_evaluation() {
        let mut module = EnergyModule::new();
        module
            .keywords_mut()
            .set("Test", KeywordValue::Bool(true))
            .unwrap();
        let mut cfg = argon_lattice("lattice", 3, 3.8);
        let mut items = ItemStore::new();
        run_energy(&mut module, &mut cfg, &mut items, 1).unwrap();
    }

    #[test]
    fn distributed_energy_is_identical_on_every_worker() {
        let totals = LocalPool::run(4, |pool| {
            let mut module = EnergyModule::new();
            let mut cfg = argon_lattice("lattice", 3, 3.8);
            let mut items = ItemStore::new();
            let potentials = argon_potentials();
            let reporter = ProgressReporter::new();
            let mut ctx = ModuleContext {
                pool: &pool,
                targets: vec![&mut cfg],
                items: &mut items,
                scope: Scope::module("energy01"),
                potentials: &potentials,
                reporter: &reporter,
                iteration: 1,
            };
            module.run(&mut ctx).map_err(|e| e.to_string())?;
            items
                .retrieve::<f64>("lattice//Total", &Scope::module("energy01"))
                .copied()
                .map_err(|e| e.to_string())
        })
        .unwrap();

        let serial = {
            let cfg = argon_lattice("lattice", 3, 3.8);
            EnergyKernel::new(&cfg, &argon_potentials())
                .unwrap()
                .total_pair_energy(&SerialPool, PairSum::new())
                .unwrap()
                .total()
        };
        for total in totals {
            assert!((total.unwrap() - serial).abs() < 1e-9);
        }
    }

    #[test]
    fn workers_with_diverging_caches_recompute_together() {
        let versions = LocalPool::run(2, |pool| {
            let mut module = EnergyModule::new();
            let mut cfg = argon_lattice("lattice", 3, 3.8);
            let mut items = ItemStore::new();
            let potentials = argon_potentials();
            let reporter = ProgressReporter::new();
            let scope = Scope::module("energy01");

            for iteration in 1..=2 {
                if iteration == 2 && pool.rank() == 1 {
                    items.remove("lattice//Version", &scope);
                }
                let mut ctx = ModuleContext {
                    pool: &pool,
                    targets: vec![&mut cfg],
                    items: &mut items,
                    scope: scope.clone(),
                    potentials: &potentials,
                    reporter: &reporter,
                    iteration,
                };
                module.run(&mut ctx).map_err(|e| e.to_string())?;
            }
            Ok::<_, String>(items.version("lattice//Terms", &scope))
        })
        .unwrap();

        for version in versions {
            assert_eq!(version.unwrap(), Some(2));
        }
    }
}
