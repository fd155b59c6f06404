use super::{Module, ModuleCategory, ModuleContext, TargetPolicy};
use crate::engine::context::{ExecutionContext, NodeContext};
use crate::engine::error::EngineError;
use crate::engine::keywords::{KeywordList, KeywordSignal, KeywordValue};
use crate::engine::procedure::{NodeKind, Normalisation, Procedure, SelectNode};
use tracing::{debug, info, instrument, warn};

const CLEARS_RESULTS: &[KeywordSignal] = &[KeywordSignal::ClearModuleData];

/// Site-site radial distribution function between two atom types of one configuration.
///
/// Runs an internal analysis procedure:
///
/// ```text
/// Select A
///   ForEach: Select B (not the same site as A)
///     ForEach: CalculateDistance A-B, Collect1D "Histogram"
/// Process1D "RDF" (per A site, per shell volume, per B number density)
/// ```
///
/// The histogram and the normalised `Data1D` are stored as `Histogram` and `RDF` in the
/// module scope. The procedure is rebuilt whenever a keyword changes.
#[derive(Debug, Clone)]
pub struct SiteRdfModule {
    keywords: KeywordList,
    procedure: Option<Procedure>,
    built_for: Option<u64>,
}

impl Default for SiteRdfModule {
    fn default() -> Self {
        let mut keywords = KeywordList::new();
        keywords
            .define_with_signals(
                "SiteA",
                "Atom type of the central sites",
                KeywordValue::String(String::new()),
                CLEARS_RESULTS,
            )
            .define_with_signals(
                "SiteB",
                "Atom type of the surrounding sites",
                KeywordValue::String(String::new()),
                CLEARS_RESULTS,
            )
            .define_with_signals(
                "RangeMin",
                "Lower limit of the distance axis",
                KeywordValue::Double(0.0),
                CLEARS_RESULTS,
            )
            .define_with_signals(
                "RangeMax",
                "Upper limit of the distance axis",
                KeywordValue::Double(10.0),
                CLEARS_RESULTS,
            )
            .define_with_signals(
                "BinWidth",
                "Bin width of the distance axis",
                KeywordValue::Double(0.05),
                CLEARS_RESULTS,
            )
            .define_with_signals(
                "ExcludeSameMolecule",
                "Whether to exclude correlations between sites in the same molecule",
                KeywordValue::Bool(false),
                CLEARS_RESULTS,
            );
        Self {
            keywords,
            procedure: None,
            built_for: None,
        }
    }
}

impl SiteRdfModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(&self) -> Option<&Procedure> {
        self.procedure.as_ref()
    }

    fn build_procedure(&self) -> Result<Procedure, EngineError> {
        let site_a = self.keywords.get_string("SiteA")?;
        let site_b = self.keywords.get_string("SiteB")?;
        if site_a.is_empty() || site_b.is_empty() {
            return Err(EngineError::InvalidState(
                "both SiteA and SiteB must be set".to_string(),
            ));
        }
        let exclude_same_molecule = self.keywords.get_bool("ExcludeSameMolecule")?;

        let mut procedure = Procedure::new("SiteRDF", NodeContext::Analysis);
        let root = procedure.root();
        let a = procedure.add(root, "A", NodeKind::Select(SelectNode::new(site_a)))?;
        let a_branch = procedure
            .branch(a)
            .ok_or_else(|| EngineError::Internal("select node without branch".to_string()))?;

        let mut select_b = SelectNode::new(site_b).excluding_same_site(a);
        if exclude_same_molecule {
            select_b = select_b.excluding_same_molecule(a);
        }
        let b = procedure.add(a_branch, "B", NodeKind::Select(select_b))?;
        let b_branch = procedure
            .branch(b)
            .ok_or_else(|| EngineError::Internal("select node without branch".to_string()))?;

        let distance = procedure.add(b_branch, "DistanceAB", NodeKind::CalculateDistance { i: a, j: b })?;
        let histogram = procedure.add(
            b_branch,
            "Histogram",
            NodeKind::Collect1D {
                observable: distance,
                minimum: self.keywords.get_double("RangeMin")?,
                maximum: self.keywords.get_double("RangeMax")?,
                bin_width: self.keywords.get_double("BinWidth")?,
            },
        )?;
        procedure.add(
            root,
            "RDF",
            NodeKind::Process1D {
                source: histogram,
                normalisations: vec![
                    Normalisation::SitePopulation(a),
                    Normalisation::SphericalShellVolume,
                    Normalisation::NumberDensity(b),
                ],
            },
        )?;
        Ok(procedure)
    }
}

impl Module for SiteRdfModule {
    fn type_name(&self) -> &'static str {
        "SiteRDF"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Analysis
    }

    fn brief(&self) -> &'static str {
        "Calculate the radial distribution function between two sites"
    }

    fn target_policy(&self) -> TargetPolicy {
        TargetPolicy::ExactlyOne
    }

    fn keywords(&self) -> &KeywordList {
        &self.keywords
    }

    fn keywords_mut(&mut self) -> &mut KeywordList {
        &mut self.keywords
    }

    fn create_instance(&self) -> Box<dyn Module> {
        Box::new(SiteRdfModule::new())
    }

    fn handle_signal(&mut self, signal: KeywordSignal) {
        if signal == KeywordSignal::ClearModuleData {
            self.procedure = None;
        }
    }

    #[instrument(skip_all, name = "site_rdf_module")]
    fn run(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), EngineError> {
        let version = self.keywords.version();
        if self.procedure.is_none() || self.built_for != Some(version) {
            debug!(version, "Building analysis procedure.");
            self.procedure = Some(self.build_procedure()?);
            self.built_for = Some(version);
        }
        let procedure = self
            .procedure
            .as_mut()
            .ok_or_else(|| EngineError::Internal("analysis procedure missing".to_string()))?;

        let n_targets = ctx.targets.len();
        let [target] = ctx.targets.as_mut_slice() else {
            return Err(EngineError::InvalidState(format!(
                "expected exactly one target configuration, found {}",
                n_targets
            )));
        };
        let range_max = self.keywords.get_double("RangeMax")?;
        if let Some(radius) = target.periodic_box().inscribed_radius() {
            if range_max > radius {
                warn!(
                    range_max,
                    inscribed_radius = radius,
                    "Distance range exceeds half the box; the RDF beyond it is unreliable."
                );
            }
        }

        let mut exec = ExecutionContext::new(
            ctx.pool,
            &mut *ctx.items,
            NodeContext::Analysis,
            ctx.scope.clone(),
        )
        .with_configuration(&mut **target);
        procedure.run(&mut exec)?;

        let (site_a, site_b) = (
            self.keywords.get_string("SiteA")?,
            self.keywords.get_string("SiteB")?,
        );
        info!(
            configuration = target.name(),
            site_a,
            site_b,
            "Site RDF accumulated."
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{argon_lattice, argon_potentials};
    use super::*;
    use crate::core::data::{Data1D, Histogram1D};
    use crate::core::items::{ItemStore, Scope};
    use crate::core::models::cell::spherical_shell_volume;
    use crate::core::pool::SerialPool;
    use crate::engine::progress::ProgressReporter;

    fn configured() -> SiteRdfModule {
        let mut module = SiteRdfModule::new();
        let keywords = module.keywords_mut();
        keywords
            .set("SiteA", KeywordValue::String("Ar".to_string()))
            .unwrap();
        keywords
            .set("SiteB", KeywordValue::String("Ar".to_string()))
            .unwrap();
        keywords.set("RangeMax", KeywordValue::Double(6.0)).unwrap();
        keywords.set("BinWidth", KeywordValue::Double(0.1)).unwrap();
        module
    }

    #[test]
    fn keyword_changes_raise_clear_signals() {
        let mut module = SiteRdfModule::new();
        let signals = module
            .keywords_mut()
            .set("BinWidth", KeywordValue::Double(0.2))
            .unwrap();
        assert_eq!(signals, vec![KeywordSignal::ClearModuleData]);
    }

    #[test]
    fn run_without_sites_fails() {
        let mut module = SiteRdfModule::new();
        let mut cfg = argon_lattice("lattice", 2, 4.0);
        let mut items = ItemStore::new();
        let potentials = argon_potentials();
        let reporter = ProgressReporter::new();
        let mut ctx = ModuleContext {
            pool: &SerialPool,
            targets: vec![&mut cfg],
            items: &mut items,
            scope: Scope::module("rdf01"),
            potentials: &potentials,
            reporter: &reporter,
            iteration: 1,
        };
        assert!(matches!(
            module.run(&mut ctx),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn lattice_rdf_integrates_to_the_first_shell_coordination() {
        let mut module = configured();
        let mut cfg = argon_lattice("lattice", 4, 4.0);
        let mut items = ItemStore::with_standard_types();
        let potentials = argon_potentials();
        let reporter = ProgressReporter::new();
        let mut ctx = ModuleContext {
            pool: &SerialPool,
            targets: vec![&mut cfg],
            items: &mut items,
            scope: Scope::module("rdf01"),
            potentials: &potentials,
            reporter: &reporter,
            iteration: 1,
        };
        module.run(&mut ctx).unwrap();

        let scope = Scope::module("rdf01");
        let histogram = items.retrieve::<Histogram1D>("Histogram", &scope).unwrap();
        assert_eq!(histogram.n_binned() + histogram.n_missed(), 64 * 63);

        let rdf = items.retrieve::<Data1D>("RDF", &scope).unwrap();
        assert!(rdf.iter().filter(|(r, _)| *r < 3.9).all(|(_, g)| g == 0.0));

        // Six nearest neighbours at the lattice spacing, none other below 4.5.
        let density = 63.0 / 4096.0;
        let coordination: f64 = rdf
            .iter()
            .filter(|(r, _)| *r < 4.5)
            .map(|(r, g)| g * density * spherical_shell_volume(r - 0.05, r + 0.05))
            .sum();
        assert!((coordination - 6.0).abs() < 1e-6);
    }

    #[test]
    fn changing_a_keyword_rebuilds_the_procedure() {
        let mut module = configured();
        let mut cfg = argon_lattice("lattice", 3, 4.0);
        let mut items = ItemStore::new();
        let potentials = argon_potentials();
        let reporter = ProgressReporter::new();
        let scope = Scope::module("rdf01");

        for bin_width in [0.1, 0.5] {
            module
                .keywords_mut()
                .set("BinWidth", KeywordValue::Double(bin_width))
                .unwrap();
            let mut ctx = ModuleContext {
                pool: &SerialPool,
                targets: vec![&mut cfg],
                items: &mut items,
                scope: scope.clone(),
                potentials: &potentials,
                reporter: &reporter,
                iteration: 1,
            };
            module.run(&mut ctx).unwrap();
        }

        let histogram = items.retrieve::<Histogram1D>("Histogram", &scope).unwrap();
        assert_eq!(histogram.n_bins(), 12);
        assert_eq!(histogram.n_binned() + histogram.n_missed(), 27 * 26);
    }
}
