use crate::core::forcefield::params::PotentialMap;
use crate::core::items::ItemStore;
use crate::core::models::configuration::{Configuration, ConfigurationSet};
use crate::core::models::ids::ConfigurationId;
use crate::core::pool::ProcessPool;
use crate::engine::config::RunConfig;
use crate::engine::context::NodeContext;
use crate::engine::error::EngineError;
use crate::engine::modules::ModuleLayer;
use crate::engine::procedure::Procedure;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::task::Task;
use tracing::{info, instrument, warn};

/// Everything one worker holds for a simulation.
///
/// Every worker of a pool builds an identical `Simulation` and calls [`Simulation::run`]
/// with its own pool handle.
#[derive(Debug)]
pub struct Simulation {
    configurations: ConfigurationSet,
    generators: Vec<(ConfigurationId, Task)>,
    layer: ModuleLayer,
    potentials: PotentialMap,
    items: ItemStore,
    iteration: usize,
}

impl Simulation {
    pub fn new(potentials: PotentialMap) -> Self {
        Self {
            configurations: ConfigurationSet::new(),
            generators: Vec::new(),
            layer: ModuleLayer::new(),
            potentials,
            items: ItemStore::with_standard_types(),
            iteration: 0,
        }
    }

    /// Adds a configuration, optionally with a generation procedure that builds its
    /// contents when the simulation starts.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Configuration`] if the name is already used.
    /// - [`EngineError::InvalidState`] if `generator` is not a Generation procedure.
    pub fn add_configuration(
        &mut self,
        configuration: Configuration,
        generator: Option<Procedure>,
    ) -> Result<ConfigurationId, EngineError> {
        if let Some(procedure) = &generator {
            if procedure.context() != NodeContext::Generation {
                return Err(EngineError::InvalidState(format!(
                    "generator '{}' of configuration '{}' must be a Generation procedure",
                    procedure.name(),
                    configuration.name()
                )));
            }
        }
        let name = configuration.name().to_string();
        let id = self.configurations.add(configuration)?;
        if let Some(procedure) = generator {
            self.generators
                .push((id, Task::new(format!("Generate '{}'", name), procedure)));
        }
        Ok(id)
    }

    pub fn configurations(&self) -> &ConfigurationSet {
        &self.configurations
    }

    pub fn layer(&self) -> &ModuleLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut ModuleLayer {
        &mut self.layer
    }

    pub fn potentials(&self) -> &PotentialMap {
        &self.potentials
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut ItemStore {
        &mut self.items
    }

    /// Number of iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Sets a module keyword from text, applying any signal the change raises.
    pub fn set_keyword(
        &mut self,
        instance: &str,
        keyword: &str,
        text: &str,
    ) -> Result<(), EngineError> {
        self.layer
            .set_keyword_str(instance, keyword, text, &mut self.items)?;
        Ok(())
    }

    /// Runs the generation task of every configuration that has one.
    #[instrument(skip_all, name = "generate_configurations")]
    pub fn generate(
        &mut self,
        pool: &dyn ProcessPool,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        for (id, task) in &mut self.generators {
            let configuration = self.configurations.get_mut(*id).ok_or_else(|| {
                EngineError::Internal(format!("generator target {:?} disappeared", id))
            })?;
            task.execute(pool, Some(&mut *configuration), &mut self.items, reporter)?;
            info!(
                configuration = configuration.name(),
                n_atoms = configuration.n_atoms(),
                n_molecules = configuration.n_molecules(),
                "Configuration generated."
            );
        }
        Ok(())
    }

    /// Runs `config.iterations` further iterations of the module layer.
    ///
    /// After each iteration the item store of `config.broadcast_root` is replicated onto
    /// every worker and, if `config.check_consistency` is set, the stores are compared.
    ///
    /// # Errors
    ///
    /// - [`EngineError::TargetCount`] if the layer is wired incorrectly; nothing runs.
    /// - [`EngineError::ModuleFailed`] naming the failing module instance.
    /// - [`EngineError::Item`] if the broadcast fails.
    /// - [`EngineError::Inconsistent`] listing the items that differ between workers.
    #[instrument(skip_all, name = "iterate", fields(rank = pool.rank()))]
    pub fn iterate(
        &mut self,
        pool: &dyn ProcessPool,
        config: &RunConfig,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        self.layer.check()?;
        pool.check_root(config.broadcast_root)?;
        let last = self.iteration + config.iterations;

        for _ in 0..config.iterations {
            self.iteration += 1;
            reporter.report(Progress::IterationStart {
                iteration: self.iteration,
                total: last,
            });

            self.layer.run(
                self.iteration,
                pool,
                &mut self.configurations,
                &mut self.items,
                &self.potentials,
                reporter,
            )?;

            self.items.broadcast_all(pool, config.broadcast_root)?;
            if config.check_consistency {
                let keys = self
                    .items
                    .check_consistency(pool, config.broadcast_root)?;
                if !keys.is_empty() {
                    warn!(iteration = self.iteration, items = keys.len(), "Item stores diverged.");
                    return Err(EngineError::Inconsistent { keys });
                }
            }

            reporter.report(Progress::IterationFinish);
        }

        info!(
            iterations = config.iterations,
            items = self.items.len(),
            "Iterations complete."
        );
        Ok(())
    }

    /// Generates configurations on the first call, then iterates.
    pub fn run(
        &mut self,
        pool: &dyn ProcessPool,
        config: &RunConfig,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        if self.iteration == 0 {
            self.generate(pool, reporter)?;
        }
        self.iterate(pool, config, reporter)
    }
}
