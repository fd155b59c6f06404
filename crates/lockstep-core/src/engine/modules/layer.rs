use super::{Module, ModuleContext};
use crate::core::forcefield::params::PotentialMap;
use crate::core::items::{ItemStore, Scope};
use crate::core::models::configuration::ConfigurationSet;
use crate::core::models::ids::ConfigurationId;
use crate::core::pool::ProcessPool;
use crate::engine::error::EngineError;
use crate::engine::keywords::{KeywordSignal, KeywordValue};
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument};

/// A module wired into a layer under a unique name.
#[derive(Debug)]
pub struct ModuleInstance {
    name: String,
    module: Box<dyn Module>,
    targets: Vec<ConfigurationId>,
    frequency: usize,
    enabled: bool,
}

impl ModuleInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn targets(&self) -> &[ConfigurationId] {
        &self.targets
    }

    /// The instance runs on iterations that are a multiple of this value.
    pub fn frequency(&self) -> usize {
        self.frequency
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Item-store scope owning this instance's results.
    pub fn scope(&self) -> Scope {
        Scope::module(self.name.as_str())
    }

    fn runs_on(&self, iteration: usize) -> bool {
        self.enabled && iteration % self.frequency == 0
    }
}

/// Ordered list of module instances run once per iteration.
#[derive(Debug, Default)]
pub struct ModuleLayer {
    instances: Vec<ModuleInstance>,
}

impl ModuleLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `module` under `name`, wired to `targets`, running every iteration.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if the name is already taken.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        module: Box<dyn Module>,
        targets: Vec<ConfigurationId>,
    ) -> Result<&mut ModuleInstance, EngineError> {
        let name = name.into();
        if self.instance(&name).is_some() {
            return Err(EngineError::InvalidState(format!(
                "a module instance named '{}' already exists",
                name
            )));
        }
        self.instances.push(ModuleInstance {
            name,
            module,
            targets,
            frequency: 1,
            enabled: true,
        });
        self.instances
            .last_mut()
            .ok_or_else(|| EngineError::Internal("module instance vanished".to_string()))
    }

    pub fn instance(&self, name: &str) -> Option<&ModuleInstance> {
        self.instances.iter().find(|i| i.name == name)
    }

    fn instance_mut(&mut self, name: &str) -> Result<&mut ModuleInstance, EngineError> {
        self.instances
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| EngineError::InvalidState(format!("no module instance named '{}'", name)))
    }

    pub fn instances(&self) -> impl Iterator<Item = &ModuleInstance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn set_frequency(&mut self, name: &str, frequency: usize) -> Result<(), EngineError> {
        if frequency == 0 {
            return Err(EngineError::InvalidState(format!(
                "frequency of module instance '{}' must be at least one",
                name
            )));
        }
        self.instance_mut(name)?.frequency = frequency;
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.instance_mut(name)?.enabled = enabled;
        Ok(())
    }

    /// Sets a keyword of an instance and applies the signals the change raises.
    ///
    /// `ClearModuleData` removes every item in the instance's scope. All signals are then
    /// forwarded to the module itself.
    pub fn set_keyword(
        &mut self,
        name: &str,
        keyword: &str,
        value: KeywordValue,
        items: &mut ItemStore,
    ) -> Result<Vec<KeywordSignal>, EngineError> {
        let instance = self.instance_mut(name)?;
        let signals = instance.module.keywords_mut().set(keyword, value)?;
        Self::apply_signals(instance, &signals, items);
        Ok(signals)
    }

    /// As [`ModuleLayer::set_keyword`], parsing `text` according to the keyword's kind.
    pub fn set_keyword_str(
        &mut self,
        name: &str,
        keyword: &str,
        text: &str,
        items: &mut ItemStore,
    ) -> Result<Vec<KeywordSignal>, EngineError> {
        let instance = self.instance_mut(name)?;
        let signals = instance.module.keywords_mut().set_from_str(keyword, text)?;
        Self::apply_signals(instance, &signals, items);
        Ok(signals)
    }

    fn apply_signals(instance: &mut ModuleInstance, signals: &[KeywordSignal], items: &mut ItemStore) {
        for &signal in signals {
            if signal == KeywordSignal::ClearModuleData {
                let removed = items.clear_scope(&instance.scope());
                debug!(module = %instance.name, removed, "Cleared module data.");
            }
            instance.module.handle_signal(signal);
        }
    }

    /// Verifies every instance's target count against its module's policy and that no
    /// instance lists a target twice.
    pub fn check(&self) -> Result<(), EngineError> {
        for instance in &self.instances {
            let targets = &instance.targets;
            if (1..targets.len()).any(|n| targets[..n].contains(&targets[n])) {
                return Err(EngineError::RepeatedTarget {
                    module: instance.name.clone(),
                });
            }
            let policy = instance.module.target_policy();
            if !policy.accepts(instance.targets.len()) {
                return Err(EngineError::TargetCount {
                    module: instance.name.clone(),
                    policy,
                    found: instance.targets.len(),
                });
            }
        }
        Ok(())
    }

    /// Runs every enabled instance due on `iteration` (one-based), in order.
    ///
    /// The whole layer is checked first, so a wiring error is reported before any module
    /// runs. The first module failure stops the layer.
    #[instrument(skip_all, name = "module_layer", fields(iteration = iteration))]
    pub fn run(
        &mut self,
        iteration: usize,
        pool: &dyn ProcessPool,
        configurations: &mut ConfigurationSet,
        items: &mut ItemStore,
        potentials: &PotentialMap,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        self.check()?;

        for instance in self.instances.iter_mut().filter(|i| i.runs_on(iteration)) {
            reporter.report(Progress::ModuleStart {
                name: instance.name.clone(),
            });
            info!(module = %instance.name, kind = instance.module.type_name(), "Running module.");

            let scope = instance.scope();
            let targets = configurations.targets_mut(&instance.targets)?;
            let mut ctx = ModuleContext {
                pool,
                targets,
                items: &mut *items,
                scope,
                potentials,
                reporter,
                iteration,
            };
            instance
                .module
                .run(&mut ctx)
                .map_err(|e| EngineError::ModuleFailed {
                    module: instance.name.clone(),
                    source: Box::new(e),
                })?;

            reporter.report(Progress::ModuleFinish);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{argon_lattice, argon_potentials};
    use super::super::{EnergyModule, ModuleRegistry, SiteRdfModule, TargetPolicy};
    use super::*;
    use crate::core::data::Histogram1D;
    use crate::core::pool::SerialPool;
    use std::sync::Mutex;

    fn setup() -> (ConfigurationSet, ConfigurationId, ConfigurationId) {
        let mut configurations = ConfigurationSet::new();
        let a = configurations.add(argon_lattice("a", 3, 3.8)).unwrap();
        let b = configurations.add(argon_lattice("b", 2, 3.8)).unwrap();
        (configurations, a, b)
    }

    #[test]
    fn target_count_violation_is_rejected_before_any_module_runs() {
        let (mut configurations, a, b) = setup();
        let mut layer = ModuleLayer::new();
        layer
            .add("energy01", Box::new(EnergyModule::new()), vec![a])
            .unwrap();
        layer
            .add("rdf01", Box::new(SiteRdfModule::new()), vec![a, b])
            .unwrap();

        let mut items = ItemStore::new();
        let result = layer.run(
            1,
            &SerialPool,
            &mut configurations,
            &mut items,
            &argon_potentials(),
            &ProgressReporter::new(),
        );
        match result {
            Err(EngineError::TargetCount {
                module,
                policy,
                found,
            }) => {
                assert_eq!(module, "rdf01");
                assert_eq!(policy, TargetPolicy::ExactlyOne);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(items.is_empty(), "energy module must not have run");
    }

    #[test]
    fn repeated_targets_are_rejected_before_any_module_runs() {
        let (mut configurations, a, b) = setup();
        let mut layer = ModuleLayer::new();
        layer
            .add("energy01", Box::new(EnergyModule::new()), vec![a, b])
            .unwrap();
        layer
            .add("energy02", Box::new(EnergyModule::new()), vec![b, b])
            .unwrap();
        assert!(matches!(
            layer.check(),
            Err(EngineError::RepeatedTarget { module }) if module == "energy02"
        ));

        let mut items = ItemStore::new();
        let result = layer.run(
            1,
            &SerialPool,
            &mut configurations,
            &mut items,
            &argon_potentials(),
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::RepeatedTarget { .. })));
        assert!(items.is_empty(), "energy01 must not have run");
    }

    #[test]
    fn duplicate_instance_names_are_rejected() {
        let (_, a, _) = setup();
        let mut layer = ModuleLayer::new();
        layer
            .add("energy01", Box::new(EnergyModule::new()), vec![a])
            .unwrap();
        assert!(
            layer
                .add("energy01", Box::new(EnergyModule::new()), vec![a])
                .is_err()
        );
    }

    #[test]
    fn frequency_and_enabled_control_which_modules_run() {
        let (mut configurations, a, b) = setup();
        let mut layer = ModuleLayer::new();
        layer
            .add("every", Box::new(EnergyModule::new()), vec![a])
            .unwrap();
        layer
            .add("second", Box::new(EnergyModule::new()), vec![b])
            .unwrap();
        layer
            .add("never", Box::new(EnergyModule::new()), vec![a, b])
            .unwrap();
        layer.set_frequency("second", 2).unwrap();
        layer.set_enabled("never", false).unwrap();
        assert!(layer.set_frequency("every", 0).is_err());

        let started = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::ModuleStart { name } = event {
                started.lock().unwrap().push(name);
            }
        }));
        let mut items = ItemStore::new();
        for iteration in 1..=4 {
            layer
                .run(
                    iteration,
                    &SerialPool,
                    &mut configurations,
                    &mut items,
                    &argon_potentials(),
                    &reporter,
                )
                .unwrap();
        }
        drop(reporter);

        assert_eq!(
            started.into_inner().unwrap(),
            vec!["every", "every", "second", "every", "every", "second"]
        );
        assert!(!items.contains("a//Total", &Scope::module("never")));
    }

    #[test]
    fn module_failure_names_the_instance() {
        let (mut configurations, a, _) = setup();
        let mut layer = ModuleLayer::new();
        layer
            .add("rdf01", Box::new(SiteRdfModule::new()), vec![a])
            .unwrap();
        let mut items = ItemStore::new();
        let result = layer.run(
            1,
            &SerialPool,
            &mut configurations,
            &mut items,
            &argon_potentials(),
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::ModuleFailed { module, .. }) if module == "rdf01"));
    }

    #[test]
    fn clear_module_data_signal_removes_the_instance_results() {
        let (mut configurations, a, _) = setup();
        let registry = ModuleRegistry::with_standard_modules();
        let mut layer = ModuleLayer::new();
        layer
            .add("rdf01", registry.create("SiteRDF").unwrap(), vec![a])
            .unwrap();
        let mut items = ItemStore::new();
        for (keyword, value) in [("SiteA", "Ar"), ("SiteB", "Ar"), ("RangeMax", "5.0")] {
            layer
                .set_keyword_str("rdf01", keyword, value, &mut items)
                .unwrap();
        }
        items
            .insert("unrelated", &Scope::Global, 1.0_f64)
            .unwrap();

        layer
            .run(
                1,
                &SerialPool,
                &mut configurations,
                &mut items,
                &argon_potentials(),
                &ProgressReporter::new(),
            )
            .unwrap();
        let scope = Scope::module("rdf01");
        assert!(items.retrieve::<Histogram1D>("Histogram", &scope).is_ok());

        let signals = layer
            .set_keyword("rdf01", "BinWidth", KeywordValue::Double(0.25), &mut items)
            .unwrap();
        assert_eq!(signals, vec![KeywordSignal::ClearModuleData]);
        assert_eq!(items.keys_in_scope(&scope).count(), 0);
        assert!(items.contains("unrelated", &Scope::Global));

        let unchanged = layer
            .set_keyword("rdf01", "BinWidth", KeywordValue::Double(0.25), &mut items)
            .unwrap();
        assert!(unchanged.is_empty());
    }
}
