use super::{EnergyModule, ForcesModule, Module, SiteRdfModule};
use crate::engine::error::EngineError;

/// Prototypes of every available module type, keyed by type name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    prototypes: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the modules shipped with the crate.
    pub fn with_standard_modules() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EnergyModule::new()));
        registry.register(Box::new(ForcesModule::new()));
        registry.register(Box::new(SiteRdfModule::new()));
        registry
    }

    /// Adds a prototype, replacing any previous one with the same type name.
    pub fn register(&mut self, prototype: Box<dyn Module>) {
        let type_name = prototype.type_name();
        self.prototypes.retain(|p| p.type_name() != type_name);
        self.prototypes.push(prototype);
    }

    /// Creates a fresh instance of the named module type. Lookup ignores case.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn Module>, EngineError> {
        self.prototypes
            .iter()
            .find(|p| p.type_name().eq_ignore_ascii_case(type_name))
            .map(|p| p.create_instance())
            .ok_or_else(|| EngineError::UnknownModule(type_name.to_string()))
    }

    /// Registered prototypes, in registration order.
    pub fn list(&self) -> impl Iterator<Item = &dyn Module> {
        self.prototypes.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::keywords::KeywordValue;
    use crate::engine::modules::TargetPolicy;

    #[test]
    fn create_returns_independent_instances_with_default_keywords() {
        let registry = ModuleRegistry::with_standard_modules();
        let mut first = registry.create("siterdf").unwrap();
        first
            .keywords_mut()
            .set("BinWidth", KeywordValue::Double(0.5))
            .unwrap();
        let second = registry.create("SiteRDF").unwrap();

        assert_eq!(second.target_policy(), TargetPolicy::ExactlyOne);
        assert_eq!(
            second.keywords().get_double("BinWidth").unwrap(),
            0.05
        );
    }

    #[test]
    fn unknown_module_is_reported() {
        let registry = ModuleRegistry::with_standard_modules();
        assert!(matches!(
            registry.create("Refine"),
            Err(EngineError::UnknownModule(name)) if name == "Refine"
        ));
    }

    #[test]
    fn list_names_every_standard_module() {
        let registry = ModuleRegistry::with_standard_modules();
        let names: Vec<_> = registry.list().map(|m| m.type_name()).collect();
        assert_eq!(names, vec!["Energy", "Forces", "SiteRDF"]);
    }
}
