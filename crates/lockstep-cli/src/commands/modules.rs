use crate::cli::ModulesArgs;
use crate::error::Result;
use lockstep::engine::modules::{Module, ModuleRegistry};
use std::fmt::Write;

pub fn run(args: ModulesArgs) -> Result<()> {
    let registry = ModuleRegistry::with_standard_modules();

    match &args.module_type {
        Some(module_type) => {
            let module = registry.create(module_type)?;
            print!("{}", describe(module.as_ref()));
        }
        None => {
            println!("{} registered module type(s):\n", registry.len());
            for module in registry.list() {
                println!("{}", describe(module));
            }
        }
    }
    Ok(())
}

fn describe(module: &dyn Module) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}] - {}",
        module.type_name(),
        module.category(),
        module.brief()
    );
    let _ = writeln!(out, "  Targets: {}", module.target_policy());

    let keywords = module.keywords();
    if keywords.is_empty() {
        let _ = writeln!(out, "  Keywords: none");
        return out;
    }
    let _ = writeln!(out, "  Keywords:");
    for keyword in keywords.iter() {
        let _ = writeln!(
            out,
            "    {:<22} {:<7} default {:<8} {}",
            keyword.name(),
            keyword.kind().to_string(),
            keyword.default_value().to_string(),
            keyword.description()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_lists_policy_and_keywords() {
        let registry = ModuleRegistry::with_standard_modules();
        let module = registry.create("SiteRDF").unwrap();
        let text = describe(module.as_ref());

        assert!(text.starts_with("SiteRDF [Analysis]"));
        assert!(text.contains("Targets: exactly one target"));
        assert!(text.contains("BinWidth"));
        assert!(text.contains("ExcludeSameMolecule"));
    }

    #[test]
    fn every_standard_module_is_described() {
        let registry = ModuleRegistry::with_standard_modules();
        for module in registry.list() {
            let text = describe(module);
            assert!(text.contains(module.type_name()));
            assert!(text.contains("Targets:"));
        }
    }

    #[test]
    fn unknown_module_type_is_an_error() {
        let result = run(ModulesArgs {
            module_type: Some("Bogus".to_string()),
        });
        assert!(result.is_err());
    }
}
