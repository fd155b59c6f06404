use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use lockstep::core::forcefield::params::{AtomTypeParams, PotentialMap, ShortRangeFunctional};
use lockstep::core::models::molecule::MoleculeTemplate;
use lockstep::engine::config::{RunConfig, RunConfigBuilder};
use lockstep::engine::context::NodeContext;
use lockstep::engine::procedure::{NodeKind, Procedure};
use nalgebra::Vector3;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

const DEFAULT_ITERATIONS: usize = 1;
const DEFAULT_PROCESSES: usize = 1;
const DEFAULT_DIELECTRIC: f64 = 1.0;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "form")]
enum PartialShortRange {
    None,
    LennardJones {
        epsilon: f64,
        sigma: f64,
    },
    #[serde(rename = "lennard-jones-12-6")]
    LennardJones126 {
        epsilon: f64,
        #[serde(rename = "r-min")]
        r_min: f64,
    },
}

impl From<PartialShortRange> for ShortRangeFunctional {
    fn from(p: PartialShortRange) -> Self {
        match p {
            PartialShortRange::None => ShortRangeFunctional::None,
            PartialShortRange::LennardJones { epsilon, sigma } => {
                ShortRangeFunctional::LennardJonesGeometric { epsilon, sigma }
            }
            PartialShortRange::LennardJones126 { epsilon, r_min } => {
                ShortRangeFunctional::LennardJones126 { epsilon, r_min }
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialAtomType {
    name: String,
    charge: Option<f64>,
    #[serde(rename = "short-range")]
    short_range: Option<PartialShortRange>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialPotentials {
    cutoff: Option<f64>,
    dielectric: Option<f64>,
    #[serde(default)]
    types: Vec<PartialAtomType>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialTemplateAtom {
    #[serde(rename = "type")]
    atom_type: String,
    #[serde(default)]
    offset: [f64; 3],
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialSpecies {
    name: String,
    population: usize,
    seed: Option<u64>,
    atoms: Vec<PartialTemplateAtom>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialConfiguration {
    name: String,
    #[serde(rename = "box")]
    box_lengths: Option<[f64; 3]>,
    #[serde(default)]
    parameters: BTreeMap<String, f64>,
    #[serde(default)]
    species: Vec<PartialSpecies>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialModule {
    #[serde(rename = "type")]
    module_type: String,
    name: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    frequency: Option<usize>,
    enabled: Option<bool>,
    #[serde(default)]
    keywords: BTreeMap<String, toml::Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialRunSettings {
    iterations: Option<usize>,
    processes: Option<usize>,
    #[serde(rename = "broadcast-root")]
    broadcast_root: Option<usize>,
    #[serde(rename = "check-consistency")]
    check_consistency: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunFile {
    run: Option<PartialRunSettings>,
    potentials: Option<PartialPotentials>,
    #[serde(default)]
    configurations: Vec<PartialConfiguration>,
    #[serde(default)]
    modules: Vec<PartialModule>,
}

/// A configuration to create, with the procedure that generates its contents.
#[derive(Debug, Clone)]
pub struct ConfigurationPlan {
    pub name: String,
    pub generator: Option<Procedure>,
}

/// A module instance to add to the layer, with keywords still in text form.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePlan {
    pub module_type: String,
    pub name: String,
    pub targets: Vec<String>,
    pub frequency: usize,
    pub enabled: bool,
    pub keywords: Vec<(String, String)>,
}

/// Fully resolved description of a run, shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run: RunConfig,
    pub processes: usize,
    pub potentials: PotentialMap,
    pub configurations: Vec<ConfigurationPlan>,
    pub modules: Vec<ModulePlan>,
}

impl PartialRunFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            CliError::Other(source) => CliError::FileParsing {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CliError::Other(e.into()))
    }

    pub fn merge_with_cli(self, args: &RunArgs) -> Result<RunPlan> {
        let settings = self.run.unwrap_or_default();

        let processes = args
            .processes
            .or(settings.processes)
            .unwrap_or(DEFAULT_PROCESSES);
        if processes == 0 {
            return Err(CliError::Argument(
                "at least one process is required".to_string(),
            ));
        }
        let broadcast_root = settings.broadcast_root.unwrap_or(0);
        if broadcast_root >= processes {
            return Err(CliError::Config(format!(
                "`run.broadcast-root` is {} but only {} process(es) will run",
                broadcast_root, processes
            )));
        }
        let check_consistency = if args.no_consistency_check {
            false
        } else {
            settings.check_consistency.unwrap_or(true)
        };
        let run = RunConfigBuilder::new()
            .iterations(
                args.iterations
                    .or(settings.iterations)
                    .unwrap_or(DEFAULT_ITERATIONS),
            )
            .broadcast_root(broadcast_root)
            .check_consistency(check_consistency)
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let potentials = Self::merge_potentials(self.potentials)?;

        let mut configurations = Vec::with_capacity(self.configurations.len());
        for partial in self.configurations {
            if configurations
                .iter()
                .any(|c: &ConfigurationPlan| c.name == partial.name)
            {
                return Err(CliError::Config(format!(
                    "configuration '{}' is defined more than once",
                    partial.name
                )));
            }
            configurations.push(Self::plan_configuration(partial)?);
        }

        let mut modules = Self::plan_modules(self.modules, &configurations)?;
        Self::apply_set_values(&mut modules, &args.set_values)?;

        Ok(RunPlan {
            run,
            processes,
            potentials,
            configurations,
            modules,
        })
    }

    fn merge_potentials(partial: Option<PartialPotentials>) -> Result<PotentialMap> {
        let partial = partial
            .ok_or_else(|| CliError::Config("`potentials` section is required.".to_string()))?;
        let cutoff = partial
            .cutoff
            .ok_or_else(|| CliError::Config("`potentials.cutoff` is required.".to_string()))?;
        if cutoff <= 0.0 {
            return Err(CliError::Config(format!(
                "`potentials.cutoff` must be positive, got {}",
                cutoff
            )));
        }

        let mut potentials = PotentialMap::new(cutoff)
            .with_dielectric(partial.dielectric.unwrap_or(DEFAULT_DIELECTRIC));
        for atom_type in partial.types {
            potentials.insert(AtomTypeParams::new(
                atom_type.name,
                atom_type.charge.unwrap_or(0.0),
                atom_type
                    .short_range
                    .map(Into::into)
                    .unwrap_or(ShortRangeFunctional::None),
            ));
        }
        Ok(potentials)
    }

    /// Turns the box, parameters and species of a configuration into a Generation
    /// procedure. Configurations with none of these get no generator.
    fn plan_configuration(partial: PartialConfiguration) -> Result<ConfigurationPlan> {
        if partial.box_lengths.is_none()
            && partial.parameters.is_empty()
            && partial.species.is_empty()
        {
            return Ok(ConfigurationPlan {
                name: partial.name,
                generator: None,
            });
        }
        if !partial.species.is_empty() && partial.box_lengths.is_none() {
            return Err(CliError::Config(format!(
                "configuration '{}' adds species but has no `box`",
                partial.name
            )));
        }

        let mut procedure = Procedure::new(
            format!("{}Generator", partial.name),
            NodeContext::Generation,
        );
        let root = procedure.root();

        if !partial.parameters.is_empty() {
            procedure.add(
                root,
                "Parameters",
                NodeKind::Parameters {
                    values: partial.parameters.into_iter().collect(),
                },
            )?;
        }
        if let Some(lengths) = partial.box_lengths {
            if lengths.iter().any(|l| *l <= 0.0) {
                return Err(CliError::Config(format!(
                    "box lengths of configuration '{}' must be positive",
                    partial.name
                )));
            }
            procedure.add(
                root,
                "Box",
                NodeKind::Box {
                    lengths: Vector3::from(lengths),
                },
            )?;
        }
        for species in partial.species {
            if species.atoms.is_empty() {
                return Err(CliError::Config(format!(
                    "species '{}' of configuration '{}' has no atoms",
                    species.name, partial.name
                )));
            }
            let template = species
                .atoms
                .iter()
                .fold(MoleculeTemplate::new(&species.name), |t, atom| {
                    t.with_atom(&atom.atom_type, Vector3::from(atom.offset))
                });
            procedure.add(
                root,
                format!("Add{}", species.name),
                NodeKind::Add {
                    template,
                    population: species.population,
                    seed: species.seed.unwrap_or(0),
                },
            )?;
        }

        Ok(ConfigurationPlan {
            name: partial.name,
            generator: Some(procedure),
        })
    }

    fn plan_modules(
        partials: Vec<PartialModule>,
        configurations: &[ConfigurationPlan],
    ) -> Result<Vec<ModulePlan>> {
        let mut counters: HashMap<String, usize> = HashMap::new();
        let mut modules: Vec<ModulePlan> = Vec::with_capacity(partials.len());

        for partial in partials {
            let counter = counters
                .entry(partial.module_type.to_ascii_lowercase())
                .or_insert(0);
            *counter += 1;
            let name = partial.name.unwrap_or_else(|| {
                format!("{}{:02}", partial.module_type.to_ascii_lowercase(), counter)
            });
            if modules.iter().any(|m| m.name == name) {
                return Err(CliError::Config(format!(
                    "module instance name '{}' is used more than once",
                    name
                )));
            }

            if let Some(unknown) = partial
                .targets
                .iter()
                .find(|t| !configurations.iter().any(|c| &c.name == *t))
            {
                return Err(CliError::Config(format!(
                    "module '{}' targets unknown configuration '{}'",
                    name, unknown
                )));
            }

            let frequency = partial.frequency.unwrap_or(1);
            if frequency == 0 {
                return Err(CliError::Config(format!(
                    "`frequency` of module '{}' must be at least 1",
                    name
                )));
            }

            let keywords = partial
                .keywords
                .into_iter()
                .map(|(keyword, value)| {
                    keyword_text(&value)
                        .map(|text| (keyword.clone(), text))
                        .ok_or_else(|| {
                            CliError::Config(format!(
                                "keyword '{}' of module '{}' must be a string, number or boolean",
                                keyword, name
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            modules.push(ModulePlan {
                module_type: partial.module_type,
                name,
                targets: partial.targets,
                frequency,
                enabled: partial.enabled.unwrap_or(true),
                keywords,
            });
        }
        Ok(modules)
    }

    fn apply_set_values(modules: &mut [ModulePlan], set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected INSTANCE.KEYWORD=VALUE.",
                    kv_pair
                )));
            };
            let Some((instance, keyword)) = key.split_once('.') else {
                return Err(CliError::Config(format!(
                    "Invalid --set key: '{}'. Expected INSTANCE.KEYWORD.",
                    key
                )));
            };
            let module = modules
                .iter_mut()
                .find(|m| m.name == instance)
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "Unknown module instance for --set: '{}'",
                        instance
                    ))
                })?;

            match module.keywords.iter_mut().find(|(k, _)| k == keyword) {
                Some((_, text)) => *text = value.to_string(),
                None => module
                    .keywords
                    .push((keyword.to_string(), value.to_string())),
            }
        }
        Ok(())
    }
}

/// Text form of a TOML keyword value. Floats keep their decimal point so that they are
/// never accepted by an integer keyword.
fn keyword_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(format!("{:?}", f)),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}
