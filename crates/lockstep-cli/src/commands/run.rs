use crate::cli::RunArgs;
use crate::config::{PartialRunFile, RunPlan};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use lockstep::core::data::Data1D;
use lockstep::core::items::ItemStore;
use lockstep::core::models::configuration::Configuration;
use lockstep::core::pool::{LocalPool, ProcessPool};
use lockstep::engine::error::EngineError;
use lockstep::engine::modules::ModuleRegistry;
use lockstep::engine::progress::ProgressReporter;
use lockstep::workflows::Simulation;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Scalar and tabulated results read from the reporting worker's item store.
#[derive(Debug, Clone, Default)]
struct RunSummary {
    iterations: usize,
    scalars: Vec<(String, f64)>,
    data: Vec<(String, Data1D)>,
}

impl RunSummary {
    fn collect(simulation: &Simulation) -> Self {
        let items = simulation.items();
        Self {
            iterations: simulation.iteration(),
            scalars: collect_items::<f64>(items),
            data: collect_items::<Data1D>(items),
        }
    }
}

fn collect_items<T: Clone + 'static>(items: &ItemStore) -> Vec<(String, T)> {
    items
        .keys_of_type::<T>()
        .filter_map(|key| {
            items
                .retrieve::<T>(&key.name, &key.scope)
                .ok()
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect()
}

#[derive(Serialize)]
struct DataRow {
    x: f64,
    y: f64,
}

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialRunFile::from_file(&args.config)?;
    info!("Merging run file and CLI arguments...");
    let plan = partial_config.merge_with_cli(&args)?;

    // Wiring errors are reported once here rather than by every worker.
    let preview = build_simulation(&plan, &ModuleRegistry::with_standard_modules())?;
    preview.layer().check()?;
    info!(
        configurations = preview.configurations().len(),
        modules = preview.layer().len(),
        "Run plan validated."
    );

    let progress_handler = CliProgressHandler::new();
    println!(
        "Starting {} iteration(s) on {} worker(s)...",
        plan.run.iterations, plan.processes
    );

    let results = LocalPool::run(plan.processes, |pool| {
        run_worker(&plan, &progress_handler, pool)
    })
    .map_err(EngineError::from)?;

    let mut summary = None;
    for result in results {
        if let Some(worker_summary) = result? {
            summary = Some(worker_summary);
        }
    }
    let summary = summary
        .ok_or_else(|| anyhow::anyhow!("the reporting worker returned no results"))?;

    print_summary(&summary);

    if let Some(dir) = &args.output_dir {
        let written = write_data(dir, &summary.data)?;
        println!("Wrote {} data set(s) to {}", written.len(), dir.display());
    }

    Ok(())
}

/// Builds one worker's simulation from the plan.
fn build_simulation(plan: &RunPlan, registry: &ModuleRegistry) -> Result<Simulation> {
    let mut simulation = Simulation::new(plan.potentials.clone());

    for configuration in &plan.configurations {
        simulation.add_configuration(
            Configuration::new(&configuration.name),
            configuration.generator.clone(),
        )?;
    }

    for module in &plan.modules {
        let targets = module
            .targets
            .iter()
            .map(|name| {
                simulation.configurations().find(name).ok_or_else(|| {
                    CliError::Config(format!(
                        "module '{}' targets unknown configuration '{}'",
                        module.name, name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let layer = simulation.layer_mut();
        layer.add(&module.name, registry.create(&module.module_type)?, targets)?;
        layer.set_frequency(&module.name, module.frequency)?;
        layer.set_enabled(&module.name, module.enabled)?;

        for (keyword, value) in &module.keywords {
            simulation.set_keyword(&module.name, keyword, value)?;
        }
    }

    Ok(simulation)
}

#[instrument(skip_all, name = "worker", fields(rank = pool.rank()))]
fn run_worker(
    plan: &RunPlan,
    progress_handler: &CliProgressHandler,
    pool: LocalPool,
) -> Result<Option<RunSummary>> {
    let registry = ModuleRegistry::with_standard_modules();
    let mut simulation = build_simulation(plan, &registry)?;

    let reporting = pool.rank() == plan.run.broadcast_root;
    let reporter = if reporting {
        ProgressReporter::with_callback(progress_handler.get_callback())
    } else {
        ProgressReporter::new()
    };

    simulation.run(&pool, &plan.run, &reporter)?;
    debug!(items = simulation.items().len(), "Worker finished.");

    Ok(reporting.then(|| RunSummary::collect(&simulation)))
}

fn print_summary(summary: &RunSummary) {
    println!("Results after {} iteration(s):", summary.iterations);
    if summary.scalars.is_empty() {
        println!("  (no scalar results)");
    }
    for (key, value) in &summary.scalars {
        println!("  {:<40} {:>16.6}", key, value);
    }
    for (key, data) in &summary.data {
        println!("  {:<40} {:>10} point(s)", key, data.len());
    }
}

/// File name for an item key, e.g. `rdf01//RDF` becomes `rdf01_RDF.csv`.
fn data_file_name(key: &str) -> String {
    let stem: String = key
        .replace("//", "_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.csv", stem)
}

fn write_data(dir: &Path, data: &[(String, Data1D)]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(data.len());

    for (key, values) in data {
        let path = dir.join(data_file_name(key));
        let to_output_error = |e: csv::Error| CliError::Output {
            path: path.clone(),
            source: e.into(),
        };

        let mut writer = csv::Writer::from_path(&path).map_err(to_output_error)?;
        for (x, y) in values.iter() {
            writer
                .serialize(DataRow { x, y })
                .map_err(to_output_error)?;
        }
        writer.flush()?;

        info!("Wrote {} point(s) of '{}' to {:?}", values.len(), key, &path);
        written.push(path);
    }
    Ok(written)
}
