use super::context::ExecutionContext;
use super::error::EngineError;
use super::procedure::Procedure;
use super::progress::{Progress, ProgressReporter};
use crate::core::items::{ItemStore, Scope};
use crate::core::models::configuration::Configuration;
use crate::core::pool::ProcessPool;
use tracing::{info, instrument};

/// The outermost unit of work: one procedure run under one freshly built context.
///
/// Results are written to the item store under the global scope.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    procedure: Procedure,
}

impl Task {
    pub fn new(name: impl Into<String>, procedure: Procedure) -> Self {
        Self {
            name: name.into(),
            procedure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn procedure_mut(&mut self) -> &mut Procedure {
        &mut self.procedure
    }

    /// Builds the execution context and runs the procedure in it.
    ///
    /// # Errors
    ///
    /// Any validation, node or collective failure of the procedure. Nodes that were
    /// prepared have been finalized by the time the error is returned.
    #[instrument(skip_all, name = "task", fields(task = %self.name))]
    pub fn execute(
        &mut self,
        pool: &dyn ProcessPool,
        configuration: Option<&mut Configuration>,
        items: &mut ItemStore,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        reporter.report(Progress::TaskStart {
            name: self.name.clone(),
        });

        let mut ctx = ExecutionContext::new(pool, items, self.procedure.context(), Scope::Global);
        if let Some(configuration) = configuration {
            ctx = ctx.with_configuration(configuration);
        }
        let result = self.procedure.run(&mut ctx);

        reporter.report(Progress::TaskFinish);
        if result.is_ok() {
            info!("Task complete.");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::{LocalPool, SerialPool};
    use crate::engine::context::NodeContext;
    use crate::engine::procedure::NodeKind;
    use nalgebra::Vector3;
    use std::sync::Mutex;

    fn box_task() -> Task {
        let mut procedure = Procedure::new("generator", NodeContext::Generation);
        let root = procedure.root();
        procedure
            .add(
                root,
                "Params",
                NodeKind::Parameters {
                    values: vec![("length".to_string(), 12.0)],
                },
            )
            .unwrap();
        procedure
            .add(
                root,
                "Box",
                NodeKind::Box {
                    lengths: Vector3::repeat(12.0),
                },
            )
            .unwrap();
        Task::new("generate", procedure)
    }

    #[test]
    fn execute_runs_the_procedure_and_reports_start_and_finish() {
        let mut task = box_task();
        let mut cfg = Configuration::new("bulk");
        let mut items = ItemStore::new();
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(format!("{:?}", event));
        }));

        task.execute(&SerialPool, Some(&mut cfg), &mut items, &reporter)
            .unwrap();
        drop(reporter);

        assert_eq!(cfg.periodic_box().volume(), Some(1728.0));
        assert_eq!(
            *items.retrieve::<f64>("length", &Scope::Global).unwrap(),
            12.0
        );
        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("TaskStart"));
        assert_eq!(events[1], "TaskFinish");
    }

    #[test]
    fn execute_without_configuration_names_the_failing_node() {
        let mut task = box_task();
        let mut items = ItemStore::new();
        let error = task
            .execute(&SerialPool, None, &mut items, &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(error, EngineError::NodeFailed { ref node, .. } if node == "Box"));
    }

    #[test]
    fn every_worker_builds_the_same_configuration() {
        let volumes = LocalPool::run(3, |pool| {
            let mut task = box_task();
            let mut cfg = Configuration::new("bulk");
            let mut items = ItemStore::new();
            task.execute(&pool, Some(&mut cfg), &mut items, &ProgressReporter::new())
                .map(|_| cfg.periodic_box().volume())
                .map_err(|e| e.to_string())
        })
        .unwrap();
        assert!(volumes.iter().all(|v| *v == Ok(Some(1728.0))));
    }
}
