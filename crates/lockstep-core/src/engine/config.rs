use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Parameters of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of module-layer iterations to perform.
    pub iterations: usize,
    /// Rank whose item store is replicated after every iteration.
    pub broadcast_root: usize,
    /// Whether to verify item-store consistency across workers after every broadcast.
    pub check_consistency: bool,
}

#[derive(Default)]
pub struct RunConfigBuilder {
    iterations: Option<usize>,
    broadcast_root: Option<usize>,
    check_consistency: Option<bool>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }
    pub fn broadcast_root(mut self, root: usize) -> Self {
        self.broadcast_root = Some(root);
        self
    }
    pub fn check_consistency(mut self, enabled: bool) -> Self {
        self.check_consistency = Some(enabled);
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let iterations = self
            .iterations
            .ok_or(ConfigError::MissingParameter("iterations"))?;
        if iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "iterations",
                reason: "at least one iteration is required".to_string(),
            });
        }
        Ok(RunConfig {
            iterations,
            broadcast_root: self.broadcast_root.unwrap_or(0),
            check_consistency: self.check_consistency.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_applies_defaults() {
        let config = RunConfigBuilder::new().iterations(5).build().unwrap();
        assert_eq!(
            config,
            RunConfig {
                iterations: 5,
                broadcast_root: 0,
                check_consistency: true,
            }
        );
    }

    #[test]
    fn build_fails_without_iterations() {
        assert_eq!(
            RunConfigBuilder::new().broadcast_root(1).build(),
            Err(ConfigError::MissingParameter("iterations"))
        );
    }

    #[test]
    fn build_rejects_zero_iterations() {
        assert!(matches!(
            RunConfigBuilder::new().iterations(0).build(),
            Err(ConfigError::InvalidParameter {
                name: "iterations",
                ..
            })
        ));
    }

    #[test]
    fn builder_overrides_are_kept() {
        let config = RunConfigBuilder::new()
            .iterations(2)
            .broadcast_root(3)
            .check_consistency(false)
            .build()
            .unwrap();
        assert_eq!(config.broadcast_root, 3);
        assert!(!config.check_consistency);
    }
}
