// Service Error Types
// Configuration errors surface before any job runs; step and job failures are data

use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Top-level error for loading and preparing a run
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A malformed or under-specified workflow document.
///
/// Every variant is fatal: it aborts the run before scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("workflow defines no job groups")]
    NoGroups,

    #[error("group '{group}' has no steps")]
    EmptyGroup { group: String },

    #[error("group '{group}': axis '{axis}' has no values")]
    EmptyAxis { group: String, axis: String },

    #[error("group '{group}': axis '{axis}' uses reserved name")]
    ReservedAxis { group: String, axis: String },

    #[error("group '{group}': {location} must be a scalar value, got {found}")]
    NonScalarValue {
        group: String,
        location: String,
        found: String,
    },

    #[error("group '{group}': include #{index} references no matrix axis")]
    IncludeWithoutAxes { group: String, index: usize },

    #[error("group '{group}': {rule} #{index} references unknown axis '{axis}'")]
    UnknownAxis {
        group: String,
        rule: &'static str,
        index: usize,
        axis: String,
    },

    #[error(
        "group '{group}': include #{index} adds a new combination but does not assign {}",
        missing.join(", ")
    )]
    IncompleteInclude {
        group: String,
        index: usize,
        missing: Vec<String>,
    },

    #[error("group '{group}': exclude #{index} value '{value}' is not in axis '{axis}'")]
    UnknownExcludeValue {
        group: String,
        index: usize,
        axis: String,
        value: String,
    },

    #[error("group '{group}': include #{index} flag '{flag}' must be a boolean")]
    InvalidFlag {
        group: String,
        index: usize,
        flag: String,
    },

    #[error("group '{group}': cannot resolve continue-on-error expression '{expression}'")]
    UnresolvedExpression { group: String, expression: String },

    #[error("group '{group}': step {index} '{name}' must have either 'run' or 'uses'")]
    StepWithoutAction {
        group: String,
        index: usize,
        name: String,
    },

    #[error("group '{group}': step {index} '{name}' cannot have both 'run' and 'uses'")]
    StepWithBothActions {
        group: String,
        index: usize,
        name: String,
    },

    #[error("group '{group}': max-parallel must be at least 1")]
    ZeroParallelism { group: String },

    #[error("action '{action}' must define a non-empty 'run' command")]
    EmptyActionCommand { action: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_include_lists_missing_axes() {
        let err = ConfigError::IncompleteInclude {
            group: "platform_compat".to_string(),
            index: 0,
            missing: vec!["toolchain".to_string(), "lint".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "group 'platform_compat': include #0 adds a new combination but does not assign toolchain, lint"
        );
    }

    #[test]
    fn test_config_error_converts_into_service_error() {
        let err: ServiceError = ConfigError::NoGroups.into();
        assert!(matches!(err, ServiceError::Config(ConfigError::NoGroups)));
        assert!(err.to_string().contains("no job groups"));
    }
}
