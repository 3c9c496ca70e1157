// Matrix Strategy Expansion
// Expands a group's axes and include/exclude rules into concrete job specifications

use crate::error::ConfigError;
use crate::workflow::config::{ContinueOnErrorPolicy, GroupConfig, EXPERIMENTAL_KEY};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

/// One fully resolved combination of axis values.
///
/// Identity is the group plus the axis assignments; the flags do not take
/// part in equality.
#[derive(Debug, Clone, Serialize)]
pub struct JobSpec {
    /// Group this job belongs to
    pub group: String,
    /// Axis assignments, in axis declaration order
    pub assignments: IndexMap<String, String>,
    /// Experimental jobs are always tolerated
    pub experimental: bool,
    /// Resolved continue-on-error flag
    pub continue_on_error: bool,
}

impl PartialEq for JobSpec {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group && self.assignments == other.assignments
    }
}

impl Eq for JobSpec {}

impl JobSpec {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            assignments: IndexMap::new(),
            experimental: false,
            continue_on_error: false,
        }
    }

    pub fn with(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.insert(axis.into(), value.into());
        self
    }

    pub fn value(&self, axis: &str) -> Option<&str> {
        self.assignments.get(axis).map(String::as_str)
    }

    /// Whether a failure of this job is tolerated
    pub fn tolerated(&self) -> bool {
        self.experimental || self.continue_on_error
    }

    /// Display name, e.g. `rust_toolchains (nightly, ubuntu-latest)`
    pub fn name(&self) -> String {
        if self.assignments.is_empty() {
            self.group.clone()
        } else {
            let values: Vec<&str> = self.assignments.values().map(String::as_str).collect();
            format!("{} ({})", self.group, values.join(", "))
        }
    }

    fn matches(&self, partial: &IndexMap<String, String>) -> bool {
        partial
            .iter()
            .all(|(axis, value)| self.value(axis) == Some(value.as_str()))
    }
}

/// Matrix expander for job groups
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a group into its ordered, deduplicated job list.
    ///
    /// Base cross-product jobs come first in axis-iteration order (last axis
    /// varies fastest), followed by include-derived jobs in declaration order.
    /// A matrix with no axes but with includes has one job per distinct include.
    pub fn expand(group: &GroupConfig) -> Result<Vec<JobSpec>, ConfigError> {
        for (axis, values) in group.axes.iter() {
            if values.is_empty() {
                return Err(ConfigError::EmptyAxis {
                    group: group.id.clone(),
                    axis: axis.to_string(),
                });
            }
        }

        Self::check_excludes(group)?;

        if group.axes.is_empty() && !group.include.is_empty() {
            return Self::expand_include_only(group);
        }

        let mut jobs: Vec<JobSpec> = Self::cross_product(group)
            .into_iter()
            .filter(|job| {
                !group
                    .exclude
                    .iter()
                    .any(|rule| !rule.assignments.is_empty() && job.matches(&rule.assignments))
            })
            .collect();
        let base_len = jobs.len();

        // Explicit continue-on-error from include rules, parallel to `jobs`
        let mut explicit: Vec<Option<bool>> = vec![None; jobs.len()];

        for (index, rule) in group.include.iter().enumerate() {
            if rule.assignments.is_empty() {
                return Err(ConfigError::IncludeWithoutAxes {
                    group: group.id.clone(),
                    index,
                });
            }
            if let Some(axis) = rule
                .assignments
                .keys()
                .find(|axis| !group.axes.contains_axis(axis))
            {
                return Err(ConfigError::UnknownAxis {
                    group: group.id.clone(),
                    rule: "include",
                    index,
                    axis: axis.clone(),
                });
            }

            let missing: Vec<String> = group
                .axes
                .names()
                .filter(|axis| !rule.assignments.contains_key(*axis))
                .map(String::from)
                .collect();

            if missing.is_empty() {
                let mut candidate = JobSpec::new(group.id.clone());
                for axis in group.axes.names() {
                    candidate = candidate.with(axis, rule.assignments[axis].clone());
                }

                match jobs.iter().position(|job| *job == candidate) {
                    Some(pos) => {
                        if let Some(experimental) = rule.experimental {
                            jobs[pos].experimental = experimental;
                        }
                        explicit[pos] = rule.continue_on_error.or(explicit[pos]);
                    }
                    None => {
                        candidate.experimental = rule.experimental.unwrap_or(false);
                        jobs.push(candidate);
                        explicit.push(rule.continue_on_error);
                    }
                }
                continue;
            }

            let introduces_value = rule
                .assignments
                .iter()
                .any(|(axis, value)| !group.axes.contains_value(axis, value));

            let targets: Vec<usize> = (0..base_len)
                .filter(|&pos| jobs[pos].matches(&rule.assignments))
                .collect();

            if introduces_value || targets.is_empty() {
                return Err(ConfigError::IncompleteInclude {
                    group: group.id.clone(),
                    index,
                    missing,
                });
            }

            for pos in targets {
                if let Some(experimental) = rule.experimental {
                    jobs[pos].experimental = experimental;
                }
                explicit[pos] = rule.continue_on_error.or(explicit[pos]);
            }
        }

        Self::resolve_flags(group, &mut jobs, explicit)?;

        debug!(
            group = %group.id,
            base = base_len,
            total = jobs.len(),
            "matrix expanded"
        );

        Ok(jobs)
    }

    /// Every include names its own assignments; there is no base set
    fn expand_include_only(group: &GroupConfig) -> Result<Vec<JobSpec>, ConfigError> {
        let mut jobs: Vec<JobSpec> = Vec::with_capacity(group.include.len());
        let mut explicit: Vec<Option<bool>> = Vec::with_capacity(group.include.len());

        for (index, rule) in group.include.iter().enumerate() {
            if rule.assignments.is_empty() {
                return Err(ConfigError::IncludeWithoutAxes {
                    group: group.id.clone(),
                    index,
                });
            }

            let mut candidate = JobSpec::new(group.id.clone());
            candidate.assignments = rule.assignments.clone();

            match jobs.iter().position(|job| *job == candidate) {
                Some(pos) => {
                    if let Some(experimental) = rule.experimental {
                        jobs[pos].experimental = experimental;
                    }
                    explicit[pos] = rule.continue_on_error.or(explicit[pos]);
                }
                None => {
                    candidate.experimental = rule.experimental.unwrap_or(false);
                    jobs.push(candidate);
                    explicit.push(rule.continue_on_error);
                }
            }
        }

        Self::resolve_flags(group, &mut jobs, explicit)?;
        debug!(group = %group.id, total = jobs.len(), "include-only matrix expanded");
        Ok(jobs)
    }

    /// Explicit include flags win; otherwise the group policy decides
    fn resolve_flags(
        group: &GroupConfig,
        jobs: &mut [JobSpec],
        explicit: Vec<Option<bool>>,
    ) -> Result<(), ConfigError> {
        for (job, explicit) in jobs.iter_mut().zip(explicit) {
            job.continue_on_error = match explicit {
                Some(flag) => flag,
                None => Self::resolve_policy(group, job)?,
            };
        }
        Ok(())
    }

    /// Cartesian product over all axes; an empty axis set yields one job
    fn cross_product(group: &GroupConfig) -> Vec<JobSpec> {
        let mut combos: Vec<IndexMap<String, String>> = vec![IndexMap::new()];

        for (axis, values) in group.axes.iter() {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |value| {
                        let mut next = combo.clone();
                        next.insert(axis.to_string(), value.clone());
                        next
                    })
                })
                .collect();
        }

        combos
            .into_iter()
            .map(|assignments| JobSpec {
                group: group.id.clone(),
                assignments,
                experimental: false,
                continue_on_error: false,
            })
            .collect()
    }

    fn check_excludes(group: &GroupConfig) -> Result<(), ConfigError> {
        for (index, rule) in group.exclude.iter().enumerate() {
            for (axis, value) in &rule.assignments {
                if !group.axes.contains_axis(axis) {
                    return Err(ConfigError::UnknownAxis {
                        group: group.id.clone(),
                        rule: "exclude",
                        index,
                        axis: axis.clone(),
                    });
                }
                if !group.axes.contains_value(axis, value) {
                    return Err(ConfigError::UnknownExcludeValue {
                        group: group.id.clone(),
                        index,
                        axis: axis.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_policy(group: &GroupConfig, job: &JobSpec) -> Result<bool, ConfigError> {
        match &group.continue_on_error {
            ContinueOnErrorPolicy::Fixed(flag) => Ok(*flag),
            ContinueOnErrorPolicy::Matrix(key) if key == EXPERIMENTAL_KEY => Ok(job.experimental),
            ContinueOnErrorPolicy::Matrix(key) => match job.value(key) {
                Some("true") => Ok(true),
                Some("false") => Ok(false),
                _ => Err(ConfigError::UnresolvedExpression {
                    group: group.id.clone(),
                    expression: format!("${{{{ matrix.{} }}}}", key),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::{AxisSet, ExcludeRule, IncludeRule};

    fn group_with_axes(axes: AxisSet) -> GroupConfig {
        let mut group = GroupConfig::new("rust_toolchains");
        group.axes = axes;
        group
    }

    fn toolchain_group() -> GroupConfig {
        let mut group = group_with_axes(
            AxisSet::new()
                .with_axis("toolchain", ["stable"])
                .with_axis("os", ["ubuntu-latest"]),
        );
        group.include = vec![
            IncludeRule::new()
                .assign("toolchain", "beta")
                .assign("os", "ubuntu-latest")
                .experimental(false),
            IncludeRule::new()
                .assign("toolchain", "nightly")
                .assign("os", "ubuntu-latest")
                .experimental(true),
        ];
        group.continue_on_error = ContinueOnErrorPolicy::Matrix("experimental".to_string());
        group
    }

    fn names(jobs: &[JobSpec]) -> Vec<String> {
        jobs.iter().map(JobSpec::name).collect()
    }

    #[test]
    fn test_cross_product_size_and_uniqueness() {
        for sizes in [vec![1], vec![2, 3], vec![3, 1, 2], vec![2, 2, 2, 2]] {
            let mut axes = AxisSet::new();
            for (i, n) in sizes.iter().enumerate() {
                axes = axes.with_axis(format!("axis{}", i), (0..*n).map(|v| v.to_string()));
            }
            let jobs = MatrixExpander::expand(&group_with_axes(axes)).unwrap();

            let expected: usize = sizes.iter().product();
            assert_eq!(jobs.len(), expected);
            for (i, a) in jobs.iter().enumerate() {
                for b in &jobs[i + 1..] {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_cross_product_order_last_axis_fastest() {
        let group = group_with_axes(
            AxisSet::new()
                .with_axis("toolchain", ["stable", "beta"])
                .with_axis("os", ["ubuntu-latest", "windows-latest"]),
        );
        let jobs = MatrixExpander::expand(&group).unwrap();

        assert_eq!(
            names(&jobs),
            vec![
                "rust_toolchains (stable, ubuntu-latest)",
                "rust_toolchains (stable, windows-latest)",
                "rust_toolchains (beta, ubuntu-latest)",
                "rust_toolchains (beta, windows-latest)",
            ]
        );
    }

    #[test]
    fn test_no_axes_yields_single_job() {
        let jobs = MatrixExpander::expand(&GroupConfig::new("rustfmt")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].assignments.is_empty());
        assert_eq!(jobs[0].name(), "rustfmt");
    }

    #[test]
    fn test_include_only_matrix_builds_one_job_per_include() {
        let mut group = GroupConfig::new("platform_compat");
        group.include = vec![
            IncludeRule::new().assign("os", "ubuntu-latest"),
            IncludeRule::new()
                .assign("os", "windows-latest")
                .assign("target", "x86_64-pc-windows-msvc"),
            IncludeRule::new().assign("os", "ubuntu-latest").experimental(true),
        ];
        group.continue_on_error = ContinueOnErrorPolicy::Matrix("experimental".to_string());

        let jobs = MatrixExpander::expand(&group).unwrap();

        assert_eq!(
            names(&jobs),
            vec![
                "platform_compat (ubuntu-latest)",
                "platform_compat (windows-latest, x86_64-pc-windows-msvc)",
            ]
        );
        assert!(jobs[0].experimental);
        assert!(jobs[0].continue_on_error);
        assert!(!jobs[1].tolerated());
    }

    #[test]
    fn test_include_only_matrix_rejects_empty_include() {
        let mut group = GroupConfig::new("platform_compat");
        group.include = vec![
            IncludeRule::new().assign("os", "ubuntu-latest"),
            IncludeRule::new().experimental(true),
        ];

        assert_eq!(
            MatrixExpander::expand(&group),
            Err(ConfigError::IncludeWithoutAxes {
                group: "platform_compat".to_string(),
                index: 1,
            })
        );
    }

    #[test]
    fn test_includes_append_in_declaration_order() {
        let jobs = MatrixExpander::expand(&toolchain_group()).unwrap();

        assert_eq!(jobs.len(), 3);
        let toolchains: Vec<_> = jobs.iter().map(|j| j.value("toolchain").unwrap()).collect();
        assert_eq!(toolchains, vec!["stable", "beta", "nightly"]);

        assert!(!jobs[0].tolerated());
        assert!(!jobs[1].tolerated());
        assert!(jobs[2].experimental);
        assert!(jobs[2].continue_on_error);
    }

    #[test]
    fn test_include_matching_base_job_overrides_flags_without_duplicating() {
        let mut group = toolchain_group();
        group.include = vec![IncludeRule::new()
            .assign("os", "ubuntu-latest")
            .assign("toolchain", "stable")
            .experimental(true)];

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].experimental);
        // Assignments keep axis order even when the rule lists them differently
        assert_eq!(
            jobs[0].assignments.keys().collect::<Vec<_>>(),
            vec!["toolchain", "os"]
        );
    }

    #[test]
    fn test_repeated_include_deduplicates_and_last_flags_win() {
        let mut group = toolchain_group();
        group.include.push(
            IncludeRule::new()
                .assign("toolchain", "nightly")
                .assign("os", "ubuntu-latest")
                .experimental(false)
                .continue_on_error(true),
        );

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(!jobs[2].experimental);
        assert!(jobs[2].continue_on_error);
    }

    #[test]
    fn test_include_can_add_new_axis_value() {
        let mut group = group_with_axes(
            AxisSet::new()
                .with_axis("toolchain", ["stable"])
                .with_axis("os", ["ubuntu-latest"]),
        );
        group.include = vec![IncludeRule::new()
            .assign("toolchain", "stable")
            .assign("os", "windows-latest")];

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].value("os"), Some("windows-latest"));
    }

    #[test]
    fn test_partial_include_overrides_every_matching_base_job() {
        let mut group = group_with_axes(
            AxisSet::new()
                .with_axis("toolchain", ["stable", "nightly"])
                .with_axis("os", ["ubuntu-latest", "macos-latest"]),
        );
        group.include = vec![IncludeRule::new()
            .assign("toolchain", "nightly")
            .experimental(true)];

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert_eq!(jobs.len(), 4);
        let experimental: Vec<_> = jobs.iter().map(|j| j.experimental).collect();
        assert_eq!(experimental, vec![false, false, true, true]);
    }

    #[test]
    fn test_partial_include_with_new_value_is_config_error() {
        let mut group = toolchain_group();
        group.include = vec![IncludeRule::new().assign("os", "windows-latest")];

        let err = MatrixExpander::expand(&group).unwrap_err();
        assert_eq!(
            err,
            ConfigError::IncompleteInclude {
                group: "rust_toolchains".to_string(),
                index: 0,
                missing: vec!["toolchain".to_string()],
            }
        );
    }

    #[test]
    fn test_include_without_axes_is_config_error() {
        let mut group = toolchain_group();
        group.include = vec![IncludeRule::new().experimental(true)];

        assert!(matches!(
            MatrixExpander::expand(&group),
            Err(ConfigError::IncludeWithoutAxes { index: 0, .. })
        ));
    }

    #[test]
    fn test_include_with_unknown_axis_is_config_error() {
        let mut group = toolchain_group();
        group.include = vec![IncludeRule::new()
            .assign("toolchain", "stable")
            .assign("os", "ubuntu-latest")
            .assign("lint", "clippy")];

        assert!(matches!(
            MatrixExpander::expand(&group),
            Err(ConfigError::UnknownAxis { ref axis, rule: "include", .. }) if axis == "lint"
        ));
    }

    #[test]
    fn test_exclude_removes_matching_combinations() {
        let mut group = group_with_axes(
            AxisSet::new()
                .with_axis("toolchain", ["stable", "nightly"])
                .with_axis("os", ["ubuntu-latest", "windows-latest"]),
        );
        group.exclude = vec![ExcludeRule::new()
            .assign("toolchain", "nightly")
            .assign("os", "windows-latest")];

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(!jobs.contains(
            &JobSpec::new("rust_toolchains")
                .with("toolchain", "nightly")
                .with("os", "windows-latest")
        ));
    }

    #[test]
    fn test_exclude_with_unknown_value_is_config_error() {
        let mut group = toolchain_group();
        group.exclude = vec![ExcludeRule::new().assign("os", "plan9")];

        assert!(matches!(
            MatrixExpander::expand(&group),
            Err(ConfigError::UnknownExcludeValue { ref value, .. }) if value == "plan9"
        ));
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let group = toolchain_group();
        let first = MatrixExpander::expand(&group).unwrap();
        let second = MatrixExpander::expand(&group).unwrap();

        assert_eq!(names(&first), names(&second));
        let flags = |jobs: &[JobSpec]| {
            jobs.iter()
                .map(|j| (j.experimental, j.continue_on_error))
                .collect::<Vec<_>>()
        };
        assert_eq!(flags(&first), flags(&second));
    }

    #[test]
    fn test_fixed_continue_on_error_and_explicit_override() {
        let mut group = toolchain_group();
        group.continue_on_error = ContinueOnErrorPolicy::Fixed(true);
        group.include[0] = group.include[0].clone().continue_on_error(false);

        let jobs = MatrixExpander::expand(&group).unwrap();
        let flags: Vec<_> = jobs.iter().map(|j| j.continue_on_error).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_continue_on_error_from_boolean_axis() {
        let mut group = group_with_axes(AxisSet::new().with_axis("allow_failure", ["true", "false"]));
        group.continue_on_error = ContinueOnErrorPolicy::Matrix("allow_failure".to_string());

        let jobs = MatrixExpander::expand(&group).unwrap();
        assert!(jobs[0].continue_on_error);
        assert!(!jobs[1].continue_on_error);

        let mut bad = group_with_axes(AxisSet::new().with_axis("os", ["ubuntu-latest"]));
        bad.continue_on_error = ContinueOnErrorPolicy::Matrix("os".to_string());
        assert!(matches!(
            MatrixExpander::expand(&bad),
            Err(ConfigError::UnresolvedExpression { .. })
        ));
    }

    #[test]
    fn test_job_identity_ignores_flags() {
        let a = JobSpec::new("clippy").with("os", "ubuntu-latest");
        let mut b = a.clone();
        b.experimental = true;
        b.continue_on_error = true;
        assert_eq!(a, b);
        assert_ne!(a, JobSpec::new("rustfmt").with("os", "ubuntu-latest"));
    }
}
