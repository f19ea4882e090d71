//! Continuous-integration detection
//!
//! Watch and debug modes are unavailable under CI, and CI providers may split
//! one test run across several parallel jobs.

use serde::Serialize;

/// Variables whose presence alone marks a CI environment
const CI_MARKERS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "BUILD_NUMBER",
    "RUN_ID",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "BUILDKITE",
    "TF_BUILD",
    "JENKINS_URL",
];

/// (index variable, total variable, whether the index is 1-based)
const PARALLEL_VARS: &[(&str, &str, bool)] = &[
    ("CI_NODE_INDEX", "CI_NODE_TOTAL", false),
    ("CIRCLE_NODE_INDEX", "CIRCLE_NODE_TOTAL", false),
    ("BUILDKITE_PARALLEL_JOB", "BUILDKITE_PARALLEL_JOB_COUNT", false),
    ("BITBUCKET_PARALLEL_STEP", "BITBUCKET_PARALLEL_STEP_COUNT", false),
    ("SEMAPHORE_CURRENT_JOB", "SEMAPHORE_JOB_COUNT", true),
];

/// This job's slice of a parallelized CI run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelRuns {
    /// Zero-based index of this job
    pub current_index: usize,
    pub total_runs: usize,
}

/// What the environment says about CI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CiContext {
    pub is_ci: bool,
    parallel: Option<ParallelRuns>,
}

impl CiContext {
    /// Inspect the process environment
    pub fn from_env() -> Self {
        Self::detect(|key| std::env::var(key).ok())
    }

    /// Inspect an arbitrary variable lookup
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let is_ci = match lookup("CI").as_deref() {
            Some("false") | Some("0") => false,
            _ => CI_MARKERS.iter().any(|key| lookup(key).is_some()),
        };

        let parallel = PARALLEL_VARS.iter().find_map(|(index, total, one_based)| {
            let index: usize = lookup(index)?.trim().parse().ok()?;
            let total: usize = lookup(total)?.trim().parse().ok()?;
            let index = if *one_based { index.checked_sub(1)? } else { index };
            (total > 0 && index < total).then_some(ParallelRuns {
                current_index: index,
                total_runs: total,
            })
        });

        Self { is_ci, parallel }
    }

    /// The parallel-run descriptor, only honored under CI
    pub fn parallel_runs(&self) -> Option<ParallelRuns> {
        if self.is_ci {
            self.parallel
        } else {
            None
        }
    }
}
