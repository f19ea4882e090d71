//! Derived inputs for the execution engine
//!
//! Each step normalizes one part of the merged configuration. Steps fail
//! independently and every failure becomes [`Fatal::Preparation`].

mod environment;
mod extensions;
mod globs;
mod node_arguments;
mod patterns;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::ci::{CiContext, ParallelRuns};
use crate::config::MergedState;
use crate::error::Fatal;
use crate::providers::Providers;

pub use environment::validate_environment_variables;
pub use extensions::normalize_extensions;
pub use globs::Globs;
pub use node_arguments::normalize_node_arguments;
pub use patterns::FilePattern;

/// Everything prepared for one invocation
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    pub providers: Providers,
    pub environment_variables: BTreeMap<String, String>,
    pub extensions: Vec<String>,
    pub globs: Globs,
    pub node_arguments: Vec<String>,
    pub parallel_runs: Option<ParallelRuns>,
    /// Positional file patterns
    pub filter: Vec<FilePattern>,
}

/// Run every preparation step
pub fn prepare(
    state: &MergedState,
    cwd: &Path,
    patterns: &[String],
    ci: &CiContext,
) -> Result<Prepared, Fatal> {
    let merged = &state.merged;

    let providers = Providers::load(&state.project_dir, merged)
        .map_err(|err| Fatal::Preparation(format!("{:#}", err)))?;

    let environment_variables =
        validate_environment_variables(merged.environment_variables.as_ref())
            .map_err(Fatal::Preparation)?;

    let extensions =
        normalize_extensions(merged.extensions.as_ref(), &providers).map_err(Fatal::Preparation)?;

    let globs = Globs::build(
        merged.files.as_ref(),
        merged.ignored_by_watcher.as_ref(),
        &extensions,
        &providers,
    )
    .map_err(Fatal::Preparation)?;

    let node_arguments = normalize_node_arguments(
        state.persisted.node_arguments.as_deref(),
        state.flags.node_arguments.as_deref(),
    )
    .map_err(Fatal::Preparation)?;

    let parallel_runs = ci.parallel_runs();
    if let Some(parallel) = parallel_runs {
        debug!(
            "Running shard {} of {}",
            parallel.current_index + 1,
            parallel.total_runs
        );
    }

    let filter = patterns
        .iter()
        .map(|raw| FilePattern::parse(raw, cwd, &state.project_dir))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Fatal::Preparation)?;

    Ok(Prepared {
        providers,
        environment_variables,
        extensions,
        globs,
        node_arguments,
        parallel_runs,
        filter,
    })
}
