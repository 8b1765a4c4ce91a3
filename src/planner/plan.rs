use serde::Serialize;
use std::fmt;

use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::manifest::{Capability, Discovery};
use crate::planner::preflight::{run_preflight, PreflightResult};

/// How generation steps are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    /// Prefer the declared aggregate script; fall back to chain resolution.
    Auto,
    /// Always resolve the per-capability chain.
    Chain,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanMode::Auto => f.write_str("auto"),
            PlanMode::Chain => f.write_str("chain"),
        }
    }
}

/// Lifecycle of one planning run. `Paused` is terminal for the invocation;
/// resumption is a fresh invocation that re-runs preflight from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanState {
    Discovering,
    Planning,
    Preflight,
    Paused,
    Ready,
    Reported,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanState::Discovering => "discovering",
            PlanState::Planning => "planning",
            PlanState::Preflight => "preflight",
            PlanState::Paused => "paused",
            PlanState::Ready => "ready",
            PlanState::Reported => "reported",
        };
        f.write_str(s)
    }
}

/// One step of a generation plan. Steps are descriptions for an external
/// executor; nothing here runs them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanStep {
    /// Delegate everything to the module's aggregate script.
    Aggregate { script: String, command: String },
    /// Run one capability's generator.
    Generate {
        capability: Capability,
        /// Declaring script, when one exists; a capability appended by
        /// explicit request has none.
        script: Option<String>,
        command: String,
    },
}

impl PlanStep {
    pub fn command(&self) -> &str {
        match self {
            PlanStep::Aggregate { command, .. } => command,
            PlanStep::Generate { command, .. } => command,
        }
    }
}

/// The resolved plan plus its preflight outcome.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationPlan {
    pub mode: PlanMode,
    pub steps: Vec<PlanStep>,
    pub preflight: PreflightResult,
    pub state: PlanState,
    pub warnings: Vec<String>,
}

/// Resolve a generation plan and run preflight over it.
///
/// Chain resolution requires the db-bean, document-bean, and dao capabilities
/// and names the first missing one. A transactional-dao step is appended only
/// when discovered or explicitly requested. Preflight never blocks on missing
/// generated outputs; it pauses the plan only when node dependencies are
/// absent, reporting the remedial command without running it.
pub fn plan(
    mode: PlanMode,
    root: &ModuleRoot,
    discovery: &Discovery,
    config: &EffectiveConfig,
    explicit_tx: bool,
) -> Result<GenerationPlan> {
    tracing::debug!(state = %PlanState::Planning, %mode, "resolving generation steps");
    let mut warnings = Vec::new();

    let steps = match (mode, discovery.aggregate_script.as_deref()) {
        (PlanMode::Auto, Some(script)) => {
            let command = discovery
                .invocations
                .iter()
                .find(|i| i.aggregate)
                .map(|i| i.command.clone())
                .unwrap_or_else(|| format!("{} all", config.generator_command));
            vec![PlanStep::Aggregate {
                script: script.to_string(),
                command,
            }]
        }
        _ => chain_steps(discovery, config, explicit_tx, &mut warnings)?,
    };

    tracing::debug!(state = %PlanState::Preflight, steps = steps.len(), "running preflight");
    let preflight = run_preflight(root, discovery, config, &steps);
    let state = if preflight.manual_action_required {
        PlanState::Paused
    } else {
        PlanState::Ready
    };

    Ok(GenerationPlan {
        mode,
        steps,
        preflight,
        state,
        warnings,
    })
}

fn chain_steps(
    discovery: &Discovery,
    config: &EffectiveConfig,
    explicit_tx: bool,
    warnings: &mut Vec<String>,
) -> Result<Vec<PlanStep>> {
    let required = [
        Capability::DbBean,
        Capability::DocumentBean,
        Capability::Dao,
    ];
    for capability in required {
        if !discovery.capabilities.contains(&capability) {
            return Err(Error::MissingCapability { capability });
        }
    }

    let mut steps: Vec<PlanStep> = required
        .into_iter()
        .map(|capability| generate_step(discovery, config, capability))
        .collect();

    let tx_discovered = discovery.capabilities.contains(&Capability::TransactionalDao);
    if tx_discovered || explicit_tx {
        if !tx_discovered {
            warnings.push(
                "transactional-dao requested explicitly but no script declares it; \
                 the plan invokes the generator directly"
                    .to_string(),
            );
        }
        steps.push(generate_step(discovery, config, Capability::TransactionalDao));
    }
    Ok(steps)
}

fn generate_step(
    discovery: &Discovery,
    config: &EffectiveConfig,
    capability: Capability,
) -> PlanStep {
    match discovery.invocation_for(capability) {
        Some(invocation) => PlanStep::Generate {
            capability,
            script: Some(invocation.script.clone()),
            command: invocation.command.clone(),
        },
        None => PlanStep::Generate {
            capability,
            script: None,
            command: format!("{} {}", config.generator_command, capability.subcommand()),
        },
    }
}
