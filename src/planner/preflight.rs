use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::manifest::{Capability, Discovery};
use crate::planner::plan::PlanStep;

/// Outcome of the pre-generation checks. Missing generated outputs are
/// metadata; only missing node dependencies require manual action.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightResult {
    /// Per capability: does its output location exist and hold anything.
    pub outputs_present: BTreeMap<Capability, bool>,
    pub missing_outputs: Vec<Capability>,
    /// Output directory actually checked per capability.
    pub checked_output_dirs: BTreeMap<Capability, PathBuf>,
    /// Package script consulted for dependency installation.
    pub install_script: String,
    pub install_script_exists: bool,
    pub node_dependencies_installed: bool,
    pub manual_action_required: bool,
    /// Exact command an operator should run to clear the pause. Never
    /// executed here.
    pub remedial_command: Option<String>,
    /// Whether the remedial command has been run. Always false in this
    /// report; execution belongs to the operator, and a re-invocation
    /// re-checks the module instead of trusting a flag.
    pub remedial_command_executed: bool,
}

/// Check output locations and installed dependencies for every capability the
/// plan would generate.
pub fn run_preflight(
    root: &ModuleRoot,
    discovery: &Discovery,
    config: &EffectiveConfig,
    steps: &[PlanStep],
) -> PreflightResult {
    let mut outputs_present = BTreeMap::new();
    let mut missing_outputs = Vec::new();
    let mut checked_output_dirs = BTreeMap::new();

    for capability in step_capabilities(discovery, steps) {
        let dir = output_dir(root, discovery, config, capability);
        let present = dir_non_empty(&dir);
        outputs_present.insert(capability, present);
        checked_output_dirs.insert(capability, dir);
        if !present {
            missing_outputs.push(capability);
        }
    }

    let install_script_exists = discovery.script_names.contains(&config.install_script);
    let node_dependencies_installed = dir_non_empty(&root.path().join("node_modules"));
    let manual_action_required = !node_dependencies_installed;
    let remedial_command = if manual_action_required {
        Some(if install_script_exists {
            format!("npm run {}", config.install_script)
        } else {
            "npm install".to_string()
        })
    } else {
        None
    };

    PreflightResult {
        outputs_present,
        missing_outputs,
        checked_output_dirs,
        install_script: config.install_script.clone(),
        install_script_exists,
        node_dependencies_installed,
        manual_action_required,
        remedial_command,
        remedial_command_executed: false,
    }
}

/// Capabilities whose outputs a plan is expected to populate. An aggregate
/// step covers the whole chain; transactional-dao only when declared.
fn step_capabilities(discovery: &Discovery, steps: &[PlanStep]) -> Vec<Capability> {
    let mut capabilities = Vec::new();
    for step in steps {
        match step {
            PlanStep::Aggregate { .. } => {
                for capability in Capability::chain_order() {
                    let include = capability != Capability::TransactionalDao
                        || discovery.capabilities.contains(&capability);
                    if include && !capabilities.contains(&capability) {
                        capabilities.push(capability);
                    }
                }
            }
            PlanStep::Generate { capability, .. } => {
                if !capabilities.contains(capability) {
                    capabilities.push(*capability);
                }
            }
        }
    }
    capabilities
}

/// Declared `--out` wins when it stays inside the boundary; otherwise the
/// configured default for the capability.
fn output_dir(
    root: &ModuleRoot,
    discovery: &Discovery,
    config: &EffectiveConfig,
    capability: Capability,
) -> PathBuf {
    if let Some(declared) = discovery
        .invocation_for(capability)
        .and_then(|i| i.out_arg.as_deref())
    {
        if let Ok(resolved) = root.contain_quiet(Path::new(declared)) {
            return resolved;
        }
    }
    let default = match capability {
        Capability::DbBean => &config.db_beans_dir,
        Capability::DocumentBean => &config.document_beans_dir,
        Capability::Dao => &config.dao_dir,
        Capability::TransactionalDao => &config.transactional_dao_dir,
    };
    root.path().join(default)
}

fn dir_non_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_config;
    use crate::manifest::ScriptInvocation;
    use std::fs;
    use tempfile::TempDir;

    fn module(files: &[&str]) -> (TempDir, ModuleRoot, EffectiveConfig) {
        let dir = TempDir::new().unwrap();
        for rel in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
        let root = ModuleRoot::resolve(dir.path()).unwrap();
        let config = resolve_config(&root, None).unwrap();
        (dir, root, config)
    }

    fn discovery_with(capabilities: &[Capability]) -> Discovery {
        let mut discovery = Discovery::default();
        for capability in capabilities {
            discovery.capabilities.insert(*capability);
            discovery.invocations.push(ScriptInvocation {
                script: format!("generate:{}", capability.subcommand()),
                command: format!("persistence-gen {}", capability.subcommand()),
                capability: Some(*capability),
                aggregate: false,
                schema_arg: None,
                model_arg: None,
                out_arg: None,
            });
        }
        discovery
    }

    fn generate_steps(capabilities: &[Capability]) -> Vec<PlanStep> {
        capabilities
            .iter()
            .map(|c| PlanStep::Generate {
                capability: *c,
                script: None,
                command: format!("persistence-gen {}", c.subcommand()),
            })
            .collect()
    }

    #[test]
    fn missing_node_modules_pauses_with_remedial_command() {
        let (_dir, root, config) = module(&[]);
        let discovery = discovery_with(&[Capability::DbBean]);
        let result = run_preflight(
            &root,
            &discovery,
            &config,
            &generate_steps(&[Capability::DbBean]),
        );
        assert!(!result.node_dependencies_installed);
        assert!(result.manual_action_required);
        assert_eq!(result.remedial_command.as_deref(), Some("npm install"));
    }

    #[test]
    fn declared_install_script_shapes_the_remedial_command() {
        let (_dir, root, config) = module(&[]);
        let mut discovery = discovery_with(&[Capability::DbBean]);
        discovery.script_names.insert("install:deps".to_string());
        let result = run_preflight(
            &root,
            &discovery,
            &config,
            &generate_steps(&[Capability::DbBean]),
        );
        assert!(result.install_script_exists);
        assert_eq!(
            result.remedial_command.as_deref(),
            Some("npm run install:deps")
        );
    }

    #[test]
    fn missing_outputs_do_not_require_manual_action() {
        let (_dir, root, config) = module(&["node_modules/lodash/index.js"]);
        let discovery = discovery_with(&[Capability::DbBean, Capability::Dao]);
        let result = run_preflight(
            &root,
            &discovery,
            &config,
            &generate_steps(&[Capability::DbBean, Capability::Dao]),
        );
        assert!(!result.manual_action_required);
        assert_eq!(
            result.missing_outputs,
            vec![Capability::DbBean, Capability::Dao]
        );
        assert_eq!(result.remedial_command, None);
    }

    #[test]
    fn populated_output_dir_is_recorded_present() {
        let (_dir, root, config) = module(&[
            "node_modules/lodash/index.js",
            "generated/db-beans/OrderBean.js",
        ]);
        let discovery = discovery_with(&[Capability::DbBean]);
        let result = run_preflight(
            &root,
            &discovery,
            &config,
            &generate_steps(&[Capability::DbBean]),
        );
        assert_eq!(result.outputs_present.get(&Capability::DbBean), Some(&true));
        assert!(result.missing_outputs.is_empty());
    }

    #[test]
    fn declared_out_argument_overrides_the_default_location() {
        let (_dir, root, config) = module(&[
            "node_modules/lodash/index.js",
            "build/beans/OrderBean.js",
        ]);
        let mut discovery = discovery_with(&[]);
        discovery.capabilities.insert(Capability::DbBean);
        discovery.invocations.push(ScriptInvocation {
            script: "generate:db".to_string(),
            command: "persistence-gen db-bean --out build/beans".to_string(),
            capability: Some(Capability::DbBean),
            aggregate: false,
            schema_arg: None,
            model_arg: None,
            out_arg: Some("build/beans".to_string()),
        });
        let result = run_preflight(
            &root,
            &discovery,
            &config,
            &generate_steps(&[Capability::DbBean]),
        );
        assert_eq!(result.outputs_present.get(&Capability::DbBean), Some(&true));
        assert_eq!(
            result.checked_output_dirs.get(&Capability::DbBean),
            Some(&root.path().join("build/beans"))
        );
    }

    #[test]
    fn aggregate_step_checks_the_whole_chain() {
        let (_dir, root, config) = module(&["node_modules/lodash/index.js"]);
        let discovery = discovery_with(&[
            Capability::DbBean,
            Capability::DocumentBean,
            Capability::Dao,
        ]);
        let steps = vec![PlanStep::Aggregate {
            script: "generate:all".to_string(),
            command: "persistence-gen all".to_string(),
        }];
        let result = run_preflight(&root, &discovery, &config, &steps);
        let checked: Vec<Capability> = result.outputs_present.keys().copied().collect();
        assert_eq!(
            checked,
            vec![
                Capability::DbBean,
                Capability::DocumentBean,
                Capability::Dao
            ]
        );
    }
}
