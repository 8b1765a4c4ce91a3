//! The single-pass planning pipeline.
//!
//! One invocation performs exactly one pass: resolve the module boundary,
//! read the manifest, introspect schemas, scan conventions, plan scaffolds,
//! resolve the generation plan, report. No state survives between
//! invocations; resuming a paused plan is a fresh invocation that repeats
//! every check from scratch.
//!
//! Contract violations are entity-scoped: a violating entity is excluded
//! from the scaffold outputs and recorded in the report, and the remaining
//! entities are planned normally. Everything else in the error taxonomy
//! fails the run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::boundary::ModuleRoot;
use crate::config::{resolve_config, EffectiveConfig};
use crate::context::{infer_context, ContextOverride, EntityContext};
use crate::conventions::{scan_conventions, ConventionSource, ImportStyle};
use crate::error::{Error, Result};
use crate::manifest::discover;
use crate::planner::{plan, PlanMode, PlanState};
use crate::report::{convention_section, discovery_section, entity_summaries, Report};
use crate::scaffold::{
    plan_converter, plan_procedure, wrapper_file, ConverterContract, IdGenerationPolicy,
    MethodRequest, ProcedureContract, TimestampOwner,
};
use crate::schema::{introspect, EntityMetadata, Introspection};

/// How much of the pipeline a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Resolve and preflight the generation plan only.
    GenerationOnly,
    /// Plan converter contracts only. No generation plan is resolved, so a
    /// run in this scope can never pause.
    ConverterOnly,
    /// Generation plan plus converter contracts.
    GenerationAndConverter,
    /// Procedure method contracts only.
    ProcedureMethods,
    /// Everything: generation plan, converters, and procedures.
    FullProcedure,
}

impl Scope {
    pub fn plans_generation(&self) -> bool {
        matches!(
            self,
            Scope::GenerationOnly | Scope::GenerationAndConverter | Scope::FullProcedure
        )
    }

    pub fn plans_converters(&self) -> bool {
        matches!(
            self,
            Scope::ConverterOnly | Scope::GenerationAndConverter | Scope::FullProcedure
        )
    }

    pub fn plans_procedures(&self) -> bool {
        matches!(self, Scope::ProcedureMethods | Scope::FullProcedure)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::GenerationOnly => "generation-only",
            Scope::ConverterOnly => "converter-only",
            Scope::GenerationAndConverter => "generation-and-converter",
            Scope::ProcedureMethods => "procedure-methods",
            Scope::FullProcedure => "full-procedure",
        };
        f.write_str(s)
    }
}

/// A context override optionally scoped to a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedOverride {
    /// Entity the override applies to; `None` applies it everywhere.
    pub entity: Option<String>,
    pub inner: ContextOverride,
}

impl ScopedOverride {
    /// Parse `entity:key=name` or the unscoped `key=name`.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some((entity, rest)) = raw.split_once(':') {
            if !entity.contains('=') {
                let entity = entity.trim();
                if entity.is_empty() {
                    return None;
                }
                return ContextOverride::parse(rest).map(|inner| ScopedOverride {
                    entity: Some(entity.to_string()),
                    inner,
                });
            }
        }
        ContextOverride::parse(raw).map(|inner| ScopedOverride {
            entity: None,
            inner,
        })
    }
}

/// Everything a caller can ask of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: Scope,
    pub mode: PlanMode,
    /// Entities to plan scaffolds for; empty plans every discovered entity.
    pub entities: Vec<String>,
    /// Append a transactional-dao step even when no script declares one.
    pub with_transactions: bool,
    /// Marks the invocation as a resume of a paused plan. Checks are
    /// repeated from scratch either way.
    pub resume: bool,
    pub context_overrides: Vec<ScopedOverride>,
    pub import_style: Option<ImportStyle>,
    pub timestamps: Option<TimestampOwner>,
    pub id_generation: Option<IdGenerationPolicy>,
    pub install_script: Option<String>,
    pub methods: Vec<MethodRequest>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            scope: Scope::FullProcedure,
            mode: PlanMode::Auto,
            entities: Vec::new(),
            with_transactions: false,
            resume: false,
            context_overrides: Vec::new(),
            import_style: None,
            timestamps: None,
            id_generation: None,
            install_script: None,
            methods: Vec::new(),
        }
    }
}

/// Run one full planning pass over a module and assemble its report.
pub fn run(module: &Path, options: &RunOptions) -> Result<Report> {
    debug!(state = %PlanState::Discovering, module = %module.display(), "resolving module root");
    let root = ModuleRoot::resolve(module)?;
    let config = resolve_config(&root, options.install_script.as_deref())?;
    let discovery = discover(&root, &config)?;
    let introspection = introspect(&root, &discovery.schema_sources, &config)?;
    let scan = scan_conventions(&root, &config)?;

    let mut warnings: Vec<String> = Vec::new();
    warnings.extend(discovery.warnings.iter().cloned());
    warnings.extend(introspection.warnings.iter().cloned());
    warnings.extend(scan.warnings.iter().cloned());
    if options.resume {
        warnings.push("resume requested; every check was re-evaluated from scratch".to_string());
    }

    let selected = select_entities(&introspection, &options.entities)?;
    for scoped in &options.context_overrides {
        if let Some(entity) = &scoped.entity {
            if !selected.iter().any(|s| s.eq_ignore_ascii_case(entity)) {
                warnings.push(format!(
                    "context override for entity '{entity}' matched no planned entity; ignored"
                ));
            }
        }
    }

    let mut context = Vec::new();
    let mut converters = Vec::new();
    let mut procedures = Vec::new();
    let mut entity_errors = BTreeMap::new();

    for name in &selected {
        let entity = &introspection.entities[name];
        match plan_entity(&root, &config, &scan, &introspection, entity, options) {
            Ok(plans) => {
                warnings.extend(plans.notes);
                context.extend(plans.context);
                converters.extend(plans.converter);
                procedures.extend(plans.procedure);
            }
            Err(violation @ Error::ContractViolation { .. }) => {
                entity_errors.insert(name.clone(), violation.to_string());
            }
            Err(err) => return Err(err),
        }
    }

    let generation = if options.scope.plans_generation() {
        Some(plan(
            options.mode,
            &root,
            &discovery,
            &config,
            options.with_transactions,
        )?)
    } else {
        None
    };
    let state = match &generation {
        Some(plan) => plan.state,
        None => PlanState::Reported,
    };

    info!(
        scope = %options.scope,
        %state,
        entities = selected.len(),
        excluded = entity_errors.len(),
        "planning pass complete"
    );

    let mut report = Report {
        module_root: root.path().to_path_buf(),
        scope: options.scope,
        state,
        discovery: discovery_section(&discovery),
        entities: entity_summaries(&introspection),
        conventions: convention_section(&scan),
        context,
        plan: generation,
        converters,
        procedures,
        entity_errors,
        warnings,
    };
    report.validate(&root, &config);
    Ok(report)
}

/// Scaffold outputs for one entity, or the contract violation that excluded
/// it. Notes only survive a successful pass.
struct EntityPlans {
    context: Option<EntityContext>,
    converter: Option<ConverterContract>,
    procedure: Option<ProcedureContract>,
    notes: Vec<String>,
}

fn plan_entity(
    root: &ModuleRoot,
    config: &EffectiveConfig,
    scan: &dyn ConventionSource,
    introspection: &Introspection,
    entity: &EntityMetadata,
    options: &RunOptions,
) -> Result<EntityPlans> {
    let db_fields = introspection.db_fields_for(&entity.name);
    let mut plans = EntityPlans {
        context: None,
        converter: None,
        procedure: None,
        notes: Vec::new(),
    };

    if options.scope.plans_converters() {
        if let Some(existing) = scan.existing_converter(&entity.name) {
            plans.notes.push(format!(
                "entity '{}' already has a converter at {}; left untouched",
                entity.name,
                existing.display()
            ));
        } else {
            let overrides = overrides_for(&options.context_overrides, &entity.name);
            let entity_context = infer_context(entity, db_fields, scan, &overrides)?;
            let wrapper = wrapper_file(root, &config.bean_wrapper_dir, &entity.name);
            if wrapper.is_none() {
                plans.notes.push(format!(
                    "no bean wrapper for '{}' under {}; the converter references generated \
                     beans directly",
                    entity.name,
                    config.bean_wrapper_dir.display()
                ));
            }
            let contract = plan_converter(
                entity,
                &entity_context,
                db_fields,
                scan,
                options.import_style,
                wrapper.is_some(),
            )?;
            plans.context = Some(entity_context);
            plans.converter = Some(contract);
        }
    }

    if options.scope.plans_procedures() {
        if let Some(existing) = scan.existing_procedure(&entity.name) {
            plans.notes.push(format!(
                "entity '{}' already has procedures at {}; left untouched",
                entity.name,
                existing.display()
            ));
        } else {
            let wrapper = wrapper_file(root, &config.dao_wrapper_dir, &entity.name);
            if wrapper.is_none() {
                plans.notes.push(format!(
                    "no dao wrapper for '{}' under {}; procedures call the generated dao \
                     directly",
                    entity.name,
                    config.dao_wrapper_dir.display()
                ));
            }
            let contract = plan_procedure(
                entity,
                db_fields,
                &options.methods,
                options.timestamps,
                options.id_generation,
                wrapper.is_some(),
            )?;
            plans.procedure = Some(contract);
        }
    }

    Ok(plans)
}

/// Entities this run scaffolds for, in name order. Explicitly requested
/// entities must exist; an unknown one fails the run rather than silently
/// planning nothing.
pub(crate) fn select_entities(
    introspection: &Introspection,
    requested: &[String],
) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(introspection.entities.keys().cloned().collect());
    }
    let mut selected = Vec::new();
    for name in requested {
        let found = introspection
            .entities
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name));
        match found {
            Some(key) => {
                if !selected.contains(key) {
                    selected.push(key.clone());
                }
            }
            None => {
                return Err(Error::UnknownEntity {
                    entity: name.clone(),
                })
            }
        }
    }
    selected.sort();
    Ok(selected)
}

fn overrides_for(all: &[ScopedOverride], entity: &str) -> Vec<ContextOverride> {
    all.iter()
        .filter(|o| {
            o.entity
                .as_deref()
                .map_or(true, |e| e.eq_ignore_ascii_case(entity))
        })
        .map(|o| o.inner.clone())
        .collect()
}
