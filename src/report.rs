//! Run report assembly and rendering.
//!
//! The report is the only artifact a planning run produces. It is assembled
//! once, after the single pass completes, re-validated against the filesystem,
//! and rendered as text or JSON. Key order is fixed by the struct definitions
//! and no timestamps are serialized, so an unchanged module yields
//! byte-identical JSON on every run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::context::EntityContext;
use crate::conventions::{ConventionScan, ConventionSource, ImportStyle};
use crate::error::Result;
use crate::manifest::{Capability, Discovery, InvalidSource, SchemaSource};
use crate::pipeline::Scope;
use crate::planner::{GenerationPlan, PlanState, PlanStep};
use crate::scaffold::{self, BeanReference, ConverterContract, DaoReference, ProcedureContract};
use crate::schema::{Discriminator, DocumentKey, Introspection};

/// Discovery facts carried into the report.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySection {
    pub capabilities: Vec<Capability>,
    pub aggregate_script: Option<String>,
    pub script_count: usize,
    pub schema_sources: Vec<SchemaSource>,
    pub invalid_sources: Vec<InvalidSource>,
    pub rejected_paths: Vec<String>,
}

pub fn discovery_section(discovery: &Discovery) -> DiscoverySection {
    DiscoverySection {
        capabilities: discovery.capabilities.iter().copied().collect(),
        aggregate_script: discovery.aggregate_script.clone(),
        script_count: discovery.script_names.len(),
        schema_sources: discovery.schema_sources.clone(),
        invalid_sources: discovery.invalid_sources.clone(),
        rejected_paths: discovery.rejected_paths.clone(),
    }
}

/// Per-entity digest of what introspection learned.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub source: PathBuf,
    pub keys: Vec<DocumentKey>,
    pub discriminator: Discriminator,
    pub db_bean_fields: usize,
    pub required_document_fields: usize,
}

pub fn entity_summaries(introspection: &Introspection) -> Vec<EntitySummary> {
    introspection
        .entities
        .values()
        .map(|entity| EntitySummary {
            name: entity.name.clone(),
            source: entity.source.clone(),
            keys: entity.required_keys.clone(),
            discriminator: entity.discriminator.clone(),
            db_bean_fields: introspection.db_fields_for(&entity.name).len(),
            required_document_fields: entity.required_document_fields().len(),
        })
        .collect()
}

/// What the convention scan observed in existing module code.
#[derive(Debug, Clone, Serialize)]
pub struct ConventionSection {
    pub converter_files: usize,
    pub procedure_files: usize,
    pub import_style: ImportStyle,
    pub aggregate_index_imports: usize,
    pub per_entity_imports: usize,
    pub known_parameters: Vec<String>,
}

pub fn convention_section(scan: &ConventionScan) -> ConventionSection {
    let (aggregate_index_imports, per_entity_imports) = scan.import_style_counts();
    ConventionSection {
        converter_files: scan.converter_files.len(),
        procedure_files: scan.procedure_files.len(),
        import_style: scan.import_style(),
        aggregate_index_imports,
        per_entity_imports,
        known_parameters: scan
            .known_parameters()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// The complete planning report for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub module_root: PathBuf,
    pub scope: Scope,
    pub state: PlanState,
    pub discovery: DiscoverySection,
    pub entities: Vec<EntitySummary>,
    pub conventions: ConventionSection,
    /// Context decisions per planned entity, every candidate included.
    pub context: Vec<EntityContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<GenerationPlan>,
    pub converters: Vec<ConverterContract>,
    pub procedures: Vec<ProcedureContract>,
    /// Entities excluded by a contract violation, with the violation text.
    pub entity_errors: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl Report {
    /// Re-check every wrapper reference against the filesystem. A wrapper
    /// that vanished between planning and reporting is demoted to the
    /// generated reference, with a warning, so the emitted report never
    /// points at a file that is not there.
    pub fn validate(&mut self, root: &ModuleRoot, config: &EffectiveConfig) {
        for contract in &mut self.converters {
            if contract.bean_reference == BeanReference::Wrapper
                && scaffold::wrapper_file(root, &config.bean_wrapper_dir, &contract.entity)
                    .is_none()
            {
                contract.bean_reference = BeanReference::Generated;
                self.warnings.push(format!(
                    "bean wrapper for '{}' was not found at report time; the converter \
                     references generated beans directly",
                    contract.entity
                ));
            }
        }
        for contract in &mut self.procedures {
            if contract.dao_reference == DaoReference::Wrapper
                && scaffold::wrapper_file(root, &config.dao_wrapper_dir, &contract.entity)
                    .is_none()
            {
                contract.dao_reference = DaoReference::Generated;
                self.warnings.push(format!(
                    "dao wrapper for '{}' was not found at report time; procedures call \
                     the generated dao directly",
                    contract.entity
                ));
            }
        }
    }

    /// Pretty JSON form. Stable for an unchanged module.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Render the report for a terminal.
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!("\n📋 Planning Report: {}", report.module_root.display()),
    );
    push_line(
        &mut out,
        format!("   scope: {} | state: {}", report.scope, report.state),
    );

    render_discovery(&mut out, &report.discovery);
    render_entities(&mut out, &report.entities);
    render_conventions(&mut out, &report.conventions);
    render_context(&mut out, &report.context);
    if let Some(plan) = &report.plan {
        render_plan(&mut out, plan);
    }
    render_converters(&mut out, &report.converters);
    render_procedures(&mut out, &report.procedures);

    if !report.warnings.is_empty() {
        push_line(
            &mut out,
            format!("\n⚠️  Warnings ({}):", report.warnings.len()),
        );
        for warning in &report.warnings {
            push_line(&mut out, format!("   - {warning}"));
        }
    }

    if !report.entity_errors.is_empty() {
        push_line(
            &mut out,
            format!("\n❌ Entity errors ({}):", report.entity_errors.len()),
        );
        for (entity, error) in &report.entity_errors {
            push_line(&mut out, format!("   {entity}: {error}"));
        }
    }

    match report.state {
        PlanState::Paused => {
            push_line(
                &mut out,
                "\n⏸️  Paused: node dependencies are not installed".to_string(),
            );
            if let Some(command) = report
                .plan
                .as_ref()
                .and_then(|p| p.preflight.remedial_command.as_deref())
            {
                push_line(&mut out, format!("   💡 Run: {command}"));
                push_line(
                    &mut out,
                    "   then run the same plan again to resume".to_string(),
                );
            }
        }
        PlanState::Ready => {
            let steps = report.plan.as_ref().map(|p| p.steps.len()).unwrap_or(0);
            push_line(&mut out, format!("\n✅ Plan ready: {steps} step(s)"));
        }
        _ => {
            push_line(&mut out, "\n✅ Report complete".to_string());
        }
    }
    out
}

/// Print the rendered report to stdout.
pub fn print_report(report: &Report) {
    println!("{}", render_report(report));
}

fn render_discovery(out: &mut String, discovery: &DiscoverySection) {
    push_line(out, "\n🧭 Discovery:".to_string());
    let capabilities = if discovery.capabilities.is_empty() {
        "none".to_string()
    } else {
        discovery
            .capabilities
            .iter()
            .map(Capability::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    push_line(out, format!("   capabilities: {capabilities}"));
    if let Some(script) = &discovery.aggregate_script {
        push_line(out, format!("   aggregate script: {script}"));
    }
    push_line(
        out,
        format!(
            "   schema sources: {} valid, {} invalid",
            discovery.schema_sources.len(),
            discovery.invalid_sources.len()
        ),
    );
    for invalid in &discovery.invalid_sources {
        push_line(
            out,
            format!(
                "      ❌ [{}] {} '{}' is {}",
                invalid.capability, invalid.kind, invalid.declared, invalid.reason
            ),
        );
    }
}

fn render_entities(out: &mut String, entities: &[EntitySummary]) {
    push_line(out, format!("\n📦 Entities ({}):", entities.len()));
    for entity in entities {
        push_line(out, format!("   {}", entity.name));
        let keys = entity
            .keys
            .iter()
            .map(|k| format!("{} ({})", k.name, k.kind))
            .collect::<Vec<_>>()
            .join(", ");
        push_line(out, format!("      keys: {keys}"));
        push_line(
            out,
            format!(
                "      discriminator: {} = \"{}\"",
                entity.discriminator.field, entity.discriminator.value
            ),
        );
        push_line(
            out,
            format!(
                "      db bean fields: {} | required document fields: {}",
                entity.db_bean_fields, entity.required_document_fields
            ),
        );
    }
}

fn render_conventions(out: &mut String, conventions: &ConventionSection) {
    push_line(out, "\n🔎 Conventions:".to_string());
    push_line(
        out,
        format!(
            "   existing converters: {} | existing procedures: {}",
            conventions.converter_files, conventions.procedure_files
        ),
    );
    push_line(
        out,
        format!(
            "   bean import style: {} ({} aggregate-index, {} per-entity)",
            conventions.import_style,
            conventions.aggregate_index_imports,
            conventions.per_entity_imports
        ),
    );
}

fn render_context(out: &mut String, context: &[EntityContext]) {
    if context.is_empty() {
        return;
    }
    push_line(out, "\n🧩 Context parameters:".to_string());
    for entity in context {
        let parameters = entity
            .ordered_parameters()
            .iter()
            .map(|c| c.field_name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let parameters = if parameters.is_empty() {
            "(none needed)".to_string()
        } else {
            parameters
        };
        push_line(out, format!("   {}: {}", entity.entity, parameters));
        for decision in &entity.decisions {
            let chosen = decision.chosen_candidate();
            push_line(
                out,
                format!(
                    "      {} -> {} ({} candidate{}; {})",
                    decision.key.name,
                    chosen.field_name,
                    decision.candidates.len(),
                    if decision.candidates.len() == 1 { "" } else { "s" },
                    chosen.rationale
                ),
            );
        }
        for note in &entity.notes {
            push_line(out, format!("      note: {note}"));
        }
    }
}

fn render_plan(out: &mut String, plan: &GenerationPlan) {
    push_line(out, format!("\n🗺️  Generation plan ({}):", plan.mode));
    for (index, step) in plan.steps.iter().enumerate() {
        let label = match step {
            PlanStep::Aggregate { script, .. } => format!("[all] script '{script}'"),
            PlanStep::Generate {
                capability,
                script: Some(script),
                ..
            } => format!("[{capability}] script '{script}'"),
            PlanStep::Generate {
                capability,
                script: None,
                ..
            } => format!("[{capability}] (no declaring script)"),
        };
        push_line(
            out,
            format!("   {}. {}: {}", index + 1, label, step.command()),
        );
    }
    for warning in &plan.warnings {
        push_line(out, format!("   ⚠️  {warning}"));
    }
    let outputs = plan
        .preflight
        .outputs_present
        .iter()
        .map(|(capability, present)| {
            format!("{capability} {}", if *present { "✅" } else { "❌" })
        })
        .collect::<Vec<_>>()
        .join(" | ");
    if !outputs.is_empty() {
        push_line(out, format!("   outputs present: {outputs}"));
    }
    push_line(
        out,
        format!(
            "   node dependencies: {}",
            if plan.preflight.node_dependencies_installed {
                "installed"
            } else {
                "missing"
            }
        ),
    );
}

fn render_converters(out: &mut String, converters: &[ConverterContract]) {
    if converters.is_empty() {
        return;
    }
    push_line(out, format!("\n🔁 Converters ({}):", converters.len()));
    for contract in converters {
        let context = contract
            .context_parameters
            .iter()
            .map(|c| c.field_name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let context = if context.is_empty() {
            "none".to_string()
        } else {
            context
        };
        push_line(
            out,
            format!(
                "   {}: {} fields to db, {} from db | context: {} | imports: {} | beans: {}",
                contract.entity,
                contract.document_to_db.len(),
                contract.db_to_document.len(),
                context,
                contract.import_style,
                match contract.bean_reference {
                    BeanReference::Wrapper => "wrapper",
                    BeanReference::Generated => "generated",
                }
            ),
        );
    }
}

fn render_procedures(out: &mut String, procedures: &[ProcedureContract]) {
    if procedures.is_empty() {
        return;
    }
    push_line(out, format!("\n🧾 Procedures ({}):", procedures.len()));
    for contract in procedures {
        push_line(
            out,
            format!(
                "   {}: timestamps {}, id generation {}, dao {}",
                contract.entity,
                contract.timestamp_owner,
                contract.id_generation,
                match contract.dao_reference {
                    DaoReference::Wrapper => "wrapper",
                    DaoReference::Generated => "generated",
                }
            ),
        );
        for method in &contract.methods {
            push_line(
                out,
                format!(
                    "      {}({}) -> {} [{}]",
                    method.name,
                    method.parameters.join(", "),
                    method.returns,
                    method.dao_choice.chosen_dao
                ),
            );
        }
        for note in &contract.notes {
            push_line(out, format!("      note: {note}"));
        }
    }
}

fn push_line(out: &mut String, line: String) {
    out.push_str(&line);
    out.push('\n');
}
