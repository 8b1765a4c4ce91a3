use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::boundary::ModuleRoot;
use crate::config::resolve_config;
use crate::conventions::ImportStyle;
use crate::manifest::{discover, Discovery};
use crate::pipeline::{self, RunOptions, Scope, ScopedOverride};
use crate::planner::PlanMode;
use crate::report::print_report;
use crate::scaffold::{IdGenerationPolicy, MethodRequest, TimestampOwner};
use crate::schema::{introspect, Introspection};

/// Command-line interface for the persistence planning pipeline.
#[derive(Parser)]
#[command(name = "stratagen")]
#[command(about = "Plan persistence-layer generation and scaffolds for a module", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a full planning pass over a module and print the report
    Plan {
        /// Module root directory (where package.json lives)
        #[arg(short, long, default_value = ".")]
        module: PathBuf,

        /// How much of the pipeline to run
        #[arg(long, value_enum, default_value_t = ScopeArg::FullProcedure)]
        scope: ScopeArg,

        /// How generation steps are resolved
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Plan scaffolds for these entities only (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Append a transactional-dao step even when no script declares one
        #[arg(long, default_value_t = false)]
        with_transactions: bool,

        /// Re-run after clearing a pause; every check repeats from scratch
        #[arg(long, default_value_t = false)]
        resume: bool,

        /// Pin a context parameter name: entity:key=name (repeatable)
        #[arg(long = "context-override")]
        context_overrides: Vec<String>,

        /// Pin the bean import style instead of following module precedent
        #[arg(long, value_enum)]
        import_style: Option<ImportStyleArg>,

        /// Who owns createdAt/updatedAt stamping
        #[arg(long, value_enum)]
        timestamps: Option<TimestampsArg>,

        /// When procedures generate entity ids
        #[arg(long, value_enum)]
        id_generation: Option<IdGenerationArg>,

        /// Package script that installs node dependencies
        #[arg(long)]
        install_script: Option<String>,

        /// Procedure method intents, e.g. get or post:multi (repeatable)
        #[arg(long = "method")]
        methods: Vec<String>,

        /// Report rendering on stdout
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse the module manifest and show the discovered capabilities
    Discover {
        /// Module root directory (where package.json lives)
        #[arg(short, long, default_value = ".")]
        module: PathBuf,

        /// Output rendering
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
    /// Read the declared schema sources and show entity metadata
    Introspect {
        /// Module root directory (where package.json lives)
        #[arg(short, long, default_value = ".")]
        module: PathBuf,

        /// Show these entities only (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Output rendering
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
}

/// Pipeline scope accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// Resolve and preflight the generation plan only
    GenerationOnly,
    /// Plan converter contracts only (never pauses)
    ConverterOnly,
    /// Generation plan plus converter contracts
    GenerationAndConverter,
    /// Procedure method contracts only
    ProcedureMethods,
    /// Plan, converters, and procedures
    FullProcedure,
}

impl ScopeArg {
    fn scope(self) -> Scope {
        match self {
            ScopeArg::GenerationOnly => Scope::GenerationOnly,
            ScopeArg::ConverterOnly => Scope::ConverterOnly,
            ScopeArg::GenerationAndConverter => Scope::GenerationAndConverter,
            ScopeArg::ProcedureMethods => Scope::ProcedureMethods,
            ScopeArg::FullProcedure => Scope::FullProcedure,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Prefer the aggregate script, fall back to the chain
    Auto,
    /// Always resolve the per-capability chain
    Chain,
}

impl ModeArg {
    fn mode(self) -> PlanMode {
        match self {
            ModeArg::Auto => PlanMode::Auto,
            ModeArg::Chain => PlanMode::Chain,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ImportStyleArg {
    /// One import from the aggregate index module
    AggregateIndex,
    /// One import per entity module
    PerEntity,
}

impl ImportStyleArg {
    fn style(self) -> ImportStyle {
        match self {
            ImportStyleArg::AggregateIndex => ImportStyle::AggregateIndex,
            ImportStyleArg::PerEntity => ImportStyle::PerEntity,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TimestampsArg {
    /// The DAO layer stamps timestamps (default behavior)
    Dao,
    /// Procedures stamp timestamps themselves
    Procedure,
}

impl TimestampsArg {
    fn owner(self) -> TimestampOwner {
        match self {
            TimestampsArg::Dao => TimestampOwner::Dao,
            TimestampsArg::Procedure => TimestampOwner::Procedure,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum IdGenerationArg {
    /// Generate an id only when the caller did not supply one
    Conditional,
    /// Always generate, replacing any caller-supplied id
    Always,
    /// Never generate; the caller must supply ids
    Never,
}

impl IdGenerationArg {
    fn policy(self) -> IdGenerationPolicy {
        match self {
            IdGenerationArg::Conditional => IdGenerationPolicy::Conditional,
            IdGenerationArg::Always => IdGenerationPolicy::Always,
            IdGenerationArg::Never => IdGenerationPolicy::Never,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Human-readable report
    Text,
    /// Pretty JSON, stable for an unchanged module
    Json,
}

/// Execute the CLI command provided by the user.
///
/// A paused plan is a successful invocation; only taxonomy errors (bad
/// module, broken config, missing capability, ambiguous context) exit
/// non-zero.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Plan {
            module,
            scope,
            mode,
            entities,
            with_transactions,
            resume,
            context_overrides,
            import_style,
            timestamps,
            id_generation,
            install_script,
            methods,
            format,
            output,
        } => {
            let options = RunOptions {
                scope: scope.scope(),
                mode: mode.mode(),
                entities: entities.clone(),
                with_transactions: *with_transactions,
                resume: *resume,
                context_overrides: parse_overrides(context_overrides)?,
                import_style: import_style.map(ImportStyleArg::style),
                timestamps: timestamps.map(TimestampsArg::owner),
                id_generation: id_generation.map(IdGenerationArg::policy),
                install_script: install_script.clone(),
                methods: parse_methods(methods)?,
            };
            let report = pipeline::run(module, &options)?;
            if let Some(path) = output {
                std::fs::write(path, report.to_json()? + "\n")?;
            }
            match format {
                FormatArg::Text => print_report(&report),
                FormatArg::Json => println!("{}", report.to_json()?),
            }
            Ok(())
        }
        Commands::Discover { module, format } => {
            let root = ModuleRoot::resolve(module)?;
            let config = resolve_config(&root, None)?;
            let discovery = discover(&root, &config)?;
            match format {
                FormatArg::Text => print_discovery(&root, &discovery),
                FormatArg::Json => println!("{}", serde_json::to_string_pretty(&discovery)?),
            }
            Ok(())
        }
        Commands::Introspect {
            module,
            entities,
            format,
        } => {
            let root = ModuleRoot::resolve(module)?;
            let config = resolve_config(&root, None)?;
            let discovery = discover(&root, &config)?;
            let mut introspection = introspect(&root, &discovery.schema_sources, &config)?;
            if !entities.is_empty() {
                let selected = pipeline::select_entities(&introspection, entities)?;
                introspection.entities.retain(|name, _| selected.contains(name));
                introspection
                    .db_bean_fields
                    .retain(|name, _| selected.contains(name));
            }
            match format {
                FormatArg::Text => print_introspection(&root, &introspection),
                FormatArg::Json => println!("{}", serde_json::to_string_pretty(&introspection)?),
            }
            Ok(())
        }
    }
}

fn parse_overrides(raw: &[String]) -> anyhow::Result<Vec<ScopedOverride>> {
    let mut parsed = Vec::with_capacity(raw.len());
    for value in raw {
        let Some(scoped) = ScopedOverride::parse(value) else {
            anyhow::bail!("invalid context override '{value}' (expected entity:key=name)");
        };
        parsed.push(scoped);
    }
    Ok(parsed)
}

fn parse_methods(raw: &[String]) -> anyhow::Result<Vec<MethodRequest>> {
    let mut parsed = Vec::with_capacity(raw.len());
    for value in raw {
        parsed.push(MethodRequest::parse(value)?);
    }
    Ok(parsed)
}

fn print_discovery(root: &ModuleRoot, discovery: &Discovery) {
    println!("\n🧭 Discovery: {}", root.path().display());
    let capabilities = discovery
        .capabilities
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "   capabilities: {}",
        if capabilities.is_empty() {
            "none"
        } else {
            &capabilities
        }
    );
    if let Some(script) = &discovery.aggregate_script {
        println!("   aggregate script: {script}");
    }
    for source in &discovery.schema_sources {
        println!(
            "   ✅ [{}] {} '{}'",
            source.capability, source.kind, source.declared
        );
    }
    for invalid in &discovery.invalid_sources {
        println!(
            "   ❌ [{}] {} '{}' is {}",
            invalid.capability, invalid.kind, invalid.declared, invalid.reason
        );
    }
    for warning in &discovery.warnings {
        println!("   ⚠️  {warning}");
    }
}

fn print_introspection(root: &ModuleRoot, introspection: &Introspection) {
    println!("\n📦 Introspection: {}", root.path().display());
    for entity in introspection.entities.values() {
        println!("   {} ({})", entity.name, relative(root, &entity.source));
        let keys = entity
            .required_keys
            .iter()
            .map(|k| format!("{} ({})", k.name, k.kind))
            .collect::<Vec<_>>()
            .join(", ");
        println!("      keys: {keys}");
        println!(
            "      discriminator: {} = \"{}\"",
            entity.discriminator.field, entity.discriminator.value
        );
        let db_fields = introspection.db_fields_for(&entity.name);
        if db_fields.is_empty() {
            println!("      db bean fields: none declared");
        } else {
            println!("      db bean fields: {}", db_fields.join(", "));
        }
    }
    for warning in &introspection.warnings {
        println!("   ⚠️  {warning}");
    }
}

fn relative(root: &ModuleRoot, path: &Path) -> String {
    path.strip_prefix(root.path())
        .unwrap_or(path)
        .display()
        .to_string()
}
