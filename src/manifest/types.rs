use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A generation capability declared by the module's package scripts.
///
/// A capability exists for exactly one planning run; it is re-derived from the
/// manifest on every invocation and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    DbBean,
    DocumentBean,
    Dao,
    TransactionalDao,
}

impl Capability {
    /// Generator subcommand that declares this capability.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Capability::DbBean => "db-bean",
            Capability::DocumentBean => "document-bean",
            Capability::Dao => "dao",
            Capability::TransactionalDao => "transactional-dao",
        }
    }

    pub fn from_subcommand(subcommand: &str) -> Option<Self> {
        match subcommand {
            "db-bean" => Some(Capability::DbBean),
            "document-bean" => Some(Capability::DocumentBean),
            "dao" => Some(Capability::Dao),
            "transactional-dao" => Some(Capability::TransactionalDao),
            _ => None,
        }
    }

    /// All capabilities in chain order.
    pub fn chain_order() -> [Capability; 4] {
        [
            Capability::DbBean,
            Capability::DocumentBean,
            Capability::Dao,
            Capability::TransactionalDao,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

/// Which input argument of a generation invocation a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// `--schema`: the document-side schema (keys, discriminator, fields).
    DocumentSchema,
    /// `--model`: the database-side model (DB bean fields).
    DbModel,
    /// `--out`: a generated-output location. Never a schema source; it only
    /// appears on [`InvalidSource`] when an out path escapes the boundary.
    Output,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::DocumentSchema => f.write_str("schema"),
            SourceKind::DbModel => f.write_str("model"),
            SourceKind::Output => f.write_str("out"),
        }
    }
}

/// A schema/model input declared by a generation script, resolved inside the
/// module boundary and confirmed to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSource {
    /// Capability that consumes this input.
    pub capability: Capability,
    pub kind: SourceKind,
    /// Path exactly as written in the script command.
    pub declared: String,
    /// Boundary-checked absolute path.
    pub resolved: PathBuf,
    pub exists: bool,
}

/// Why a declared input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceRejection {
    OutsideBoundary,
    Missing,
}

impl fmt::Display for SourceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRejection::OutsideBoundary => f.write_str("outside module boundary"),
            SourceRejection::Missing => f.write_str("missing"),
        }
    }
}

/// A declared input that failed validation. The owning capability is marked
/// unavailable rather than silently skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidSource {
    pub capability: Capability,
    pub kind: SourceKind,
    pub declared: String,
    pub reason: SourceRejection,
}

/// One parsed generation invocation from the package scripts. Parsed, never
/// executed.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptInvocation {
    /// Script name in package.json (e.g. `generate:dao`).
    pub script: String,
    /// Full command text as declared.
    pub command: String,
    /// Capability declared by the generator subcommand, if recognized.
    pub capability: Option<Capability>,
    /// Whether this is the aggregate (`all`) invocation.
    pub aggregate: bool,
    pub schema_arg: Option<String>,
    pub model_arg: Option<String>,
    pub out_arg: Option<String>,
}

/// Everything the discoverer learned from one pass over the manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    /// Capabilities with a recognized invocation and no invalid inputs.
    pub capabilities: std::collections::BTreeSet<Capability>,
    /// Valid, in-boundary, existing schema/model inputs.
    pub schema_sources: Vec<SchemaSource>,
    /// Declared inputs that failed boundary or existence checks.
    pub invalid_sources: Vec<InvalidSource>,
    /// Aggregate script name, when one is declared and its inputs are valid.
    pub aggregate_script: Option<String>,
    /// Every script name in the manifest, recognized or not.
    pub script_names: std::collections::BTreeSet<String>,
    /// Every recognized generator invocation, in script-name order.
    pub invocations: Vec<ScriptInvocation>,
    /// Paths rejected by the boundary check, as declared.
    pub rejected_paths: Vec<String>,
    /// Non-fatal oddities surfaced in the report.
    pub warnings: Vec<String>,
}

impl Discovery {
    /// Invocation for a capability, if one was recognized.
    pub fn invocation_for(&self, capability: Capability) -> Option<&ScriptInvocation> {
        self.invocations
            .iter()
            .find(|inv| inv.capability == Some(capability))
    }

    /// Valid document-schema sources, in discovery order.
    pub fn document_schema_sources(&self) -> impl Iterator<Item = &SchemaSource> {
        self.schema_sources
            .iter()
            .filter(|s| s.kind == SourceKind::DocumentSchema)
    }

    /// Valid db-model sources, in discovery order.
    pub fn db_model_sources(&self) -> impl Iterator<Item = &SchemaSource> {
        self.schema_sources
            .iter()
            .filter(|s| s.kind == SourceKind::DbModel)
    }
}
