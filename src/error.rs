//! Error taxonomy for the planning pipeline.
//!
//! Every fatal condition carries enough context (entity name, offending path,
//! violated rule) for a human to correct the module and re-run. A paused plan
//! is *not* an error and therefore does not appear here; see
//! [`crate::planner::PlanState::Paused`].

use crate::manifest::Capability;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A path escaped the resolved module root. Never corrected silently.
    #[error("path {path:?} is outside the module boundary {root:?}")]
    Boundary { path: PathBuf, root: PathBuf },

    /// The module selector did not resolve to an existing directory.
    #[error("module root {path:?} does not exist or is not a directory")]
    ModuleRootNotFound { path: PathBuf },

    /// The module manifest (package.json) is missing or unparseable.
    #[error("manifest error at {path:?}: {detail}")]
    Manifest { path: PathBuf, detail: String },

    /// An explicit stratagen.toml exists but could not be parsed. Explicit
    /// configuration is never silently ignored.
    #[error("config error at {path:?}: {detail}")]
    Config { path: PathBuf, detail: String },

    /// A plan requires a capability the module does not declare.
    #[error("plan cannot be satisfied: missing {capability} capability")]
    MissingCapability { capability: Capability },

    /// A declared schema source does not exist where the scripts say it does.
    #[error("{capability} schema source {path:?} is missing")]
    MissingSchema { capability: Capability, path: PathBuf },

    /// A schema or model file exists but could not be understood.
    #[error("introspection failed for {path:?}: {detail}")]
    Introspection { path: PathBuf, detail: String },

    /// A scaffold would violate a fixed contract rule. Never auto-resolved.
    #[error("contract violation for entity '{entity}' ({rule}): {detail}")]
    ContractViolation {
        entity: String,
        rule: &'static str,
        detail: String,
    },

    /// A requested procedure method intent could not be parsed.
    #[error("unrecognized method intent '{value}' (expected get|post|update|delete|list, optionally :multi or :cross)")]
    InvalidIntent { value: String },

    /// An explicitly requested entity is not defined by any schema source.
    #[error("entity '{entity}' is not defined by any discovered schema source")]
    UnknownEntity { entity: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
