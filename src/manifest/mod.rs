//! # Manifest Discovery Module
//!
//! Parses a module's declared generation invocations to learn which
//! capabilities are configured and which schema/model files they reference.
//!
//! ## What is parsed
//!
//! The module's `package.json` `scripts` section. A generation script is any
//! script whose command invokes the configured generator (default
//! `persistence-gen`); the generator subcommand names the capability:
//!
//! | subcommand           | capability          |
//! |----------------------|---------------------|
//! | `db-bean`            | [`Capability::DbBean`] |
//! | `document-bean`      | [`Capability::DocumentBean`] |
//! | `dao`                | [`Capability::Dao`] |
//! | `transactional-dao`  | [`Capability::TransactionalDao`] |
//! | `all`                | aggregate script    |
//!
//! Path arguments (`--schema`, `--model`, `--out`) are extracted from the
//! command text, resolved against the module root, and boundary-checked.
//! Scripts are **never executed**; discovery only recovers the declared
//! data-flow contract between capabilities and schema paths.
//!
//! ## Failure posture
//!
//! A missing or unparseable `package.json` fails discovery. Everything else
//! degrades: unrecognized subcommands, duplicate declarations, and invalid
//! paths become warnings, and an invalid path additionally marks the owning
//! capability unavailable for this run.

mod discover;
mod types;

pub use discover::discover;
pub use types::{
    Capability, Discovery, InvalidSource, SchemaSource, ScriptInvocation, SourceKind,
    SourceRejection,
};
