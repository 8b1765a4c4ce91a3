//! # Stratagen
//!
//! **Stratagen** is a schema-driven planner for the layered persistence code of
//! npm-style modules. It reads a module's `package.json` and declared schema
//! files, infers the contracts of the converters and procedures a developer
//! would write next, and resolves a generation plan for the module's bean and
//! DAO layers. It plans; it never executes module scripts and never writes
//! module files.
//!
//! ## Overview
//!
//! A persistence module declares its generation pipeline as package scripts
//! (`generate:db-bean`, `generate:dao`, ...) that invoke a generator with
//! schema and model paths. Stratagen parses those declarations to discover
//! which capabilities the module has, introspects the referenced schemas for
//! entity metadata, scans existing hand-written code for module conventions,
//! and emits a single deterministic planning report.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`boundary`]** - Module root resolution and path containment checks
//! - **[`config`]** - Effective configuration from defaults, `stratagen.toml`, and flags
//! - **[`manifest`]** - Package-script parsing and capability discovery
//! - **[`schema`]** - Document schema and DB model introspection
//! - **[`conventions`]** - Precedent scanning over existing converters and procedures
//! - **[`context`]** - Context parameter inference for document reconstruction
//! - **[`planner`]** - Generation plan resolution and preflight checks
//! - **[`scaffold`]** - Converter and procedure contract planning
//! - **[`pipeline`]** - The single-pass orchestration of all of the above
//! - **[`report`]** - Report assembly, validation, and rendering
//! - **[`cli`]** - The `stratagen` command-line interface
//!
//! ### Planning Flow
//!
//! One `plan` invocation runs the whole pipeline front to back:
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant CLI as CLI<br/>(stratagen plan)
//!     participant Boundary as boundary::ModuleRoot
//!     participant Manifest as manifest::discover
//!     participant Schema as schema::introspect
//!     participant Conv as conventions::scan_conventions
//!     participant Scaffold as scaffold planners
//!     participant Planner as planner::plan
//!     participant Report as report::Report
//!
//!     User->>CLI: stratagen plan --module ./pkg
//!     CLI->>Boundary: resolve("./pkg")
//!     Boundary-->>CLI: ModuleRoot (canonical)
//!     CLI->>Manifest: parse package.json scripts
//!     Manifest-->>CLI: capabilities + schema sources
//!     CLI->>Schema: read schemas and models
//!     Schema-->>CLI: entity metadata
//!     CLI->>Conv: scan converters/ and procedures/
//!     Conv-->>CLI: naming precedents + import style
//!     CLI->>Scaffold: plan converters and procedures
//!     Scaffold-->>CLI: per-entity contracts
//!     CLI->>Planner: resolve generation steps + preflight
//!     Planner-->>CLI: plan (ready or paused)
//!     CLI->>Report: assemble, re-validate, render
//!     Report-->>User: 📋 planning report
//! ```
//!
//! ### Key Rules
//!
//! 1. **Boundary-contained**: every path dereference stays inside the module root
//! 2. **Read-only**: scripts are parsed, never run; module files are never written
//! 3. **Stateless**: nothing is cached between invocations; resume re-checks everything
//! 4. **Entity-isolated**: a contract violation excludes one entity, not the run
//! 5. **Deterministic**: the same module yields a byte-identical JSON report
//!
//! ## Quick Start
//!
//! ```no_run
//! use stratagen::pipeline::{run, RunOptions};
//!
//! let report = run(std::path::Path::new("./my-module"), &RunOptions::default())
//!     .expect("planning failed");
//! println!("{}", stratagen::report::render_report(&report));
//! ```
//!
//! Or from the command line:
//!
//! ```bash
//! stratagen plan --module ./my-module --scope full-procedure
//! ```

pub mod boundary;
pub mod cli;
pub mod config;
pub mod context;
pub mod conventions;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod scaffold;
pub mod schema;

pub use boundary::ModuleRoot;
pub use error::{Error, Result};
pub use manifest::{discover, Capability, Discovery};
pub use pipeline::{run, RunOptions, Scope};
pub use report::Report;
pub use schema::{introspect, EntityMetadata, Introspection};
