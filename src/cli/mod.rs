//! # CLI Module
//!
//! Command-line interface for the planning pipeline.
//!
//! ## Commands
//!
//! ### `plan`
//!
//! Run a full planning pass over a module and print the report:
//!
//! ```bash
//! stratagen plan --module ./subscription-store --scope full-procedure
//! ```
//!
//! Options:
//! - `--module <DIR>` - Module root (default: current directory)
//! - `--scope <SCOPE>` - How much to plan (default: full-procedure)
//! - `--mode <MODE>` - Generation resolution: auto or chain
//! - `--entity <NAME>` - Limit scaffolds to named entities (repeatable)
//! - `--with-transactions` - Append a transactional-dao step
//! - `--resume` - Re-run after clearing a pause; all checks repeat
//! - `--context-override <ENTITY:KEY=NAME>` - Pin a context parameter name
//! - `--import-style <STYLE>` - Pin the bean import style
//! - `--timestamps <OWNER>` - Who stamps createdAt/updatedAt
//! - `--id-generation <POLICY>` - When procedures generate ids
//! - `--install-script <NAME>` - Package script that installs dependencies
//! - `--method <INTENT[:multi|:cross]>` - Procedure methods (repeatable)
//! - `--format <text|json>` - Report rendering (default: text)
//! - `--output <FILE>` - Also write the JSON report to a file
//!
//! A plan that pauses on missing node dependencies still exits 0; the pause
//! is a deliberate halt, not a failure.
//!
//! ### `discover`
//!
//! Manifest discovery only, for debugging a module's scripts:
//!
//! ```bash
//! stratagen discover --module ./subscription-store
//! ```
//!
//! ### `introspect`
//!
//! Discovery plus schema introspection; `--entity` narrows the listing:
//!
//! ```bash
//! stratagen introspect --module ./subscription-store --format json
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
