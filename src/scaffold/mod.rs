//! Scaffold planning.
//!
//! These planners turn entity metadata and inferred context into contract
//! descriptions of the converters and procedures a developer would write
//! next. They propose; they never write module files, and an entity that
//! already has a hand-written converter or procedure is skipped with a note
//! rather than overwritten.
//!
//! The layering rule is strict in both directions: converters are the only
//! place where document and database representations meet, and procedure
//! signatures speak database-representation terms exclusively.

use std::path::{Path, PathBuf};

use crate::boundary::ModuleRoot;

pub mod converter;
pub mod procedure;

pub use converter::{
    plan_converter, BeanReference, ConverterContract, DbToDocumentField, DocumentFieldSource,
    DocumentToDbField,
};
pub use procedure::{
    plan_procedure, DaoChoiceDecision, DaoKind, DaoReference, IdGenerationPolicy, InvariantScope,
    MethodIntent, MethodRequest, OperationType, ProcedureContract, ProcedureMethod,
    TimestampOwner,
};

const WRAPPER_EXTENSIONS: [&str; 4] = ["js", "mjs", "cjs", "ts"];

/// Locate the hand-written wrapper file for an entity under a wrapper
/// directory. Probes the entity name as declared plus its camelCase and
/// kebab-case spellings, in that order.
pub fn wrapper_file(root: &ModuleRoot, wrapper_dir: &Path, entity: &str) -> Option<PathBuf> {
    let dir = root.path().join(wrapper_dir);
    let mut stems = vec![entity.to_string()];
    for variant in [lower_camel(entity), kebab_case(entity)] {
        if !stems.contains(&variant) {
            stems.push(variant);
        }
    }
    for stem in &stems {
        for ext in WRAPPER_EXTENSIONS {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::new();
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
