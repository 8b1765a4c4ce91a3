//! Local convention scanning.
//!
//! Existing hand-written converters and procedures are the precedent for what
//! gets planned next: parameter names they already use, the bean import style
//! they follow, and which entities already have files. Precedent is strictly
//! module-local; nothing outside the module root is ever consulted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::error::Result;

/// How converters bring generated beans into scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStyle {
    /// One import from the aggregate index module.
    AggregateIndex,
    /// One import per entity module.
    PerEntity,
}

impl std::fmt::Display for ImportStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportStyle::AggregateIndex => f.write_str("aggregate-index"),
            ImportStyle::PerEntity => f.write_str("per-entity"),
        }
    }
}

/// A recorded prior use of a name, with the file that used it most recently
/// and the byte offset of its first occurrence there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedent {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub position: usize,
}

/// What context inference and scaffold planning are allowed to ask about
/// existing module code. Implemented by the filesystem scan in production and
/// by fixed stubs in tests.
pub trait ConventionSource {
    /// Most recent converter that used `name` as a function parameter.
    fn parameter_precedent(&self, name: &str) -> Option<&Precedent>;

    /// Every parameter name with recorded precedent, sorted.
    fn known_parameters(&self) -> Vec<&str>;

    /// Import style observed in existing converters, if any exist.
    fn observed_import_style(&self) -> Option<ImportStyle>;

    /// Resolved style: observed, or aggregate-index when nothing exists yet.
    fn import_style(&self) -> ImportStyle {
        self.observed_import_style()
            .unwrap_or(ImportStyle::AggregateIndex)
    }

    /// Existing converter file for an entity, if one is already written.
    fn existing_converter(&self, entity: &str) -> Option<&Path>;

    /// Existing procedure file for an entity, if one is already written.
    fn existing_procedure(&self, entity: &str) -> Option<&Path>;
}

/// Result of walking the module's converter and procedure directories.
#[derive(Debug, Default)]
pub struct ConventionScan {
    parameters: BTreeMap<String, Precedent>,
    import_observations: Vec<(ImportStyle, SystemTime, PathBuf)>,
    converters: BTreeMap<String, PathBuf>,
    procedures: BTreeMap<String, PathBuf>,
    pub converter_files: Vec<PathBuf>,
    pub procedure_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

static FUNC_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"function\s+[A-Za-z0-9_$]*\s*\(([^)]*)\)").unwrap());
static ARROW_PARAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:const|let|var)\s+[A-Za-z0-9_$]+\s*=\s*(?:async\s*)?\(([^)]*)\)\s*=>").unwrap()
});
static IMPORT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:import|export)\s+[^;]*?from\s+['"]([^'"]+)['"]"#).unwrap());
static REQUIRE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static CONVERTER_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z0-9]+?)[-_.]?converter$").unwrap());
static PROCEDURE_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z0-9]+?)[-_.]?procedures?$").unwrap());
static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Scan the configured converter and procedure directories. Absent
/// directories yield an empty scan; an unreadable file is a warning, never a
/// fatal error.
pub fn scan_conventions(root: &ModuleRoot, config: &EffectiveConfig) -> Result<ConventionScan> {
    let mut scan = ConventionScan::default();

    let converter_dir = root.path().join(&config.converter_dir);
    for path in source_files(&converter_dir) {
        scan.record_converter(&path);
    }

    let procedure_dir = root.path().join(&config.procedure_dir);
    for path in source_files(&procedure_dir) {
        scan.record_procedure(&path);
    }

    if scan.import_style_conflict() {
        scan.warnings.push(
            "existing converters disagree on bean import style at the same timestamp; \
             defaulting to aggregate-index"
                .to_string(),
        );
    }
    if let Some(style) = scan.observed_import_style() {
        debug!(
            %style,
            converters = scan.converter_files.len(),
            "observed bean import style"
        );
    }
    Ok(scan)
}

fn source_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs")
            )
        })
        .collect();
    files.sort();
    files
}

impl ConventionScan {
    fn record_converter(&mut self, path: &Path) {
        self.converter_files.push(path.to_path_buf());
        if let Some(entity) = stem_entity(path, &CONVERTER_STEM) {
            self.converters.entry(entity).or_insert_with(|| path.to_path_buf());
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                self.warnings
                    .push(format!("could not read {}: {e}", path.display()));
                return;
            }
        };
        let modified = file_modified(path);

        for capture in FUNC_PARAMS
            .captures_iter(&contents)
            .chain(ARROW_PARAMS.captures_iter(&contents))
        {
            let list = capture.get(1).map(|m| (m.as_str(), m.start()));
            if let Some((raw, base)) = list {
                for (name, offset) in parameter_names(raw) {
                    self.note_parameter(name, path, modified, base + offset);
                }
            }
        }
        for capture in IMPORT_FROM
            .captures_iter(&contents)
            .chain(REQUIRE_CALL.captures_iter(&contents))
        {
            if let Some(style) = classify_bean_import(&capture[1]) {
                self.import_observations
                    .push((style, modified, path.to_path_buf()));
            }
        }
    }

    fn record_procedure(&mut self, path: &Path) {
        self.procedure_files.push(path.to_path_buf());
        if let Some(entity) = stem_entity(path, &PROCEDURE_STEM) {
            self.procedures.entry(entity).or_insert_with(|| path.to_path_buf());
        }
    }

    fn note_parameter(&mut self, name: String, path: &Path, modified: SystemTime, position: usize) {
        let entry = self.parameters.entry(name).or_insert_with(|| Precedent {
            path: path.to_path_buf(),
            modified,
            position,
        });
        if modified > entry.modified {
            entry.path = path.to_path_buf();
            entry.modified = modified;
            entry.position = position;
        } else if modified == entry.modified && path == entry.path && position < entry.position {
            entry.position = position;
        }
    }

    /// Style of the most recently modified bean import. Two equally recent
    /// files disagreeing falls back to aggregate-index.
    fn decide_import_style(&self) -> Option<ImportStyle> {
        if self.import_style_conflict() {
            return Some(ImportStyle::AggregateIndex);
        }
        self.most_recent_observation().map(|(style, _, _)| *style)
    }

    fn most_recent_observation(&self) -> Option<&(ImportStyle, SystemTime, PathBuf)> {
        self.import_observations.iter().max_by_key(|(_, time, _)| *time)
    }

    fn import_style_conflict(&self) -> bool {
        let Some((first_style, first_time, _)) = self.most_recent_observation() else {
            return false;
        };
        self.import_observations
            .iter()
            .any(|(style, time, _)| time == first_time && style != first_style)
    }

    /// (aggregate-index, per-entity) observation counts, for reporting.
    pub fn import_style_counts(&self) -> (usize, usize) {
        let aggregate = self
            .import_observations
            .iter()
            .filter(|(s, _, _)| *s == ImportStyle::AggregateIndex)
            .count();
        (aggregate, self.import_observations.len() - aggregate)
    }

}

impl ConventionSource for ConventionScan {
    fn parameter_precedent(&self, name: &str) -> Option<&Precedent> {
        self.parameters.get(name)
    }

    fn known_parameters(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    fn observed_import_style(&self) -> Option<ImportStyle> {
        self.decide_import_style()
    }

    fn existing_converter(&self, entity: &str) -> Option<&Path> {
        self.converters.get(&entity.to_lowercase()).map(PathBuf::as_path)
    }

    fn existing_procedure(&self, entity: &str) -> Option<&Path> {
        self.procedures.get(&entity.to_lowercase()).map(PathBuf::as_path)
    }
}

fn stem_entity(path: &Path, pattern: &Regex) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    // `order.converter.ts` leaves `order.converter` as the stem; take the
    // leading segment match after stripping a trailing `.d` et al.
    let stem = stem.strip_suffix(".d").unwrap_or(stem);
    pattern
        .captures(stem)
        .map(|c| c[1].to_lowercase())
}

/// Parameter names and their byte offsets within a raw parameter list.
/// Type annotations, defaults, and optional markers are stripped;
/// destructuring patterns are skipped.
fn parameter_names(raw: &str) -> Vec<(String, usize)> {
    let mut names = Vec::new();
    let mut offset = 0usize;
    for part in raw.split(',') {
        let leading = part.len() - part.trim_start().len();
        let cleaned = part.trim();
        let cleaned = cleaned.split('=').next().unwrap_or(cleaned).trim();
        let cleaned = cleaned.split(':').next().unwrap_or(cleaned).trim();
        let cleaned = cleaned.trim_end_matches('?');
        if IDENT.is_match(cleaned) {
            names.push((cleaned.to_string(), offset + leading));
        }
        offset += part.len() + 1;
    }
    names
}

/// Classify an import path that targets a beans module; unrelated imports are
/// ignored.
fn classify_bean_import(path: &str) -> Option<ImportStyle> {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let beans_at = segments
        .iter()
        .position(|s| s.ends_with("beans") || *s == "beans")?;
    let mut rest = &segments[beans_at + 1..];
    if let Some((last, head)) = rest.split_last() {
        let trimmed = last
            .trim_end_matches(".js")
            .trim_end_matches(".ts")
            .trim_end_matches(".mjs")
            .trim_end_matches(".cjs");
        if trimmed == "index" {
            rest = head;
        }
    }
    if rest.is_empty() {
        Some(ImportStyle::AggregateIndex)
    } else {
        Some(ImportStyle::PerEntity)
    }
}

fn file_modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
