use super::types::{
    Capability, Discovery, InvalidSource, SchemaSource, ScriptInvocation, SourceKind,
    SourceRejection,
};
use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parse the module manifest and derive the declared generation capabilities
/// and their schema/model inputs.
///
/// Script commands are treated as text: they are tokenized and scanned for
/// generator invocations, never executed. Every extracted path argument is
/// resolved against the module root and boundary-checked; a path outside the
/// boundary or a missing input marks the owning capability unavailable
/// instead of being silently skipped.
///
/// # Errors
///
/// Returns [`Error::Manifest`] when `package.json` is absent or unparseable.
/// Malformed individual scripts never fail discovery; they surface as
/// warnings.
pub fn discover(root: &ModuleRoot, config: &EffectiveConfig) -> Result<Discovery> {
    let manifest_path = root.path().join("package.json");
    let contents = std::fs::read_to_string(&manifest_path).map_err(|e| Error::Manifest {
        path: manifest_path.clone(),
        detail: e.to_string(),
    })?;
    let manifest: Value = serde_json::from_str(&contents).map_err(|e| Error::Manifest {
        path: manifest_path.clone(),
        detail: e.to_string(),
    })?;

    let mut discovery = Discovery::default();

    let Some(scripts) = manifest.get("scripts").and_then(Value::as_object) else {
        discovery
            .warnings
            .push("package.json declares no scripts section".to_string());
        return Ok(discovery);
    };

    // serde_json objects iterate in key order, which keeps discovery
    // deterministic regardless of manifest formatting.
    let scripts: BTreeMap<&String, &Value> = scripts.iter().collect();

    for (name, command_value) in scripts {
        discovery.script_names.insert(name.clone());
        let Some(command) = command_value.as_str() else {
            discovery
                .warnings
                .push(format!("script '{name}' is not a string and was skipped"));
            continue;
        };
        let Some(mut invocation) = parse_invocation(name, command, &config.generator_command)
        else {
            continue;
        };

        if invocation.aggregate {
            if discovery.aggregate_script.is_some() {
                discovery.warnings.push(format!(
                    "script '{name}' declares a second aggregate invocation; the first one wins"
                ));
                discovery.invocations.push(invocation);
                continue;
            }
            discovery.aggregate_script = Some(name.clone());
        } else if let Some(capability) = invocation.capability {
            if discovery.invocation_for(capability).is_some() {
                discovery.warnings.push(format!(
                    "script '{name}' re-declares the {capability} capability; the first declaration wins"
                ));
                discovery.invocations.push(invocation);
                continue;
            }
            discovery.capabilities.insert(capability);
        } else {
            discovery.warnings.push(format!(
                "script '{name}' invokes {} with an unrecognized subcommand",
                config.generator_command
            ));
            discovery.invocations.push(invocation);
            continue;
        }

        resolve_sources(root, &invocation, &mut discovery);
        discovery.invocations.push(invocation);
    }

    debug!(
        capabilities = ?discovery.capabilities,
        aggregate = ?discovery.aggregate_script,
        sources = discovery.schema_sources.len(),
        "manifest discovery complete"
    );
    Ok(discovery)
}

/// Boundary-check and existence-check the path arguments of one recognized
/// invocation, recording valid sources and invalidating the owning
/// capability (or the aggregate script) on failure.
fn resolve_sources(root: &ModuleRoot, invocation: &ScriptInvocation, discovery: &mut Discovery) {
    let inputs = [
        (
            SourceKind::DocumentSchema,
            invocation.schema_arg.as_deref(),
            // The aggregate script declares inputs on behalf of the
            // capabilities that consume them.
            invocation.capability.unwrap_or(Capability::DocumentBean),
        ),
        (
            SourceKind::DbModel,
            invocation.model_arg.as_deref(),
            invocation.capability.unwrap_or(Capability::DbBean),
        ),
    ];

    for (kind, declared, capability) in inputs {
        let Some(declared) = declared else { continue };
        match root.contain(Path::new(declared)) {
            Ok(resolved) if resolved.is_file() => {
                discovery.schema_sources.push(SchemaSource {
                    capability,
                    kind,
                    declared: declared.to_string(),
                    resolved,
                    exists: true,
                });
            }
            Ok(_) => {
                invalidate(discovery, invocation, capability, kind, declared, SourceRejection::Missing);
            }
            Err(_) => {
                discovery.rejected_paths.push(declared.to_string());
                invalidate(
                    discovery,
                    invocation,
                    capability,
                    kind,
                    declared,
                    SourceRejection::OutsideBoundary,
                );
            }
        }
    }

    // Out paths only need containment; the outputs themselves are allowed to
    // be missing until generation runs.
    if let Some(out) = invocation.out_arg.as_deref() {
        if root.contain(Path::new(out)).is_err() {
            discovery.rejected_paths.push(out.to_string());
            let capability = invocation.capability.unwrap_or(Capability::DbBean);
            invalidate(
                discovery,
                invocation,
                capability,
                SourceKind::Output,
                out,
                SourceRejection::OutsideBoundary,
            );
        }
    }
}

fn invalidate(
    discovery: &mut Discovery,
    invocation: &ScriptInvocation,
    capability: Capability,
    kind: SourceKind,
    declared: &str,
    reason: SourceRejection,
) {
    discovery.invalid_sources.push(InvalidSource {
        capability,
        kind,
        declared: declared.to_string(),
        reason,
    });
    if invocation.aggregate {
        discovery.aggregate_script = None;
        discovery.warnings.push(format!(
            "aggregate script '{}': {kind} input '{declared}' is {reason}; the aggregate invocation is unusable",
            invocation.script
        ));
    } else {
        discovery.capabilities.remove(&capability);
        discovery.warnings.push(format!(
            "script '{}': {kind} input '{declared}' is {reason}; the {capability} capability is unavailable",
            invocation.script
        ));
    }
}

/// Recognize a generator invocation inside a script command, if present.
///
/// Commands are split on `&&`/`;` and each segment is tokenized shell-style.
/// The segment that invokes the generator (directly, via a path such as
/// `node_modules/.bin/persistence-gen`, or through `npx`) contributes the
/// subcommand and the `--schema`/`--model`/`--out` arguments.
fn parse_invocation(script: &str, command: &str, generator: &str) -> Option<ScriptInvocation> {
    for segment in command.split(|c| c == ';').flat_map(|s| s.split("&&")) {
        let tokens = tokenize(segment);
        let Some(position) = generator_position(&tokens, generator) else {
            continue;
        };

        let rest = &tokens[position + 1..];
        let subcommand = rest.iter().find(|t| !t.starts_with('-'));
        let aggregate = subcommand.map(String::as_str) == Some("all");
        let capability = subcommand.and_then(|s| Capability::from_subcommand(s));

        return Some(ScriptInvocation {
            script: script.to_string(),
            command: command.to_string(),
            capability,
            aggregate,
            schema_arg: flag_value(rest, "--schema"),
            model_arg: flag_value(rest, "--model"),
            out_arg: flag_value(rest, "--out"),
        });
    }
    None
}

fn generator_position(tokens: &[String], generator: &str) -> Option<usize> {
    tokens.iter().position(|token| {
        token == generator
            || token
                .rsplit('/')
                .next()
                .map(|base| base == generator)
                .unwrap_or(false)
    })
}

/// Value of `--flag value` or `--flag=value` within one token stream.
fn flag_value(tokens: &[String], flag: &str) -> Option<String> {
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        if token == flag {
            if let Some(value) = iter.peek() {
                if !value.starts_with('-') {
                    return Some((*value).clone());
                }
            }
        } else if let Some(value) = token.strip_prefix(flag).and_then(|v| v.strip_prefix('=')) {
            return Some(value.to_string());
        }
    }
    None
}

/// Whitespace tokenizer with single/double-quote awareness. Good enough for
/// declared npm scripts; anything it cannot see is simply not extracted.
fn tokenize(segment: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in segment.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
