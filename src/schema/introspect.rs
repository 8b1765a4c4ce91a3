use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::boundary::ModuleRoot;
use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::manifest::{SchemaSource, SourceKind};
use crate::schema::types::{
    Discriminator, DocumentKey, EntityMetadata, Introspection, KeyKind, ModelFile, RawEntity,
    SchemaFile,
};

/// Reads every validated schema and model source, follows their imports, and
/// produces the merged entity metadata plus DB-bean field sets.
///
/// Imports are resolved against the importing file's directory and contained
/// to the module root before being read. A file reachable through several
/// import paths is read once; a true import cycle is reported and the cycle
/// edge skipped. An entity defined in two different files is dropped from the
/// result with a warning naming both files, never merged by guesswork.
pub fn introspect(
    root: &ModuleRoot,
    sources: &[SchemaSource],
    config: &EffectiveConfig,
) -> Result<Introspection> {
    let mut loader = Loader {
        root,
        config,
        visited_schemas: BTreeSet::new(),
        visited_models: BTreeSet::new(),
        stack: Vec::new(),
        entity_origin: BTreeMap::new(),
        model_origin: BTreeMap::new(),
        dropped_entities: BTreeSet::new(),
        out: Introspection::default(),
    };

    for source in sources {
        match source.kind {
            SourceKind::DocumentSchema => {
                if !source.resolved.is_file() {
                    return Err(Error::MissingSchema {
                        capability: source.capability,
                        path: source.resolved.clone(),
                    });
                }
                loader.load_schema(&source.resolved)?;
            }
            SourceKind::DbModel => {
                if !source.resolved.is_file() {
                    return Err(Error::MissingSchema {
                        capability: source.capability,
                        path: source.resolved.clone(),
                    });
                }
                loader.load_model(&source.resolved)?;
            }
            SourceKind::Output => {}
        }
    }

    let dropped = std::mem::take(&mut loader.dropped_entities);
    let mut result = loader.out;
    for name in dropped {
        result.entities.remove(&name);
        result.db_bean_fields.remove(&name);
    }
    Ok(result)
}

struct Loader<'a> {
    root: &'a ModuleRoot,
    config: &'a EffectiveConfig,
    visited_schemas: BTreeSet<PathBuf>,
    visited_models: BTreeSet<PathBuf>,
    stack: Vec<PathBuf>,
    entity_origin: BTreeMap<String, PathBuf>,
    model_origin: BTreeMap<String, PathBuf>,
    dropped_entities: BTreeSet<String>,
    out: Introspection,
}

impl Loader<'_> {
    fn load_schema(&mut self, path: &Path) -> Result<()> {
        if self.stack.iter().any(|p| p == path) {
            self.out
                .warnings
                .push(format!("import cycle detected at {}; edge skipped", path.display()));
            return Ok(());
        }
        if !self.visited_schemas.insert(path.to_path_buf()) {
            return Ok(());
        }

        let file: SchemaFile = read_by_extension(path)?;
        self.out.sources_read.push(path.to_path_buf());

        for (name, raw) in file.entities {
            self.merge_entity(path, name, raw);
        }

        self.stack.push(path.to_path_buf());
        for import in &file.imports {
            if let Some(target) = self.resolve_import(path, import) {
                self.load_schema(&target)?;
            }
        }
        self.stack.pop();
        Ok(())
    }

    fn load_model(&mut self, path: &Path) -> Result<()> {
        if self.stack.iter().any(|p| p == path) {
            self.out
                .warnings
                .push(format!("import cycle detected at {}; edge skipped", path.display()));
            return Ok(());
        }
        if !self.visited_models.insert(path.to_path_buf()) {
            return Ok(());
        }

        let file: ModelFile = read_by_extension(path)?;
        self.out.sources_read.push(path.to_path_buf());

        for (name, raw) in file.models {
            match self.model_origin.get(&name) {
                Some(previous) => {
                    self.out.warnings.push(format!(
                        "db model for entity '{}' defined in both {} and {}; DB-bean fields for it are ignored this run",
                        name,
                        previous.display(),
                        path.display()
                    ));
                    self.out.db_bean_fields.remove(&name);
                }
                None => {
                    self.model_origin.insert(name.clone(), path.to_path_buf());
                    let fields: Vec<String> = raw.fields.keys().cloned().collect();
                    self.out.db_bean_fields.insert(name, fields);
                }
            }
        }

        self.stack.push(path.to_path_buf());
        for import in &file.imports {
            if let Some(target) = self.resolve_import(path, import) {
                self.load_model(&target)?;
            }
        }
        self.stack.pop();
        Ok(())
    }

    fn resolve_import(&mut self, from: &Path, import: &str) -> Option<PathBuf> {
        let base = from.parent().unwrap_or_else(|| Path::new("."));
        let joined = base.join(import);
        match self.root.contain(&joined) {
            Ok(resolved) => {
                if resolved.is_file() {
                    Some(resolved)
                } else {
                    self.out.warnings.push(format!(
                        "import '{}' from {} does not exist; skipped",
                        import,
                        from.display()
                    ));
                    None
                }
            }
            Err(_) => {
                self.out.warnings.push(format!(
                    "import '{}' from {} escapes the module root; skipped",
                    import,
                    from.display()
                ));
                None
            }
        }
    }

    fn merge_entity(&mut self, path: &Path, name: String, raw: RawEntity) {
        if let Some(previous) = self.entity_origin.get(&name) {
            if previous != path {
                self.out.warnings.push(format!(
                    "entity '{}' defined in both {} and {}; excluded from this run",
                    name,
                    previous.display(),
                    path.display()
                ));
                self.dropped_entities.insert(name);
            }
            return;
        }

        let Some(metadata) = self.build_metadata(path, &name, raw) else {
            return;
        };
        self.entity_origin.insert(name.clone(), path.to_path_buf());
        self.out.entities.insert(name, metadata);
    }

    /// Converts a raw schema entry into resolved metadata, or skips the
    /// entity entirely when its key declaration is unusable.
    fn build_metadata(&mut self, path: &Path, name: &str, raw: RawEntity) -> Option<EntityMetadata> {
        if raw.keys.partition.trim().is_empty() {
            self.out.warnings.push(format!(
                "entity '{}' in {} declares an empty partition key; entity skipped",
                name,
                path.display()
            ));
            return None;
        }
        if !is_pascal_case(name) {
            self.out.warnings.push(format!(
                "entity name '{}' is not PascalCase; generated type names may look off",
                name
            ));
        }

        let mut required_keys = vec![DocumentKey {
            name: raw.keys.partition.clone(),
            kind: KeyKind::PartitionKey,
        }];
        if let Some(sort) = raw.keys.sort {
            if sort == raw.keys.partition {
                self.out.warnings.push(format!(
                    "entity '{}': sort key duplicates the partition key '{}'; sort key ignored",
                    name, sort
                ));
            } else {
                required_keys.push(DocumentKey {
                    name: sort,
                    kind: KeyKind::SortKey,
                });
            }
        }
        for index in raw.keys.index {
            if required_keys.iter().any(|k| k.name == index) {
                self.out.warnings.push(format!(
                    "entity '{}': index key '{}' repeats an earlier key; ignored",
                    name, index
                ));
                continue;
            }
            required_keys.push(DocumentKey {
                name: index,
                kind: KeyKind::RequiredIndexKey,
            });
        }

        for key in &required_keys {
            if !raw.fields.contains_key(&key.name) {
                self.out.warnings.push(format!(
                    "entity '{}': {} '{}' has no field declaration in {}",
                    name,
                    key.kind,
                    key.name,
                    path.display()
                ));
            }
        }

        let discriminator = match raw.discriminator {
            Some(decl) => Discriminator {
                field: decl
                    .field
                    .unwrap_or_else(|| self.config.discriminator_field.clone()),
                value: decl.value.unwrap_or_else(|| name.to_string()),
            },
            None => Discriminator {
                field: self.config.discriminator_field.clone(),
                value: name.to_string(),
            },
        };

        Some(EntityMetadata {
            name: name.to_string(),
            required_keys,
            discriminator,
            fields: raw.fields,
            source: path.to_path_buf(),
        })
    }
}

/// YAML for `.yaml`/`.yml`, JSON otherwise.
fn read_by_extension<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::Introspection {
        path: path.to_path_buf(),
        detail: format!("failed to read schema file: {e}"),
    })?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        serde_yaml::from_str(&raw).map_err(|e| Error::Introspection {
            path: path.to_path_buf(),
            detail: format!("invalid YAML: {e}"),
        })
    } else {
        serde_json::from_str(&raw).map_err(|e| Error::Introspection {
            path: path.to_path_buf(),
            detail: format!("invalid JSON: {e}"),
        })
    }
}

fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_config;
    use std::fs;
    use tempfile::TempDir;

    fn module_with(files: &[(&str, &str)]) -> (TempDir, ModuleRoot) {
        let dir = TempDir::new().unwrap();
        for (rel, contents) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
        let root = ModuleRoot::resolve(dir.path()).unwrap();
        (dir, root)
    }

    fn source(root: &ModuleRoot, kind: SourceKind, rel: &str) -> SchemaSource {
        SchemaSource {
            capability: crate::manifest::Capability::DocumentBean,
            kind,
            declared: rel.to_string(),
            resolved: root.path().join(rel),
            exists: true,
        }
    }

    fn default_config(root: &ModuleRoot) -> EffectiveConfig {
        resolve_config(root, None).unwrap()
    }

    #[test]
    fn entity_keys_resolve_in_declaration_order() {
        let (_dir, root) = module_with(&[(
            "schema/entities.yaml",
            r#"
entities:
  Order:
    keys:
      partition: orderId
      sort: createdAt
      index: [customerId, region]
    fields:
      orderId: { type: string, required: true }
      createdAt: { type: string, required: true }
      customerId: { type: string, required: true }
      region: { type: string }
"#,
        )]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/entities.yaml")];
        let result = introspect(&root, &sources, &config).unwrap();

        let order = &result.entities["Order"];
        let names: Vec<&str> = order.required_keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["orderId", "createdAt", "customerId", "region"]);
        assert_eq!(order.required_keys[0].kind, KeyKind::PartitionKey);
        assert_eq!(order.required_keys[1].kind, KeyKind::SortKey);
        assert_eq!(order.required_keys[2].kind, KeyKind::RequiredIndexKey);
    }

    #[test]
    fn discriminator_defaults_to_entity_name() {
        let (_dir, root) = module_with(&[(
            "schema/entities.json",
            r#"{
  "entities": {
    "Invoice": {
      "keys": { "partition": "invoiceId" },
      "fields": { "invoiceId": { "type": "string", "required": true } }
    }
  }
}"#,
        )]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/entities.json")];
        let result = introspect(&root, &sources, &config).unwrap();

        let disc = &result.entities["Invoice"].discriminator;
        assert_eq!(disc.field, "entityType");
        assert_eq!(disc.value, "Invoice");
    }

    #[test]
    fn imports_merge_and_cycles_are_reported() {
        let (_dir, root) = module_with(&[
            (
                "schema/root.yaml",
                "imports: [nested/child.yaml]\nentities:\n  Parent:\n    keys: { partition: id }\n    fields: { id: { type: string, required: true } }\n",
            ),
            (
                "schema/nested/child.yaml",
                "imports: [../root.yaml]\nentities:\n  Child:\n    keys: { partition: id }\n    fields: { id: { type: string, required: true } }\n",
            ),
        ]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/root.yaml")];
        let result = introspect(&root, &sources, &config).unwrap();

        assert!(result.entities.contains_key("Parent"));
        assert!(result.entities.contains_key("Child"));
        assert!(result.warnings.iter().any(|w| w.contains("import cycle")));
    }

    #[test]
    fn duplicate_entity_across_files_is_excluded() {
        let (_dir, root) = module_with(&[
            (
                "schema/a.yaml",
                "imports: [b.yaml]\nentities:\n  Dup:\n    keys: { partition: id }\n    fields: { id: { type: string, required: true } }\n",
            ),
            (
                "schema/b.yaml",
                "entities:\n  Dup:\n    keys: { partition: other }\n    fields: { other: { type: string, required: true } }\n",
            ),
        ]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/a.yaml")];
        let result = introspect(&root, &sources, &config).unwrap();

        assert!(!result.entities.contains_key("Dup"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("'Dup'") && w.contains("excluded")));
    }

    #[test]
    fn escaping_import_is_skipped_with_warning() {
        let (_dir, root) = module_with(&[(
            "schema/root.yaml",
            "imports: ['../../outside.yaml']\nentities: {}\n",
        )]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/root.yaml")];
        let result = introspect(&root, &sources, &config).unwrap();

        assert!(result.entities.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("escapes the module root")));
    }

    #[test]
    fn db_model_fields_are_collected_per_entity() {
        let (_dir, root) = module_with(&[(
            "model/db.yaml",
            "models:\n  Order:\n    fields:\n      order_id: { type: string, required: true }\n      created_at: { type: string }\n",
        )]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DbModel, "model/db.yaml")];
        let result = introspect(&root, &sources, &config).unwrap();

        assert_eq!(
            result.db_fields_for("Order"),
            ["created_at".to_string(), "order_id".to_string()]
        );
        assert!(result.db_fields_for("Missing").is_empty());
    }

    #[test]
    fn malformed_schema_is_an_introspection_error() {
        let (_dir, root) = module_with(&[("schema/bad.yaml", "entities: [not, a, map]\n")]);
        let config = default_config(&root);
        let sources = [source(&root, SourceKind::DocumentSchema, "schema/bad.yaml")];
        let err = introspect(&root, &sources, &config).unwrap_err();
        assert!(matches!(err, Error::Introspection { .. }));
    }

    #[test]
    fn pascal_case_check() {
        assert!(is_pascal_case("OrderLine"));
        assert!(!is_pascal_case("orderLine"));
        assert!(!is_pascal_case("Order_Line"));
        assert!(!is_pascal_case(""));
    }
}
