use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Kind of a required document key, in ranking priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    PartitionKey,
    SortKey,
    RequiredIndexKey,
}

impl KeyKind {
    /// Lower ranks ahead: partition before sort before index.
    pub fn priority(&self) -> u8 {
        match self {
            KeyKind::PartitionKey => 0,
            KeyKind::SortKey => 1,
            KeyKind::RequiredIndexKey => 2,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::PartitionKey => f.write_str("partition key"),
            KeyKind::SortKey => f.write_str("sort key"),
            KeyKind::RequiredIndexKey => f.write_str("required index key"),
        }
    }
}

/// One required document key, in schema declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentKey {
    pub name: String,
    pub kind: KeyKind,
}

/// Declared type and requiredness of a single field. No further business
/// semantics are inferred from field specs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default = "default_field_type")]
    pub ty: String,
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "string".to_string()
}

/// Resolved discriminator assignment for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discriminator {
    pub field: String,
    pub value: String,
}

/// Per-entity metadata extracted from the document schema. Read-only once
/// built; rebuilt fresh on every planning run.
#[derive(Debug, Clone, Serialize)]
pub struct EntityMetadata {
    pub name: String,
    /// Ordered: partition key, then sort key, then required index keys in
    /// declaration order.
    pub required_keys: Vec<DocumentKey>,
    pub discriminator: Discriminator,
    pub fields: BTreeMap<String, FieldSpec>,
    /// Schema file this entity was declared in.
    pub source: PathBuf,
}

impl EntityMetadata {
    /// Whether the document schema declares `field` at all.
    pub fn declares_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Required document fields in deterministic order: keys first (in key
    /// order), then the remaining required fields alphabetically.
    pub fn required_document_fields(&self) -> Vec<String> {
        let mut ordered: Vec<String> = self.required_keys.iter().map(|k| k.name.clone()).collect();
        for (name, spec) in &self.fields {
            if spec.required && !ordered.iter().any(|k| k == name) {
                ordered.push(name.clone());
            }
        }
        ordered
    }
}

/// Everything one introspection pass produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Introspection {
    pub entities: BTreeMap<String, EntityMetadata>,
    /// DB-bean field names per entity, from the db model source.
    pub db_bean_fields: BTreeMap<String, Vec<String>>,
    /// Schema/model files actually read, including imports.
    pub sources_read: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl Introspection {
    /// DB-bean fields for an entity; entities absent from the model have no
    /// DB-side fields yet.
    pub fn db_fields_for(&self, entity: &str) -> &[String] {
        self.db_bean_fields
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Raw on-disk shapes. These mirror the schema file format exactly and are
// converted to the resolved types above during introspection.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct SchemaFile {
    #[serde(default)]
    pub entities: BTreeMap<String, RawEntity>,
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEntity {
    pub keys: RawKeys,
    #[serde(default)]
    pub discriminator: Option<RawDiscriminator>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawKeys {
    pub partition: String,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub index: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDiscriminator {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelFile {
    #[serde(default)]
    pub models: BTreeMap<String, RawModel>,
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawModel {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}
