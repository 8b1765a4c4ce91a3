//! Schema introspection.
//!
//! Document schemas declare the entities of a module: their required document
//! keys (partition, optional sort, required index keys), a discriminator, and
//! field specs. DB model files declare which fields each entity's DB bean
//! carries. Both are plain YAML or JSON read from inside the module root,
//! selected by file extension.
//!
//! Introspection is a read-only pass. It never writes, never executes module
//! scripts, and never invents an entity shape when a file is missing or
//! malformed; what it cannot read it reports.

pub mod introspect;
pub mod types;

pub use introspect::introspect;
pub use types::{
    Discriminator, DocumentKey, EntityMetadata, FieldSpec, Introspection, KeyKind,
};
