use serde::Serialize;

use crate::context::{ContextCandidate, EntityContext};
use crate::conventions::{ConventionSource, ImportStyle};
use crate::error::{Error, Result};
use crate::schema::{Discriminator, EntityMetadata};

/// Which bean types a converter should reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BeanReference {
    /// The hand-written wrapper layer.
    Wrapper,
    /// Generated beans directly; used when no wrapper layer exists.
    Generated,
}

/// Disposition of one required document field when writing the DB side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentToDbField {
    pub document_field: String,
    /// DB bean field receiving the value; `None` when the DB side does not
    /// persist it and it is reconstructed from context on the way back.
    pub db_field: Option<String>,
}

/// Where one required document field comes from when rebuilding the document
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum DocumentFieldSource {
    DbField { field: String },
    ContextParameter { parameter: String },
    DiscriminatorValue { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbToDocumentField {
    pub document_field: String,
    #[serde(flatten)]
    pub from: DocumentFieldSource,
}

/// A complete converter description for one entity. Both mapping directions
/// are total over the required document fields; the document-side rebuild
/// accepts exactly the inferred context parameters, in their fixed order.
#[derive(Debug, Clone, Serialize)]
pub struct ConverterContract {
    pub entity: String,
    pub document_to_db: Vec<DocumentToDbField>,
    pub db_to_document: Vec<DbToDocumentField>,
    pub context_parameters: Vec<ContextCandidate>,
    pub discriminator: Discriminator,
    pub import_style: ImportStyle,
    pub bean_reference: BeanReference,
}

/// Plan the converter contract for one entity.
///
/// A required document field that is neither on the DB bean, nor covered by a
/// context parameter, nor the discriminator is a contract violation: the
/// value would have to be invented at conversion time, and converters never
/// invent values. `style_override` pins the bean import style; otherwise the
/// module's observed convention decides.
pub fn plan_converter(
    entity: &EntityMetadata,
    context: &EntityContext,
    db_fields: &[String],
    conventions: &dyn ConventionSource,
    style_override: Option<ImportStyle>,
    wrapper_present: bool,
) -> Result<ConverterContract> {
    let required_fields = entity.required_document_fields();

    let document_to_db = required_fields
        .iter()
        .map(|field| DocumentToDbField {
            document_field: field.clone(),
            db_field: db_field_for(field, db_fields),
        })
        .collect();

    let mut db_to_document = Vec::with_capacity(required_fields.len());
    for field in &required_fields {
        let from = if *field == entity.discriminator.field {
            DocumentFieldSource::DiscriminatorValue {
                value: entity.discriminator.value.clone(),
            }
        } else if let Some(db_field) = db_field_for(field, db_fields) {
            DocumentFieldSource::DbField { field: db_field }
        } else if let Some(parameter) = context_parameter_for(field, context) {
            DocumentFieldSource::ContextParameter { parameter }
        } else {
            return Err(Error::ContractViolation {
                entity: entity.name.clone(),
                rule: "missing-required-context",
                detail: format!(
                    "required document field '{field}' is not on the DB bean and no \
                     context parameter carries it"
                ),
            });
        };
        db_to_document.push(DbToDocumentField {
            document_field: field.clone(),
            from,
        });
    }

    // A key the DB bean already carries never appears as a context parameter.
    let context_parameters: Vec<ContextCandidate> = context
        .ordered_parameters()
        .into_iter()
        .filter(|candidate| db_field_for(&candidate.source_key, db_fields).is_none())
        .cloned()
        .collect();

    Ok(ConverterContract {
        entity: entity.name.clone(),
        document_to_db,
        db_to_document,
        context_parameters,
        discriminator: entity.discriminator.clone(),
        import_style: style_override.unwrap_or_else(|| conventions.import_style()),
        bean_reference: if wrapper_present {
            BeanReference::Wrapper
        } else {
            BeanReference::Generated
        },
    })
}

/// DB bean field matching a document field under any casing convention.
fn db_field_for(document_field: &str, db_fields: &[String]) -> Option<String> {
    let wanted = fold_name(document_field);
    db_fields
        .iter()
        .find(|f| fold_name(f) == wanted)
        .cloned()
}

fn context_parameter_for(field: &str, context: &EntityContext) -> Option<String> {
    context
        .decisions
        .iter()
        .find(|d| d.key.name == field)
        .map(|d| d.chosen_candidate().field_name.clone())
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && *c != '$')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::infer_context;
    use crate::conventions::Precedent;
    use crate::schema::{DocumentKey, FieldSpec, KeyKind};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    struct NoConventions;

    impl ConventionSource for NoConventions {
        fn parameter_precedent(&self, _name: &str) -> Option<&Precedent> {
            None
        }

        fn known_parameters(&self) -> Vec<&str> {
            Vec::new()
        }

        fn observed_import_style(&self) -> Option<ImportStyle> {
            None
        }

        fn existing_converter(&self, _entity: &str) -> Option<&Path> {
            None
        }

        fn existing_procedure(&self, _entity: &str) -> Option<&Path> {
            None
        }
    }

    struct PerEntityConventions;

    impl ConventionSource for PerEntityConventions {
        fn parameter_precedent(&self, _name: &str) -> Option<&Precedent> {
            None
        }

        fn known_parameters(&self) -> Vec<&str> {
            Vec::new()
        }

        fn observed_import_style(&self) -> Option<ImportStyle> {
            Some(ImportStyle::PerEntity)
        }

        fn existing_converter(&self, _entity: &str) -> Option<&Path> {
            None
        }

        fn existing_procedure(&self, _entity: &str) -> Option<&Path> {
            None
        }
    }

    fn entity(name: &str, keys: &[(&str, KeyKind)], extra_required: &[&str]) -> EntityMetadata {
        let mut fields: BTreeMap<String, FieldSpec> = keys
            .iter()
            .map(|(n, _)| {
                (
                    n.to_string(),
                    FieldSpec {
                        ty: "string".to_string(),
                        required: true,
                    },
                )
            })
            .collect();
        for field in extra_required {
            fields.insert(
                field.to_string(),
                FieldSpec {
                    ty: "string".to_string(),
                    required: true,
                },
            );
        }
        fields.insert(
            "entityType".to_string(),
            FieldSpec {
                ty: "string".to_string(),
                required: true,
            },
        );
        EntityMetadata {
            name: name.to_string(),
            required_keys: keys
                .iter()
                .map(|(n, k)| DocumentKey {
                    name: n.to_string(),
                    kind: *k,
                })
                .collect(),
            discriminator: Discriminator {
                field: "entityType".to_string(),
                value: name.to_string(),
            },
            fields,
            source: PathBuf::from("schema/entities.yaml"),
        }
    }

    fn owned(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn contract_for(
        entity_metadata: &EntityMetadata,
        db_fields: &[String],
    ) -> Result<ConverterContract> {
        let context = infer_context(entity_metadata, db_fields, &NoConventions, &[]).unwrap();
        plan_converter(entity_metadata, &context, db_fields, &NoConventions, None, false)
    }

    #[test]
    fn both_mappings_cover_every_required_field() {
        let order = entity(
            "Order",
            &[("orderId", KeyKind::PartitionKey)],
            &["total"],
        );
        let contract = contract_for(&order, &owned(&["order_id", "total"])).unwrap();
        let required = order.required_document_fields();
        assert_eq!(contract.document_to_db.len(), required.len());
        assert_eq!(contract.db_to_document.len(), required.len());
    }

    #[test]
    fn discriminator_is_assigned_from_its_constant() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)], &[]);
        let contract = contract_for(&order, &owned(&["order_id"])).unwrap();
        let disc = contract
            .db_to_document
            .iter()
            .find(|f| f.document_field == "entityType")
            .unwrap();
        assert_eq!(
            disc.from,
            DocumentFieldSource::DiscriminatorValue {
                value: "Order".to_string()
            }
        );
    }

    #[test]
    fn key_missing_from_db_bean_comes_from_context() {
        let sub = entity(
            "EventSubscription",
            &[
                ("userId", KeyKind::PartitionKey),
                ("subscriptionId", KeyKind::SortKey),
            ],
            &[],
        );
        let contract = contract_for(&sub, &owned(&["subscription_id"])).unwrap();
        let user = contract
            .db_to_document
            .iter()
            .find(|f| f.document_field == "userId")
            .unwrap();
        assert_eq!(
            user.from,
            DocumentFieldSource::ContextParameter {
                parameter: "userId".to_string()
            }
        );
        let names: Vec<&str> = contract
            .context_parameters
            .iter()
            .map(|c| c.field_name.as_str())
            .collect();
        assert_eq!(names, ["userId"]);
    }

    #[test]
    fn required_field_with_no_source_is_a_contract_violation() {
        let order = entity(
            "Order",
            &[("orderId", KeyKind::PartitionKey)],
            &["total"],
        );
        let err = contract_for(&order, &owned(&["order_id"])).unwrap_err();
        assert!(matches!(
            err,
            Error::ContractViolation {
                rule: "missing-required-context",
                ..
            }
        ));
    }

    #[test]
    fn context_order_is_partition_then_sort_then_index() {
        let sub = entity(
            "EventSubscription",
            &[
                ("userId", KeyKind::PartitionKey),
                ("subscriptionId", KeyKind::SortKey),
                ("topic", KeyKind::RequiredIndexKey),
            ],
            &[],
        );
        let contract = contract_for(&sub, &[]).unwrap();
        let kinds: Vec<KeyKind> = contract
            .context_parameters
            .iter()
            .map(|c| c.source_key_kind)
            .collect();
        assert_eq!(
            kinds,
            [
                KeyKind::PartitionKey,
                KeyKind::SortKey,
                KeyKind::RequiredIndexKey
            ]
        );
    }

    #[test]
    fn import_style_follows_observed_convention() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)], &[]);
        let context = infer_context(&order, &[], &PerEntityConventions, &[]).unwrap();
        let contract =
            plan_converter(&order, &context, &[], &PerEntityConventions, None, false).unwrap();
        assert_eq!(contract.import_style, ImportStyle::PerEntity);
    }

    #[test]
    fn explicit_style_override_beats_the_observed_convention() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)], &[]);
        let context = infer_context(&order, &[], &PerEntityConventions, &[]).unwrap();
        let contract = plan_converter(
            &order,
            &context,
            &[],
            &PerEntityConventions,
            Some(ImportStyle::AggregateIndex),
            false,
        )
        .unwrap();
        assert_eq!(contract.import_style, ImportStyle::AggregateIndex);
    }

    #[test]
    fn wrapper_presence_switches_the_bean_reference() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)], &[]);
        let context = infer_context(&order, &[], &NoConventions, &[]).unwrap();
        let with_wrapper =
            plan_converter(&order, &context, &[], &NoConventions, None, true).unwrap();
        let without_wrapper =
            plan_converter(&order, &context, &[], &NoConventions, None, false).unwrap();
        assert_eq!(with_wrapper.bean_reference, BeanReference::Wrapper);
        assert_eq!(without_wrapper.bean_reference, BeanReference::Generated);
    }
}
