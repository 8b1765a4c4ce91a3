//! Context inference.
//!
//! A context field is a value a converter needs to rebuild the document
//! representation that the DB bean does not carry, typically a key. For each
//! required document key absent from the DB bean, the engine enumerates every
//! plausible parameter name (the schema-declared name plus any alias already
//! used by existing converters), ranks them, picks one, and surfaces the full
//! candidate list with the choice. It never picks silently and never invents
//! a tie-break beyond precedent recency: two equally recent conflicting
//! precedents in different files are a contract violation for that entity.

use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;

use crate::conventions::ConventionSource;
use crate::error::{Error, Result};
use crate::schema::{DocumentKey, EntityMetadata, KeyKind};

/// One plausible parameter name for a context slot.
#[derive(Debug, Clone, Serialize)]
pub struct ContextCandidate {
    pub field_name: String,
    /// Schema key this candidate would carry.
    pub source_key: String,
    pub source_key_kind: KeyKind,
    /// Lower ranks ahead; encodes key-kind priority, declaration order, and
    /// naming rank within the slot.
    pub rank_score: u32,
    pub rationale: String,
}

/// The resolved decision for one context slot: every candidate enumerated,
/// plus the index of the one selected.
#[derive(Debug, Clone, Serialize)]
pub struct ContextDecision {
    pub key: DocumentKey,
    pub candidates: Vec<ContextCandidate>,
    pub chosen: usize,
}

impl ContextDecision {
    pub fn chosen_candidate(&self) -> &ContextCandidate {
        &self.candidates[self.chosen]
    }
}

/// All context decisions for a single entity, in converter parameter order:
/// partition key first, then sort key, then required index keys as declared.
#[derive(Debug, Clone, Serialize)]
pub struct EntityContext {
    pub entity: String,
    pub decisions: Vec<ContextDecision>,
    pub notes: Vec<String>,
}

impl EntityContext {
    /// The selected parameter per slot, in fixed order.
    pub fn ordered_parameters(&self) -> Vec<&ContextCandidate> {
        self.decisions.iter().map(ContextDecision::chosen_candidate).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Caller-requested parameter name for one context key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextOverride {
    /// Schema key the override applies to, matched casing-insensitively.
    pub key: String,
    /// Parameter name to use for it.
    pub name: String,
}

impl ContextOverride {
    /// Parse `key=name`, e.g. `tenantId=tenant_ref`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, name) = raw.split_once('=')?;
        let (key, name) = (key.trim(), name.trim());
        if key.is_empty() || name.is_empty() {
            return None;
        }
        Some(ContextOverride {
            key: key.to_string(),
            name: name.to_string(),
        })
    }
}

/// Derive the ordered context parameter list for one entity.
///
/// `db_fields` are the entity's DB-bean field names; a key the bean already
/// carries (under any casing convention) needs no context. `overrides` pin a
/// key to an explicit parameter name and win outright over precedent.
pub fn infer_context(
    entity: &EntityMetadata,
    db_fields: &[String],
    conventions: &dyn ConventionSource,
    overrides: &[ContextOverride],
) -> Result<EntityContext> {
    let db_normalized: Vec<String> = db_fields.iter().map(|f| normalize(f)).collect();
    let mut notes = Vec::new();
    let mut decisions = Vec::new();
    let mut matched_overrides = vec![false; overrides.len()];

    for (declaration_index, key) in entity.required_keys.iter().enumerate() {
        if db_normalized.contains(&normalize(&key.name)) {
            notes.push(format!(
                "key '{}' is carried by the DB bean; no context parameter needed",
                key.name
            ));
            continue;
        }
        let override_name = overrides.iter().enumerate().find_map(|(i, o)| {
            if normalize(&o.key) == normalize(&key.name) {
                matched_overrides[i] = true;
                Some(o.name.as_str())
            } else {
                None
            }
        });
        let decision = decide_slot(
            &entity.name,
            key,
            declaration_index,
            conventions,
            override_name,
            &mut notes,
        )?;
        decisions.push(decision);
    }

    for (i, matched) in matched_overrides.iter().enumerate() {
        if !matched {
            notes.push(format!(
                "context override '{}={}' matched no inferred key for entity '{}'; ignored",
                overrides[i].key, overrides[i].name, entity.name
            ));
        }
    }

    Ok(EntityContext {
        entity: entity.name.clone(),
        decisions,
        notes,
    })
}

struct NameOption {
    name: String,
    precedent: Option<(std::path::PathBuf, SystemTime, usize)>,
    rationale: String,
}

/// Enumerate naming candidates for one key and pick one. Pure over its
/// inputs: the same schema, precedent set, and override always produce the
/// same candidate list and chosen index.
fn decide_slot(
    entity: &str,
    key: &DocumentKey,
    declaration_index: usize,
    conventions: &dyn ConventionSource,
    override_name: Option<&str>,
    notes: &mut Vec<String>,
) -> Result<ContextDecision> {
    let mut options = vec![NameOption {
        name: key.name.clone(),
        precedent: conventions
            .parameter_precedent(&key.name)
            .map(|p| (p.path.clone(), p.modified, p.position)),
        rationale: format!("declared in the schema as the {}", key.kind),
    }];
    for alias in conventions.known_parameters() {
        if alias != key.name && normalize(alias) == normalize(&key.name) {
            if let Some(p) = conventions.parameter_precedent(alias) {
                options.push(NameOption {
                    name: alias.to_string(),
                    precedent: Some((p.path.clone(), p.modified, p.position)),
                    rationale: format!("already used by {}", p.path.display()),
                });
            }
        }
    }
    if let Some(name) = override_name {
        if !options.iter().any(|o| o.name == name) {
            options.push(NameOption {
                name: name.to_string(),
                precedent: None,
                rationale: "explicitly requested".to_string(),
            });
        }
    }

    let chosen = match override_name {
        Some(name) => {
            let index = options
                .iter()
                .position(|o| o.name == name)
                .unwrap_or_default();
            notes.push(format!(
                "key '{}': parameter name '{}' set by explicit override",
                key.name, name
            ));
            index
        }
        None => pick_by_precedent(entity, key, &options, notes)?,
    };

    let scores = slot_scores(&options, chosen, key.kind, declaration_index);
    let candidates: Vec<ContextCandidate> = options
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(index, (option, rank_score))| ContextCandidate {
            field_name: option.name,
            source_key: key.name.clone(),
            source_key_kind: key.kind,
            rank_score,
            rationale: if override_name.is_some() && index == chosen {
                "explicitly requested".to_string()
            } else {
                option.rationale
            },
        })
        .collect();

    debug!(
        entity,
        key = %key.name,
        parameter = %candidates[chosen].field_name,
        options = candidates.len(),
        "context parameter resolved"
    );

    Ok(ContextDecision {
        key: key.clone(),
        candidates,
        chosen,
    })
}

/// Precedent beats the bare schema name; among precedents the most recently
/// modified file wins, and within one file the earliest declaration wins.
fn pick_by_precedent(
    entity: &str,
    key: &DocumentKey,
    options: &[NameOption],
    notes: &mut Vec<String>,
) -> Result<usize> {
    let best = options
        .iter()
        .enumerate()
        .filter_map(|(i, o)| o.precedent.as_ref().map(|p| (i, p)))
        .max_by(|(_, a), (_, b)| a.1.cmp(&b.1).then_with(|| b.2.cmp(&a.2)));

    let Some((best_index, best)) = best else {
        return Ok(0);
    };

    for (i, option) in options.iter().enumerate() {
        if i == best_index {
            continue;
        }
        let Some((path, time, _)) = &option.precedent else {
            continue;
        };
        if *time == best.1 && *path != best.0 {
            return Err(Error::ContractViolation {
                entity: entity.to_string(),
                rule: "context-naming-precedent",
                detail: format!(
                    "names '{}' and '{}' for key '{}' carry equally recent precedent in {} and {}; \
                     rename one or pass an explicit context override",
                    options[best_index].name,
                    option.name,
                    key.name,
                    best.0.display(),
                    path.display()
                ),
            });
        }
    }

    if best_index != 0 {
        notes.push(format!(
            "key '{}': using established parameter name '{}' from {}",
            key.name,
            options[best_index].name,
            best.0.display()
        ));
    }
    Ok(best_index)
}

/// Scores in option enumeration order. The chosen option gets naming rank 0;
/// the rest follow by precedent recency, then name.
fn slot_scores(
    options: &[NameOption],
    chosen: usize,
    kind: KeyKind,
    declaration_index: usize,
) -> Vec<u32> {
    let base = u32::from(kind.priority()) * 1000 + (declaration_index as u32) * 10;
    let mut order: Vec<usize> = (0..options.len()).collect();
    order.sort_by(|&a, &b| {
        if a == chosen {
            return std::cmp::Ordering::Less;
        }
        if b == chosen {
            return std::cmp::Ordering::Greater;
        }
        let pa = options[a].precedent.as_ref().map(|p| p.1);
        let pb = options[b].precedent.as_ref().map(|p| p.1);
        pb.cmp(&pa).then_with(|| options[a].name.cmp(&options[b].name))
    });
    let mut scores = vec![0u32; options.len()];
    for (naming_rank, &index) in order.iter().enumerate() {
        scores[index] = base + naming_rank as u32;
    }
    scores
}

/// Casing-insensitive name identity: `userId`, `user_id`, and `USER-ID` all
/// refer to the same underlying key.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && *c != '$')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions::{ImportStyle, Precedent};
    use crate::schema::{Discriminator, FieldSpec};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    struct StubConventions {
        parameters: BTreeMap<String, Precedent>,
    }

    impl StubConventions {
        fn empty() -> Self {
            StubConventions {
                parameters: BTreeMap::new(),
            }
        }

        fn with(entries: &[(&str, &str, u64, usize)]) -> Self {
            let parameters = entries
                .iter()
                .map(|(name, path, secs, position)| {
                    (
                        name.to_string(),
                        Precedent {
                            path: PathBuf::from(path),
                            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(*secs),
                            position: *position,
                        },
                    )
                })
                .collect();
            StubConventions { parameters }
        }
    }

    impl ConventionSource for StubConventions {
        fn parameter_precedent(&self, name: &str) -> Option<&Precedent> {
            self.parameters.get(name)
        }

        fn known_parameters(&self) -> Vec<&str> {
            self.parameters.keys().map(String::as_str).collect()
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

    fn entity(name: &str, keys: &[(&str, KeyKind)]) -> EntityMetadata {
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
            fields: keys
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
                .collect(),
            source: PathBuf::from("schema/entities.yaml"),
        }
    }

    fn owned(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn key_already_on_db_bean_needs_no_context() {
        let account = entity("Account", &[("accountId", KeyKind::PartitionKey)]);
        let result = infer_context(
            &account,
            &owned(&["accountId"]),
            &StubConventions::empty(),
            &[],
        )
        .unwrap();
        assert!(result.is_empty());
        assert!(result.notes.iter().any(|n| n.contains("carried by the DB bean")));
    }

    #[test]
    fn missing_keys_come_out_in_partition_then_sort_order() {
        let sub = entity(
            "EventSubscription",
            &[
                ("userId", KeyKind::PartitionKey),
                ("subscriptionId", KeyKind::SortKey),
            ],
        );
        let result = infer_context(&sub, &[], &StubConventions::empty(), &[]).unwrap();
        let params: Vec<&str> = result
            .ordered_parameters()
            .iter()
            .map(|c| c.field_name.as_str())
            .collect();
        assert_eq!(params, ["userId", "subscriptionId"]);
        assert_eq!(
            result.decisions[0].chosen_candidate().source_key_kind,
            KeyKind::PartitionKey
        );
        assert_eq!(
            result.decisions[1].chosen_candidate().source_key_kind,
            KeyKind::SortKey
        );
    }

    #[test]
    fn db_field_casing_differences_still_satisfy_a_key() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let result = infer_context(
            &order,
            &owned(&["order_id"]),
            &StubConventions::empty(),
            &[],
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn precedent_alias_wins_over_schema_name() {
        let order = entity("Order", &[("tenantId", KeyKind::PartitionKey)]);
        let conventions =
            StubConventions::with(&[("tenant_id", "src/converters/a.ts", 100, 5)]);
        let result = infer_context(&order, &[], &conventions, &[]).unwrap();

        let decision = &result.decisions[0];
        assert_eq!(decision.candidates.len(), 2);
        assert_eq!(decision.chosen_candidate().field_name, "tenant_id");
        assert_ne!(decision.chosen, 0);
        assert!(result.notes.iter().any(|n| n.contains("tenant_id")));
    }

    #[test]
    fn newer_precedent_beats_older() {
        let order = entity("Order", &[("tenantId", KeyKind::PartitionKey)]);
        let conventions = StubConventions::with(&[
            ("tenant_id", "src/converters/old.ts", 100, 5),
            ("tenantID", "src/converters/new.ts", 200, 5),
        ]);
        let result = infer_context(&order, &[], &conventions, &[]).unwrap();
        assert_eq!(
            result.decisions[0].chosen_candidate().field_name,
            "tenantID"
        );
    }

    #[test]
    fn equally_recent_conflicting_precedent_is_a_contract_violation() {
        let order = entity("Order", &[("tenantId", KeyKind::PartitionKey)]);
        let conventions = StubConventions::with(&[
            ("tenant_id", "src/converters/a.ts", 100, 5),
            ("tenantID", "src/converters/b.ts", 100, 9),
        ]);
        let err = infer_context(&order, &[], &conventions, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::ContractViolation {
                rule: "context-naming-precedent",
                ..
            }
        ));
    }

    #[test]
    fn exact_name_precedent_keeps_schema_name() {
        let order = entity("Order", &[("tenantId", KeyKind::PartitionKey)]);
        let conventions =
            StubConventions::with(&[("tenantId", "src/converters/a.ts", 100, 5)]);
        let result = infer_context(&order, &[], &conventions, &[]).unwrap();
        let decision = &result.decisions[0];
        assert_eq!(decision.chosen, 0);
        assert_eq!(decision.chosen_candidate().field_name, "tenantId");
    }

    #[test]
    fn override_wins_over_precedent() {
        let order = entity("Order", &[("tenantId", KeyKind::PartitionKey)]);
        let conventions =
            StubConventions::with(&[("tenant_id", "src/converters/a.ts", 100, 5)]);
        let overrides = [ContextOverride {
            key: "tenantId".to_string(),
            name: "tenant_ref".to_string(),
        }];
        let result = infer_context(&order, &[], &conventions, &overrides).unwrap();
        let decision = &result.decisions[0];
        assert_eq!(decision.chosen_candidate().field_name, "tenant_ref");
        assert!(result
            .notes
            .iter()
            .any(|n| n.contains("explicit override")));
    }

    #[test]
    fn unmatched_override_is_noted_and_ignored() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let overrides = [ContextOverride {
            key: "somethingElse".to_string(),
            name: "whatever".to_string(),
        }];
        let result =
            infer_context(&order, &[], &StubConventions::empty(), &overrides).unwrap();
        assert_eq!(
            result.decisions[0].chosen_candidate().field_name,
            "orderId"
        );
        assert!(result
            .notes
            .iter()
            .any(|n| n.contains("matched no inferred key")));
    }

    #[test]
    fn override_parse_accepts_key_equals_name() {
        let parsed = ContextOverride::parse("tenantId=tenant_ref").unwrap();
        assert_eq!(parsed.key, "tenantId");
        assert_eq!(parsed.name, "tenant_ref");
        assert!(ContextOverride::parse("tenantId").is_none());
        assert!(ContextOverride::parse("=x").is_none());
    }

    #[test]
    fn rerun_yields_identical_decisions() {
        let sub = entity(
            "EventSubscription",
            &[
                ("userId", KeyKind::PartitionKey),
                ("subscriptionId", KeyKind::SortKey),
                ("topic", KeyKind::RequiredIndexKey),
            ],
        );
        let conventions =
            StubConventions::with(&[("user_id", "src/converters/a.ts", 100, 5)]);
        let first = infer_context(&sub, &[], &conventions, &[]).unwrap();
        let second = infer_context(&sub, &[], &conventions, &[]).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn rank_scores_order_partition_before_sort_before_index() {
        let sub = entity(
            "EventSubscription",
            &[
                ("userId", KeyKind::PartitionKey),
                ("subscriptionId", KeyKind::SortKey),
                ("topic", KeyKind::RequiredIndexKey),
            ],
        );
        let result = infer_context(&sub, &[], &StubConventions::empty(), &[]).unwrap();
        let scores: Vec<u32> = result
            .ordered_parameters()
            .iter()
            .map(|c| c.rank_score)
            .collect();
        assert!(scores[0] < scores[1] && scores[1] < scores[2]);
    }
}
