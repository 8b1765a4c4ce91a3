use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};
use crate::schema::EntityMetadata;

/// Basic operation a procedure method performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodIntent {
    Get,
    Post,
    Update,
    Delete,
    List,
}

impl MethodIntent {
    fn verb(&self) -> &'static str {
        match self {
            MethodIntent::Get => "get",
            MethodIntent::Post => "create",
            MethodIntent::Update => "update",
            MethodIntent::Delete => "delete",
            MethodIntent::List => "list",
        }
    }
}

impl fmt::Display for MethodIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodIntent::Get => "get",
            MethodIntent::Post => "post",
            MethodIntent::Update => "update",
            MethodIntent::Delete => "delete",
            MethodIntent::List => "list",
        };
        f.write_str(s)
    }
}

/// One requested method, with its mutation markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodRequest {
    pub intent: MethodIntent,
    pub multi_item: bool,
    pub cross_entity: bool,
}

impl MethodRequest {
    /// Parse `intent[:multi|:cross]`, e.g. `post:multi`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(':');
        let intent = match parts.next().map(str::trim) {
            Some("get") => MethodIntent::Get,
            Some("post") => MethodIntent::Post,
            Some("update") => MethodIntent::Update,
            Some("delete") => MethodIntent::Delete,
            Some("list") => MethodIntent::List,
            _ => {
                return Err(Error::InvalidIntent {
                    value: raw.to_string(),
                })
            }
        };
        let mut request = MethodRequest {
            intent,
            multi_item: false,
            cross_entity: false,
        };
        for marker in parts {
            match marker.trim() {
                "multi" => request.multi_item = true,
                "cross" => request.cross_entity = true,
                _ => {
                    return Err(Error::InvalidIntent {
                        value: raw.to_string(),
                    })
                }
            }
        }
        Ok(request)
    }

    fn plain(intent: MethodIntent) -> Self {
        MethodRequest {
            intent,
            multi_item: false,
            cross_entity: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    QueryOrList,
    SingleItemCrud,
    MultiItemMutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvariantScope {
    SingleItem,
    CrossItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DaoKind {
    EntityDao,
    TableDao,
    TransactionDao,
}

impl fmt::Display for DaoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoKind::EntityDao => f.write_str("EntityDao"),
            DaoKind::TableDao => f.write_str("TableDao"),
            DaoKind::TransactionDao => f.write_str("TransactionDao"),
        }
    }
}

/// Which DAO a method goes through and why. `TransactionDao` appears exactly
/// when atomicity is required or the invariant spans items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaoChoiceDecision {
    pub operation_type: OperationType,
    pub atomicity_required: bool,
    pub invariant_scope: InvariantScope,
    pub chosen_dao: DaoKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampOwner {
    Dao,
    Procedure,
}

impl fmt::Display for TimestampOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampOwner::Dao => f.write_str("dao-managed"),
            TimestampOwner::Procedure => f.write_str("procedure-managed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdGenerationPolicy {
    Always,
    Never,
    Conditional,
}

impl fmt::Display for IdGenerationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdGenerationPolicy::Always => f.write_str("always"),
            IdGenerationPolicy::Never => f.write_str("never"),
            IdGenerationPolicy::Conditional => f.write_str("conditional"),
        }
    }
}

/// Which DAO layer procedure methods should call into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DaoReference {
    Wrapper,
    Generated,
}

/// One planned procedure method. Parameters and return types are expressed
/// purely in database-representation terms; document values never cross a
/// procedure signature.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureMethod {
    pub intent: MethodIntent,
    pub name: String,
    pub dao_choice: DaoChoiceDecision,
    pub parameters: Vec<String>,
    pub returns: String,
}

/// The complete procedure description for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureContract {
    pub entity: String,
    pub methods: Vec<ProcedureMethod>,
    pub timestamp_owner: TimestampOwner,
    pub timestamp_overridden: bool,
    pub id_generation: IdGenerationPolicy,
    pub dao_reference: DaoReference,
    pub notes: Vec<String>,
}

/// Plan the procedure contract for one entity.
///
/// An empty request list plans the default method set. Timestamp ownership
/// stays with the DAO unless explicitly overridden, and an override is always
/// surfaced. ID generation defaults to conditional (generate only if absent).
pub fn plan_procedure(
    entity: &EntityMetadata,
    db_fields: &[String],
    requests: &[MethodRequest],
    timestamp_override: Option<TimestampOwner>,
    id_override: Option<IdGenerationPolicy>,
    wrapper_present: bool,
) -> Result<ProcedureContract> {
    let mut notes = Vec::new();

    let requests: Vec<MethodRequest> = if requests.is_empty() {
        notes.push("no method intents requested; planning the default set".to_string());
        [
            MethodIntent::Get,
            MethodIntent::Post,
            MethodIntent::Update,
            MethodIntent::Delete,
            MethodIntent::List,
        ]
        .into_iter()
        .map(MethodRequest::plain)
        .collect()
    } else {
        let mut deduped: Vec<MethodRequest> = Vec::new();
        for request in requests {
            if deduped.iter().any(|r| r.intent == request.intent) {
                notes.push(format!(
                    "method intent '{}' requested more than once; the first request wins",
                    request.intent
                ));
                continue;
            }
            deduped.push(*request);
        }
        deduped
    };

    let methods = requests
        .iter()
        .map(|request| build_method(entity, db_fields, *request))
        .collect();

    let timestamp_owner = timestamp_override.unwrap_or(TimestampOwner::Dao);
    let timestamp_overridden = timestamp_override.is_some();
    if timestamp_owner == TimestampOwner::Procedure {
        notes.push(
            "timestamp ownership moved to the procedure layer at explicit request".to_string(),
        );
    }

    let id_generation = id_override.unwrap_or(IdGenerationPolicy::Conditional);
    if let Some(policy) = id_override {
        notes.push(format!("id generation policy explicitly set to {policy}"));
    }

    Ok(ProcedureContract {
        entity: entity.name.clone(),
        methods,
        timestamp_owner,
        timestamp_overridden,
        id_generation,
        dao_reference: if wrapper_present {
            DaoReference::Wrapper
        } else {
            DaoReference::Generated
        },
        notes,
    })
}

fn build_method(
    entity: &EntityMetadata,
    db_fields: &[String],
    request: MethodRequest,
) -> ProcedureMethod {
    let dao_choice = decide_dao(request);
    let record = format!("{}Record", entity.name);
    let record_param = format!("{}Record", lower_camel(&entity.name));

    let key_params: Vec<String> = entity
        .required_keys
        .iter()
        .map(|key| db_term(&key.name, db_fields))
        .collect();

    let (parameters, returns) = match request.intent {
        MethodIntent::Get => (key_params, record.clone()),
        MethodIntent::Delete => (key_params, "void".to_string()),
        MethodIntent::List => {
            let partition = entity
                .required_keys
                .first()
                .map(|key| db_term(&key.name, db_fields))
                .into_iter()
                .collect();
            (partition, format!("{record}[]"))
        }
        MethodIntent::Post | MethodIntent::Update => {
            if request.multi_item {
                (vec![format!("{record_param}s")], format!("{record}[]"))
            } else {
                (vec![record_param], record.clone())
            }
        }
    };

    let name = if request.multi_item || request.intent == MethodIntent::List {
        format!("{}{}s", request.intent.verb(), entity.name)
    } else {
        format!("{}{}", request.intent.verb(), entity.name)
    };

    ProcedureMethod {
        intent: request.intent,
        name,
        dao_choice,
        parameters,
        returns,
    }
}

/// Multi-item or cross-entity markers force a transactional mutation; plain
/// reads go through the table DAO and plain single-item writes through the
/// entity DAO.
fn decide_dao(request: MethodRequest) -> DaoChoiceDecision {
    if request.multi_item || request.cross_entity {
        return DaoChoiceDecision {
            operation_type: OperationType::MultiItemMutation,
            atomicity_required: true,
            invariant_scope: if request.cross_entity {
                InvariantScope::CrossItem
            } else {
                InvariantScope::SingleItem
            },
            chosen_dao: DaoKind::TransactionDao,
        };
    }
    match request.intent {
        MethodIntent::Get | MethodIntent::List => DaoChoiceDecision {
            operation_type: OperationType::QueryOrList,
            atomicity_required: false,
            invariant_scope: InvariantScope::SingleItem,
            chosen_dao: DaoKind::TableDao,
        },
        MethodIntent::Post | MethodIntent::Update | MethodIntent::Delete => DaoChoiceDecision {
            operation_type: OperationType::SingleItemCrud,
            atomicity_required: false,
            invariant_scope: InvariantScope::SingleItem,
            chosen_dao: DaoKind::EntityDao,
        },
    }
}

/// DB-side name for a document key: the matching DB bean field when one
/// exists, the key name itself otherwise.
fn db_term(key_name: &str, db_fields: &[String]) -> String {
    let wanted = fold_name(key_name);
    db_fields
        .iter()
        .find(|f| fold_name(f) == wanted)
        .cloned()
        .unwrap_or_else(|| key_name.to_string())
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && *c != '$')
        .flat_map(char::to_lowercase)
        .collect()
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Discriminator, DocumentKey, FieldSpec, KeyKind};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

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
                .collect::<BTreeMap<_, _>>(),
            source: PathBuf::from("schema/entities.yaml"),
        }
    }

    fn request(raw: &str) -> MethodRequest {
        MethodRequest::parse(raw).unwrap()
    }

    #[test]
    fn parse_accepts_markers() {
        assert_eq!(
            request("post:multi"),
            MethodRequest {
                intent: MethodIntent::Post,
                multi_item: true,
                cross_entity: false
            }
        );
        assert_eq!(
            request("update:cross"),
            MethodRequest {
                intent: MethodIntent::Update,
                multi_item: false,
                cross_entity: true
            }
        );
        assert!(MethodRequest::parse("put").is_err());
        assert!(MethodRequest::parse("get:soon").is_err());
    }

    #[test]
    fn reads_go_through_the_table_dao() {
        let choice = decide_dao(request("get"));
        assert_eq!(choice.operation_type, OperationType::QueryOrList);
        assert_eq!(choice.chosen_dao, DaoKind::TableDao);
        assert!(!choice.atomicity_required);
    }

    #[test]
    fn single_item_writes_go_through_the_entity_dao() {
        let choice = decide_dao(request("post"));
        assert_eq!(choice.operation_type, OperationType::SingleItemCrud);
        assert_eq!(choice.chosen_dao, DaoKind::EntityDao);
    }

    #[test]
    fn multi_item_marker_forces_a_transaction() {
        let choice = decide_dao(request("post:multi"));
        assert_eq!(choice.operation_type, OperationType::MultiItemMutation);
        assert!(choice.atomicity_required);
        assert_eq!(choice.chosen_dao, DaoKind::TransactionDao);
        assert_eq!(choice.invariant_scope, InvariantScope::SingleItem);
    }

    #[test]
    fn cross_entity_marker_widens_the_invariant_scope() {
        let choice = decide_dao(request("update:cross"));
        assert_eq!(choice.invariant_scope, InvariantScope::CrossItem);
        assert_eq!(choice.chosen_dao, DaoKind::TransactionDao);
    }

    #[test]
    fn transaction_dao_appears_only_under_atomicity_or_cross_item() {
        for raw in ["get", "post", "update", "delete", "list"] {
            let choice = decide_dao(request(raw));
            assert_ne!(choice.chosen_dao, DaoKind::TransactionDao);
        }
    }

    #[test]
    fn parameters_use_db_side_names() {
        let order = entity(
            "Order",
            &[
                ("orderId", KeyKind::PartitionKey),
                ("createdAt", KeyKind::SortKey),
            ],
        );
        let db_fields = vec!["order_id".to_string(), "created_at".to_string()];
        let contract = plan_procedure(
            &order,
            &db_fields,
            &[request("get")],
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(contract.methods[0].parameters, ["order_id", "created_at"]);
        assert_eq!(contract.methods[0].returns, "OrderRecord");
    }

    #[test]
    fn list_takes_the_partition_key_only() {
        let order = entity(
            "Order",
            &[
                ("orderId", KeyKind::PartitionKey),
                ("createdAt", KeyKind::SortKey),
            ],
        );
        let contract =
            plan_procedure(&order, &[], &[request("list")], None, None, false).unwrap();
        assert_eq!(contract.methods[0].parameters, ["orderId"]);
        assert_eq!(contract.methods[0].returns, "OrderRecord[]");
        assert_eq!(contract.methods[0].name, "listOrders");
    }

    #[test]
    fn timestamps_default_to_dao_ownership() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let contract =
            plan_procedure(&order, &[], &[request("post")], None, None, false).unwrap();
        assert_eq!(contract.timestamp_owner, TimestampOwner::Dao);
        assert!(!contract.timestamp_overridden);
    }

    #[test]
    fn procedure_managed_timestamps_are_surfaced() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let contract = plan_procedure(
            &order,
            &[],
            &[request("post")],
            Some(TimestampOwner::Procedure),
            None,
            false,
        )
        .unwrap();
        assert_eq!(contract.timestamp_owner, TimestampOwner::Procedure);
        assert!(contract.timestamp_overridden);
        assert!(contract
            .notes
            .iter()
            .any(|n| n.contains("procedure layer")));
    }

    #[test]
    fn id_generation_defaults_to_conditional() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let contract =
            plan_procedure(&order, &[], &[request("post")], None, None, false).unwrap();
        assert_eq!(contract.id_generation, IdGenerationPolicy::Conditional);

        let overridden = plan_procedure(
            &order,
            &[],
            &[request("post")],
            None,
            Some(IdGenerationPolicy::Always),
            false,
        )
        .unwrap();
        assert_eq!(overridden.id_generation, IdGenerationPolicy::Always);
    }

    #[test]
    fn empty_request_list_plans_the_default_set() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let contract = plan_procedure(&order, &[], &[], None, None, false).unwrap();
        let intents: Vec<MethodIntent> =
            contract.methods.iter().map(|m| m.intent).collect();
        assert_eq!(
            intents,
            [
                MethodIntent::Get,
                MethodIntent::Post,
                MethodIntent::Update,
                MethodIntent::Delete,
                MethodIntent::List
            ]
        );
    }

    #[test]
    fn duplicate_intents_keep_the_first_request() {
        let order = entity("Order", &[("orderId", KeyKind::PartitionKey)]);
        let contract = plan_procedure(
            &order,
            &[],
            &[request("post:multi"), request("post")],
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(contract.methods.len(), 1);
        assert!(contract.methods[0].dao_choice.atomicity_required);
        assert!(contract.notes.iter().any(|n| n.contains("more than once")));
    }
}
