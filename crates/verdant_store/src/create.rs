//! The cascading create pipeline.
//!
//! Creating a record may transitively create its ancestors: the request
//! resolves one chain of descriptors per parent link, validation prunes
//! every chain member the options already identify (together with
//! everything rootward of it), and the surviving members run a fixed
//! stage list root-to-leaf inside a single gated transaction.

use std::collections::HashMap;

use sea_orm::sea_query::{Alias, InsertStatement, Query, Value as SeaValue};
use serde_json::{Map as JsonMap, Value as JsonValue};

use verdant_core::{
    CreatedRecords, EntityDescriptor, Record, Timestamp, Value, VerdantError, VerdantResult,
};

use crate::store::{exec, exec_returning_id, is_foreign_key_violation, VerdantStore};
use crate::txn::OpenTransaction;

/// One chain entry under consideration during validation. The nullable
/// flag mirrors the foreign-key column on the entry's child: a nullable
/// link means the whole chain behind it is optional.
#[derive(Clone, Copy)]
struct SegmentEntry {
    descriptor: &'static EntityDescriptor,
    link_nullable: bool,
}

enum Validation {
    Continue,
    SkipWithAncestors,
}

/// A value bound into a pending insert. Parent ids produced earlier in
/// the same request are placeholders until the execute stage binds them.
#[derive(Clone, Debug)]
enum Binding {
    Literal(Value),
    ParentId(&'static str),
}

struct PendingInsert {
    table: &'static str,
    columns: Vec<&'static str>,
    bindings: Vec<Binding>,
}

impl PendingInsert {
    fn bind(&self, resolved_ids: &HashMap<&'static str, i64>) -> InsertStatement {
        let values = self.bindings.iter().map(|binding| match binding {
            Binding::Literal(value) => SeaValue::from(value.clone()).into(),
            Binding::ParentId(attr) => match resolved_ids.get(attr) {
                Some(id) => SeaValue::BigInt(Some(*id)).into(),
                None => SeaValue::BigInt(None).into(),
            },
        });
        Query::insert()
            .into_table(Alias::new(self.table))
            .columns(self.columns.iter().map(|column| Alias::new(*column)))
            .values_panic(values)
            .to_owned()
    }
}

/// Private per-member scratch space. Never visible to other members.
#[derive(Default)]
struct MemberScope {
    fields: Vec<(&'static str, Binding)>,
    relation_ids: Vec<i64>,
    fk_suspects: Vec<&'static str>,
    pending: Option<PendingInsert>,
    inserted_id: Option<i64>,
}

struct ChainMember {
    descriptor: &'static EntityDescriptor,
    scope: MemberScope,
}

impl ChainMember {
    fn new(descriptor: &'static EntityDescriptor) -> Self {
        Self {
            descriptor,
            scope: MemberScope::default(),
        }
    }
}

/// Shared per-request state: input options, ids resolved so far, the
/// single request timestamp and the result under construction.
struct CreateContext {
    options: JsonMap<String, JsonValue>,
    resolved_ids: HashMap<&'static str, i64>,
    created_at: Timestamp,
    result: CreatedRecords,
}

pub(crate) async fn run_create(
    store: &VerdantStore,
    descriptor: &'static EntityDescriptor,
    options: JsonValue,
) -> VerdantResult<CreatedRecords> {
    let options = parse_options(options)?;
    let plan = plan_members(descriptor, &options)?;
    log::debug!(
        "create {}: executing chain {:?}",
        descriptor.name,
        plan.iter().map(|d| d.name).collect::<Vec<_>>()
    );
    let mut members: Vec<ChainMember> = plan.into_iter().map(ChainMember::new).collect();
    let mut ctx = CreateContext {
        options,
        resolved_ids: HashMap::new(),
        created_at: Timestamp::now(),
        result: CreatedRecords::default(),
    };

    // configuration-init
    for member in &mut members {
        configuration_init(member, &ctx)?;
    }
    // set-fields
    for member in &mut members {
        set_fields(member, &ctx)?;
    }
    // set-timestamps
    for member in &mut members {
        set_timestamps(member, &ctx);
    }
    // compile
    for member in &mut members {
        compile_statement(member);
    }
    // begin-transaction: once per request, not per member
    let txn = store.gate().begin(store.connection()).await?;
    // execute
    for member in &mut members {
        if let Err(err) = execute_member(member, &mut ctx, &txn).await {
            if let Err(rollback_err) = txn.rollback().await {
                log::warn!("rollback after failed insert also failed: {rollback_err}");
            }
            return Err(err);
        }
    }
    // end-transaction
    txn.commit().await?;
    // build-result
    for member in &members {
        let record = assemble_record(member, &ctx)?;
        let id = member.scope.inserted_id.expect("executed member has an id");
        ctx.result.merge(member.descriptor.plural_key, id, record);
    }
    Ok(ctx.result)
}

fn parse_options(options: JsonValue) -> VerdantResult<JsonMap<String, JsonValue>> {
    match options {
        JsonValue::Object(map) => Ok(map),
        _ => Err(VerdantError::invalid(
            "create options must be a flat object of attribute values",
        )),
    }
}

/// Resolves and prunes the chains, returning the surviving members in
/// execution order: each chain root-to-leaf, then the requested record.
fn plan_members(
    descriptor: &'static EntityDescriptor,
    options: &JsonMap<String, JsonValue>,
) -> VerdantResult<Vec<&'static EntityDescriptor>> {
    let segments = build_segments(descriptor);
    validate_requested(descriptor, &segments, options)?;
    let mut plan = Vec::new();
    for segment in segments {
        let kept = prune_segment(&segment, options)?;
        for entry in kept.iter().rev() {
            plan.push(entry.descriptor);
        }
    }
    plan.push(descriptor);
    Ok(plan)
}

/// One segment per parent link, each ordered leaf-most first.
fn build_segments(descriptor: &'static EntityDescriptor) -> Vec<Vec<SegmentEntry>> {
    descriptor
        .parents
        .iter()
        .map(|link| {
            let mut segment = Vec::new();
            let mut current = Some((link.descriptor, link.nullable));
            while let Some((member, nullable)) = current {
                segment.push(SegmentEntry {
                    descriptor: member,
                    link_nullable: nullable,
                });
                current = member
                    .parents
                    .first()
                    .map(|parent| (parent.descriptor, parent.nullable));
            }
            segment
        })
        .collect()
}

/// Validates leaf-to-root, dropping the first skipping member and
/// everything rootward of it. Members past the skip are not examined.
fn prune_segment(
    segment: &[SegmentEntry],
    options: &JsonMap<String, JsonValue>,
) -> VerdantResult<Vec<SegmentEntry>> {
    let mut kept = Vec::new();
    for entry in segment {
        match validate_member(entry, options)? {
            Validation::SkipWithAncestors => break,
            Validation::Continue => kept.push(*entry),
        }
    }
    Ok(kept)
}

fn validate_member(
    entry: &SegmentEntry,
    options: &JsonMap<String, JsonValue>,
) -> VerdantResult<Validation> {
    let descriptor = entry.descriptor;
    if let Some(raw) = options.get(descriptor.id_attribute) {
        if raw.as_i64().is_none_or(|id| id <= 0) {
            return Err(VerdantError::invalid(format!(
                "{} must be a positive integer id",
                descriptor.id_attribute
            )));
        }
        return Ok(Validation::SkipWithAncestors);
    }
    if entry.link_nullable
        && !descriptor
            .attributes
            .iter()
            .any(|attr| options.contains_key(*attr))
    {
        return Ok(Validation::SkipWithAncestors);
    }
    check_member_values(descriptor, options)?;
    Ok(Validation::Continue)
}

/// The requested record is never skipped: check its values and reject
/// option keys no chain member knows, before anything is written.
fn validate_requested(
    descriptor: &'static EntityDescriptor,
    segments: &[Vec<SegmentEntry>],
    options: &JsonMap<String, JsonValue>,
) -> VerdantResult<()> {
    let members: Vec<&'static EntityDescriptor> = std::iter::once(descriptor)
        .chain(
            segments
                .iter()
                .flatten()
                .map(|entry| entry.descriptor),
        )
        .collect();
    for key in options.keys() {
        if key == descriptor.id_attribute {
            return Err(VerdantError::invalid(format!(
                "{key} is assigned by the store and cannot be set"
            )));
        }
        if members
            .iter()
            .any(|m| key == m.created_at_attribute || key == m.modified_at_attribute)
        {
            return Err(VerdantError::invalid(format!(
                "{key} is assigned by the store and cannot be set"
            )));
        }
        let known = members.iter().any(|m| {
            m.has_attribute(key) || (*m != descriptor && key == m.id_attribute)
        });
        if !known {
            return Err(VerdantError::unknown_attribute(key.as_str()));
        }
    }
    check_member_values(descriptor, options)
}

fn check_member_values(
    descriptor: &EntityDescriptor,
    options: &JsonMap<String, JsonValue>,
) -> VerdantResult<()> {
    for attr in descriptor.attributes {
        let Some(raw) = options.get(*attr) else {
            continue;
        };
        if descriptor.is_relation_attribute(attr) {
            let JsonValue::Array(items) = raw else {
                return Err(VerdantError::invalid(format!(
                    "{attr} expects a list of record ids"
                )));
            };
            if items.iter().any(|item| item.as_i64().is_none()) {
                return Err(VerdantError::invalid(format!(
                    "{attr} expects a list of record ids"
                )));
            }
            continue;
        }
        let value = Value::from_json(raw)
            .map_err(|_| VerdantError::invalid(format!("attribute {attr} must be a scalar")))?;
        if let Some(allowed) = descriptor.enum_values(attr) {
            if !value.is_null() {
                let legal = value.as_text().is_some_and(|text| allowed.contains(&text));
                if !legal {
                    return Err(VerdantError::invalid(format!(
                        "attribute {attr} must be one of {allowed:?}"
                    )));
                }
            }
        }
    }
    for attr in descriptor.required {
        let present = options.get(*attr).is_some_and(|value| !value.is_null());
        if !present {
            return Err(VerdantError::invalid(format!(
                "creating a {} requires {attr}",
                descriptor.name
            )));
        }
    }
    Ok(())
}

fn configuration_init(member: &mut ChainMember, ctx: &CreateContext) -> VerdantResult<()> {
    if let Some(relation) = member.descriptor.relation {
        if let Some(JsonValue::Array(items)) = ctx.options.get(relation.attribute) {
            member.scope.relation_ids = items
                .iter()
                .map(|item| {
                    item.as_i64().ok_or_else(|| {
                        VerdantError::invalid(format!(
                            "{} expects a list of record ids",
                            relation.attribute
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
        }
    }
    Ok(())
}

/// Context-provided value, then caller option, then descriptor default,
/// then null. Shared by set-fields and build-result.
fn resolve_attribute_value(
    attr: &str,
    resolved_ids: &HashMap<&'static str, i64>,
    options: &JsonMap<String, JsonValue>,
    descriptor: &EntityDescriptor,
) -> VerdantResult<Value> {
    if let Some(id) = resolved_ids.get(attr) {
        return Ok(Value::Int(*id));
    }
    if let Some(raw) = options.get(attr) {
        return Value::from_json(raw);
    }
    if let Some(default) = descriptor.default_for(attr) {
        return Ok(default);
    }
    Ok(Value::Null)
}

fn set_fields(member: &mut ChainMember, ctx: &CreateContext) -> VerdantResult<()> {
    let descriptor = member.descriptor;
    for attr in descriptor.insert_attributes() {
        let value = resolve_attribute_value(attr, &ctx.resolved_ids, &ctx.options, descriptor)?;
        member.scope.fields.push((attr, Binding::Literal(value)));
    }
    for reference in descriptor.references {
        if ctx
            .options
            .get(*reference)
            .is_some_and(|value| !value.is_null())
        {
            member.scope.fk_suspects.push(reference);
        }
    }
    for link in descriptor.parents {
        let id_attr = link.descriptor.id_attribute;
        match ctx.options.get(id_attr) {
            Some(raw) => {
                let id = raw.as_i64().ok_or_else(|| {
                    VerdantError::invalid(format!("{id_attr} must be a positive integer id"))
                })?;
                member
                    .scope
                    .fields
                    .push((id_attr, Binding::Literal(Value::Int(id))));
                member.scope.fk_suspects.push(id_attr);
            }
            None => {
                // Bound at execute, from the parent created moments
                // earlier in this same request (or null if its chain
                // was pruned away entirely).
                member
                    .scope
                    .fields
                    .push((id_attr, Binding::ParentId(id_attr)));
            }
        }
    }
    Ok(())
}

fn set_timestamps(member: &mut ChainMember, ctx: &CreateContext) {
    let stamp = Binding::Literal(Value::Int(ctx.created_at.as_i64()));
    member
        .scope
        .fields
        .push((member.descriptor.created_at_attribute, stamp.clone()));
    member
        .scope
        .fields
        .push((member.descriptor.modified_at_attribute, stamp));
}

fn compile_statement(member: &mut ChainMember) {
    let fields = std::mem::take(&mut member.scope.fields);
    let (columns, bindings): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
    member.scope.pending = Some(PendingInsert {
        table: member.descriptor.table,
        columns,
        bindings,
    });
}

async fn execute_member(
    member: &mut ChainMember,
    ctx: &mut CreateContext,
    txn: &OpenTransaction,
) -> VerdantResult<()> {
    let pending = member
        .scope
        .pending
        .take()
        .expect("statement compiled before execute");
    let statement = pending.bind(&ctx.resolved_ids);
    let id = exec_returning_id(txn.connection(), &statement)
        .await
        .map_err(|err| translate_foreign_key(err, &member.scope.fk_suspects))?;
    member.scope.inserted_id = Some(id);
    ctx.resolved_ids.insert(member.descriptor.id_attribute, id);
    if let Some(relation) = member.descriptor.relation {
        for other_id in &member.scope.relation_ids {
            let insert = Query::insert()
                .into_table(Alias::new(relation.table))
                .columns([
                    Alias::new(relation.own_column),
                    Alias::new(relation.other_column),
                ])
                .values_panic([id.into(), (*other_id).into()])
                .to_owned();
            exec(txn.connection(), &insert).await.map_err(|err| {
                if is_foreign_key_violation(&err) {
                    VerdantError::reference(relation.attribute)
                } else {
                    err
                }
            })?;
        }
    }
    Ok(())
}

fn translate_foreign_key(err: VerdantError, suspects: &[&'static str]) -> VerdantError {
    if is_foreign_key_violation(&err) {
        if let Some(attribute) = suspects.first() {
            return VerdantError::reference(*attribute);
        }
    }
    err
}

fn assemble_record(member: &ChainMember, ctx: &CreateContext) -> VerdantResult<Record> {
    let descriptor = member.descriptor;
    let id = member.scope.inserted_id.expect("executed member has an id");
    let mut record = Record::new();
    record.insert(descriptor.id_attribute.to_string(), JsonValue::from(id));
    for attr in descriptor.attributes {
        if descriptor.is_relation_attribute(attr) {
            let ids: Vec<JsonValue> = member
                .scope
                .relation_ids
                .iter()
                .map(|value| JsonValue::from(*value))
                .collect();
            record.insert(attr.to_string(), JsonValue::Array(ids));
            continue;
        }
        let value = resolve_attribute_value(attr, &ctx.resolved_ids, &ctx.options, descriptor)?;
        record.insert(attr.to_string(), value.to_json());
    }
    for link in descriptor.parents {
        let id_attr = link.descriptor.id_attribute;
        let value = resolve_attribute_value(id_attr, &ctx.resolved_ids, &ctx.options, descriptor)?;
        record.insert(id_attr.to_string(), value.to_json());
    }
    if let Some(child_ids) = descriptor.child_ids {
        let value = match ctx.resolved_ids.get(child_ids.child_id_attribute) {
            Some(child) => JsonValue::Array(vec![JsonValue::from(*child)]),
            None => JsonValue::Array(Vec::new()),
        };
        record.insert(child_ids.attribute.to_string(), value);
    }
    let stamp = JsonValue::from(ctx.created_at.as_i64());
    record.insert(descriptor.created_at_attribute.to_string(), stamp.clone());
    record.insert(descriptor.modified_at_attribute.to_string(), stamp);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use verdant_core::descriptor::{GENERATION, MEDIUM, PLANT};

    use super::*;

    fn options(value: JsonValue) -> JsonMap<String, JsonValue> {
        parse_options(value).expect("object")
    }

    fn plan_names(
        descriptor: &'static EntityDescriptor,
        opts: &JsonMap<String, JsonValue>,
    ) -> Vec<&'static str> {
        plan_members(descriptor, opts)
            .expect("plan")
            .iter()
            .map(|d| d.name)
            .collect()
    }

    #[test]
    fn options_must_be_an_object() {
        assert!(parse_options(json!([1, 2])).is_err());
        assert!(parse_options(json!("familyName")).is_err());
        assert!(parse_options(json!({"familyName": "Haze"})).is_ok());
    }

    #[test]
    fn plant_resolves_both_chains() {
        let segments = build_segments(&PLANT);
        assert_eq!(segments.len(), 2);
        let names: Vec<_> = segments[0].iter().map(|e| e.descriptor.name).collect();
        assert_eq!(names, vec!["genotype", "generation", "family"]);
        let names: Vec<_> = segments[1].iter().map(|e| e.descriptor.name).collect();
        assert_eq!(names, vec!["medium", "environment"]);
    }

    #[test]
    fn full_cascade_plan_orders_root_to_leaf() {
        let opts = options(json!({
            "familyName": "Haze",
            "generationName": "F1",
            "plantName": "haze-1"
        }));
        assert_eq!(
            plan_names(&PLANT, &opts),
            vec!["family", "generation", "genotype", "plant"]
        );
    }

    #[test]
    fn supplied_ancestor_id_prunes_the_suffix() {
        // Skip at generation keeps exactly the members leaf-ward of it.
        let opts = options(json!({"generationId": 2, "plantName": "haze-1"}));
        assert_eq!(plan_names(&PLANT, &opts), vec!["genotype", "plant"]);

        let opts = options(json!({"genotypeId": 4, "plantName": "haze-1"}));
        assert_eq!(plan_names(&PLANT, &opts), vec!["plant"]);
    }

    #[test]
    fn optional_chain_without_attributes_is_pruned() {
        let opts = options(json!({
            "familyName": "Haze",
            "generationName": "F1",
            "plantName": "haze-1"
        }));
        assert!(!plan_names(&PLANT, &opts).contains(&"medium"));

        let opts = options(json!({
            "familyName": "Haze",
            "generationName": "F1",
            "plantName": "haze-1",
            "mediumName": "soil"
        }));
        assert_eq!(
            plan_names(&PLANT, &opts),
            vec!["family", "generation", "genotype", "medium", "plant"]
        );
    }

    #[test]
    fn environment_joins_only_behind_its_medium() {
        let opts = options(json!({
            "generationId": 1,
            "plantName": "haze-1",
            "mediumName": "soil",
            "environmentName": "tent"
        }));
        assert_eq!(
            plan_names(&PLANT, &opts),
            vec!["genotype", "environment", "medium", "plant"]
        );
    }

    #[test]
    fn missing_required_attribute_is_an_input_error() {
        let opts = options(json!({"familyName": "Haze", "plantName": "haze-1"}));
        let err = plan_members(&PLANT, &opts).unwrap_err();
        assert!(matches!(err, VerdantError::Validation { .. }));
        assert!(err.to_string().contains("generationName"));
    }

    #[test]
    fn illegal_enum_value_is_an_input_error() {
        let opts = options(json!({
            "generationId": 1,
            "plantName": "haze-1",
            "plantSex": "robot"
        }));
        assert!(plan_members(&PLANT, &opts).is_err());
    }

    #[test]
    fn server_assigned_attributes_cannot_be_set() {
        let opts = options(json!({"plantId": 7, "plantName": "haze-1"}));
        assert!(plan_members(&PLANT, &opts).is_err());
        let opts = options(json!({"plantCreatedAt": 1, "plantName": "haze-1"}));
        assert!(plan_members(&PLANT, &opts).is_err());
    }

    #[test]
    fn unknown_option_key_is_rejected() {
        let opts = options(json!({"generationId": 1, "plantName": "x", "plantColor": "green"}));
        let err = plan_members(&PLANT, &opts).unwrap_err();
        assert!(matches!(err, VerdantError::UnknownAttribute { .. }));
    }

    #[test]
    fn non_positive_ancestor_id_is_rejected() {
        let opts = options(json!({"generationId": 0, "plantName": "x"}));
        assert!(plan_members(&PLANT, &opts).is_err());
        let opts = options(json!({"generationId": "two", "plantName": "x"}));
        assert!(plan_members(&PLANT, &opts).is_err());
    }

    #[test]
    fn relation_attribute_requires_id_list() {
        let opts = options(json!({"familyId": 1, "generationName": "F1", "generationParents": "x"}));
        assert!(plan_members(&GENERATION, &opts).is_err());
        let opts =
            options(json!({"familyId": 1, "generationName": "F1", "generationParents": [1, 2]}));
        assert_eq!(plan_names(&GENERATION, &opts), vec!["generation"]);
    }

    #[test]
    fn resolution_priority_is_context_options_default_null() {
        let mut resolved = HashMap::new();
        resolved.insert("mediumId", 9_i64);
        let opts = options(json!({"mediumId": 4, "mediumName": "soil"}));

        let value = resolve_attribute_value("mediumId", &resolved, &opts, &MEDIUM).unwrap();
        assert_eq!(value, Value::Int(9));

        let value = resolve_attribute_value("mediumName", &resolved, &opts, &MEDIUM).unwrap();
        assert_eq!(value, Value::Text("soil".to_string()));

        let value = resolve_attribute_value("mediumDescription", &resolved, &opts, &MEDIUM).unwrap();
        assert_eq!(value, Value::Text(String::new()));

        let value = resolve_attribute_value("environmentId", &resolved, &opts, &MEDIUM).unwrap();
        assert_eq!(value, Value::Null);
    }
}
