//! Compiles a nested criteria filter specification into a boolean
//! expression tree, rendered through sea_query into a parameterized
//! WHERE clause.
//!
//! Objects combine their entries with AND, arrays with OR. `$and`/`$or`
//! merge children into the current expression left-associatively;
//! `$and()`/`$or()` build an explicitly grouped sub-expression. An
//! attribute not in the record type's searchable set is an error, never
//! silently dropped.

use sea_orm::sea_query::{Alias, Condition, Expr, ExprTrait, Func, Query, SimpleExpr};
use serde_json::Value as JsonValue;

use verdant_core::{EntityDescriptor, RelationDescriptor, Value, VerdantError, VerdantResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Like,
    Nlike,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl CompareOp {
    fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "$eq" => Some(Self::Eq),
            "$neq" => Some(Self::Neq),
            "$like" => Some(Self::Like),
            "$nlike" => Some(Self::Nlike),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            "$in" => Some(Self::In),
            "$nin" => Some(Self::Nin),
            _ => None,
        }
    }
}

/// The compiled filter: a tagged tree of comparisons and combinators.
/// Immutable once built; rendering walks it without changing it.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
    Comparison {
        table: &'static str,
        attribute: String,
        op: CompareOp,
        args: Vec<Value>,
    },
    /// Exact-set membership against a join table: the owning row's id
    /// must appear in a sub-query grouping the join table by owner and
    /// requiring both an IN match and a count equal to the list length.
    ExactRelation {
        relation: &'static RelationDescriptor,
        owner_table: &'static str,
        owner_id_attribute: &'static str,
        ids: Vec<i64>,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

#[derive(Clone, Copy, Debug)]
enum Combinator {
    And,
    Or,
}

pub fn compile_filter(
    descriptor: &'static EntityDescriptor,
    spec: &JsonValue,
) -> VerdantResult<FilterExpr> {
    match spec {
        JsonValue::Object(map) => {
            let mut acc = None;
            for (key, value) in map {
                entry(descriptor, key, value, Combinator::And, &mut acc)?;
            }
            Ok(acc.unwrap_or(FilterExpr::And(Vec::new())))
        }
        JsonValue::Array(items) => {
            let mut acc = None;
            for item in items {
                let child = compile_filter(descriptor, item)?;
                attach(&mut acc, child, Combinator::Or);
            }
            Ok(acc.unwrap_or(FilterExpr::Or(Vec::new())))
        }
        _ => Err(VerdantError::invalid("filter must be an object or an array")),
    }
}

fn entry(
    descriptor: &'static EntityDescriptor,
    key: &str,
    value: &JsonValue,
    combinator: Combinator,
    acc: &mut Option<FilterExpr>,
) -> VerdantResult<()> {
    match key {
        "$and" => merge_children(descriptor, key, value, Combinator::And, acc),
        "$or" => merge_children(descriptor, key, value, Combinator::Or, acc),
        "$and()" => {
            let sub = group(descriptor, value, Combinator::And)?;
            attach(acc, sub, Combinator::And);
            Ok(())
        }
        "$or()" => {
            let sub = group(descriptor, value, Combinator::Or)?;
            attach(acc, sub, Combinator::Or);
            Ok(())
        }
        _ => attribute_entry(descriptor, key, value, combinator, acc),
    }
}

/// `$and`/`$or`: children join the surrounding expression one by one.
fn merge_children(
    descriptor: &'static EntityDescriptor,
    marker: &str,
    value: &JsonValue,
    combinator: Combinator,
    acc: &mut Option<FilterExpr>,
) -> VerdantResult<()> {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                entry(descriptor, key, child, combinator, acc)?;
            }
            Ok(())
        }
        JsonValue::Array(items) => {
            for item in items {
                let child = compile_filter(descriptor, item)?;
                attach(acc, child, combinator);
            }
            Ok(())
        }
        _ => Err(VerdantError::invalid(format!(
            "{marker} expects an object or an array"
        ))),
    }
}

/// `$and()`/`$or()`: children form their own sub-expression.
fn group(
    descriptor: &'static EntityDescriptor,
    value: &JsonValue,
    combinator: Combinator,
) -> VerdantResult<FilterExpr> {
    let mut acc = None;
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                entry(descriptor, key, child, combinator, &mut acc)?;
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                let child = compile_filter(descriptor, item)?;
                attach(&mut acc, child, combinator);
            }
        }
        _ => {
            return Err(VerdantError::invalid(
                "grouped combinator expects an object or an array",
            ));
        }
    }
    let children = match acc {
        None => Vec::new(),
        Some(FilterExpr::And(v)) if matches!(combinator, Combinator::And) => v,
        Some(FilterExpr::Or(v)) if matches!(combinator, Combinator::Or) => v,
        Some(other) => vec![other],
    };
    Ok(match combinator {
        Combinator::And => FilterExpr::And(children),
        Combinator::Or => FilterExpr::Or(children),
    })
}

fn attribute_entry(
    descriptor: &'static EntityDescriptor,
    key: &str,
    value: &JsonValue,
    combinator: Combinator,
    acc: &mut Option<FilterExpr>,
) -> VerdantResult<()> {
    if descriptor.is_relation_attribute(key) {
        let relation = descriptor
            .relation
            .expect("relation attribute implies relation descriptor");
        let ids = relation_ids(key, value)?;
        attach(
            acc,
            FilterExpr::ExactRelation {
                relation,
                owner_table: descriptor.table,
                owner_id_attribute: descriptor.id_attribute,
                ids,
            },
            combinator,
        );
        return Ok(());
    }
    if !descriptor.searchable(key) {
        return Err(VerdantError::unknown_attribute(key));
    }
    match value {
        JsonValue::Object(ops) => {
            if ops.is_empty() {
                return Err(VerdantError::invalid(format!(
                    "empty operator map for attribute {key}"
                )));
            }
            for (marker, arg) in ops {
                let op = CompareOp::from_marker(marker).ok_or_else(|| {
                    VerdantError::invalid(format!(
                        "unrecognized operator {marker} for attribute {key}"
                    ))
                })?;
                let args = operator_args(op, key, arg)?;
                attach(acc, comparison(descriptor, key, op, args), combinator);
            }
            Ok(())
        }
        JsonValue::Array(items) => {
            let args = scalar_args(key, items)?;
            attach(
                acc,
                comparison(descriptor, key, CompareOp::In, args),
                combinator,
            );
            Ok(())
        }
        scalar => {
            let arg = Value::from_json(scalar)?;
            attach(
                acc,
                comparison(descriptor, key, CompareOp::Eq, vec![arg]),
                combinator,
            );
            Ok(())
        }
    }
}

fn comparison(
    descriptor: &'static EntityDescriptor,
    attribute: &str,
    op: CompareOp,
    args: Vec<Value>,
) -> FilterExpr {
    FilterExpr::Comparison {
        table: descriptor.table,
        attribute: attribute.to_string(),
        op,
        args,
    }
}

fn operator_args(op: CompareOp, key: &str, arg: &JsonValue) -> VerdantResult<Vec<Value>> {
    match op {
        CompareOp::In | CompareOp::Nin => match arg {
            JsonValue::Array(items) => scalar_args(key, items),
            _ => Err(VerdantError::invalid(format!(
                "$in/$nin expect a list for attribute {key}"
            ))),
        },
        CompareOp::Like | CompareOp::Nlike => {
            let value = Value::from_json(arg)?;
            if value.as_text().is_none() {
                return Err(VerdantError::invalid(format!(
                    "$like/$nlike expect a string for attribute {key}"
                )));
            }
            Ok(vec![value])
        }
        _ => Ok(vec![Value::from_json(arg)?]),
    }
}

fn scalar_args(key: &str, items: &[JsonValue]) -> VerdantResult<Vec<Value>> {
    if items.is_empty() {
        return Err(VerdantError::invalid(format!(
            "empty list for attribute {key}"
        )));
    }
    items.iter().map(Value::from_json).collect::<Result<_, _>>().map_err(|_| {
        VerdantError::invalid(format!("list for attribute {key} must hold scalars"))
    })
}

fn relation_ids(key: &str, value: &JsonValue) -> VerdantResult<Vec<i64>> {
    let raw: Vec<i64> = match value {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_i64().ok_or_else(|| {
                    VerdantError::invalid(format!("{key} expects a list of record ids"))
                })
            })
            .collect::<Result<_, _>>()?,
        JsonValue::Number(n) => vec![n.as_i64().ok_or_else(|| {
            VerdantError::invalid(format!("{key} expects a list of record ids"))
        })?],
        _ => {
            return Err(VerdantError::invalid(format!(
                "{key} expects a list of record ids"
            )));
        }
    };
    let mut ids = raw;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn attach(acc: &mut Option<FilterExpr>, expr: FilterExpr, combinator: Combinator) {
    *acc = Some(match acc.take() {
        None => expr,
        Some(prev) => match combinator {
            Combinator::And => match prev {
                FilterExpr::And(mut children) => {
                    children.push(expr);
                    FilterExpr::And(children)
                }
                other => FilterExpr::And(vec![other, expr]),
            },
            Combinator::Or => match prev {
                FilterExpr::Or(mut children) => {
                    children.push(expr);
                    FilterExpr::Or(children)
                }
                other => FilterExpr::Or(vec![other, expr]),
            },
        },
    });
}

impl FilterExpr {
    pub fn to_condition(&self) -> Condition {
        match self {
            FilterExpr::And(children) => children
                .iter()
                .fold(Condition::all(), |cond, child| cond.add(child.to_condition())),
            FilterExpr::Or(children) => children
                .iter()
                .fold(Condition::any(), |cond, child| cond.add(child.to_condition())),
            leaf => Condition::all().add(leaf.to_expr()),
        }
    }

    fn to_expr(&self) -> SimpleExpr {
        match self {
            FilterExpr::Comparison {
                table,
                attribute,
                op,
                args,
            } => {
                let col = Expr::col((Alias::new(*table), Alias::new(attribute.as_str())));
                let arg = || -> sea_orm::sea_query::Value { args[0].clone().into() };
                match op {
                    CompareOp::Eq if Value::is_null(&args[0]) => col.is_null(),
                    CompareOp::Neq if Value::is_null(&args[0]) => col.is_not_null(),
                    CompareOp::Eq => col.eq(arg()),
                    CompareOp::Neq => col.ne(arg()),
                    CompareOp::Gt => col.gt(arg()),
                    CompareOp::Gte => col.gte(arg()),
                    CompareOp::Lt => col.lt(arg()),
                    CompareOp::Lte => col.lte(arg()),
                    CompareOp::Like => col.like(args[0].as_text().unwrap_or_default()),
                    CompareOp::Nlike => col.not_like(args[0].as_text().unwrap_or_default()),
                    CompareOp::In => col.is_in(
                        args.iter()
                            .map(|value| sea_orm::sea_query::Value::from(value.clone())),
                    ),
                    CompareOp::Nin => col.is_not_in(
                        args.iter()
                            .map(|value| sea_orm::sea_query::Value::from(value.clone())),
                    ),
                }
            }
            FilterExpr::ExactRelation {
                relation,
                owner_table,
                owner_id_attribute,
                ids,
            } => {
                // Owners holding every listed member: rows matching the
                // list, grouped by owner, counted against the list length.
                let contains_all = Query::select()
                    .column(Alias::new(relation.own_column))
                    .from(Alias::new(relation.table))
                    .and_where(
                        Expr::col(Alias::new(relation.other_column)).is_in(ids.iter().copied()),
                    )
                    .group_by_col(Alias::new(relation.own_column))
                    .and_having(
                        Expr::expr(Func::count(Expr::col(Alias::new(relation.other_column))))
                            .eq(ids.len() as i64),
                    )
                    .to_owned();
                // Owners with exactly that many members overall; the
                // conjunction rules out supersets.
                let exact_size = Query::select()
                    .column(Alias::new(relation.own_column))
                    .from(Alias::new(relation.table))
                    .group_by_col(Alias::new(relation.own_column))
                    .and_having(
                        Expr::expr(Func::count(Expr::col(Alias::new(relation.other_column))))
                            .eq(ids.len() as i64),
                    )
                    .to_owned();
                let owner = (Alias::new(*owner_table), Alias::new(*owner_id_attribute));
                Expr::col(owner.clone())
                    .in_subquery(contains_all)
                    .and(Expr::col(owner).in_subquery(exact_size))
            }
            FilterExpr::And(_) | FilterExpr::Or(_) => {
                unreachable!("combinators render through to_condition")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{QueryStatementWriter, SqliteQueryBuilder};
    use serde_json::json;

    use verdant_core::descriptor::{GENERATION, PLANT};

    use super::*;

    fn render(expr: &FilterExpr) -> String {
        Query::select()
            .column(Alias::new("x"))
            .from(Alias::new("t"))
            .cond_where(expr.to_condition())
            .to_string(SqliteQueryBuilder)
    }

    #[test]
    fn equality_shorthand() {
        let expr = compile_filter(&GENERATION, &json!({"generationName": "F1"})).unwrap();
        let sql = render(&expr);
        assert!(
            sql.contains(r#""generations"."generationName" = 'F1'"#),
            "unexpected sql: {sql}"
        );
    }

    #[test]
    fn object_entries_combine_with_and() {
        let expr =
            compile_filter(&GENERATION, &json!({"generationName": "F1", "familyId": 3})).unwrap();
        assert!(matches!(&expr, FilterExpr::And(children) if children.len() == 2));
        let sql = render(&expr);
        assert!(sql.contains(" AND "), "unexpected sql: {sql}");
    }

    #[test]
    fn array_entries_combine_with_or() {
        let expr = compile_filter(
            &GENERATION,
            &json!([{"generationName": "F1"}, {"generationName": "F2"}]),
        )
        .unwrap();
        assert!(matches!(&expr, FilterExpr::Or(children) if children.len() == 2));
    }

    #[test]
    fn grouped_combinators_preserve_sub_expressions() {
        let expr = compile_filter(
            &GENERATION,
            &json!({"$and()": {"generationName": "F1"}, "$or()": {"generationName": "F2"}}),
        )
        .unwrap();
        let FilterExpr::Or(children) = &expr else {
            panic!("expected OR at the top, got {expr:?}");
        };
        assert!(matches!(&children[0], FilterExpr::And(inner) if inner.len() == 1));
        assert!(matches!(&children[1], FilterExpr::Or(inner) if inner.len() == 1));
        let sql = render(&expr);
        assert!(sql.contains(" OR "), "unexpected sql: {sql}");
        assert!(sql.contains("'F1'") && sql.contains("'F2'"));
    }

    #[test]
    fn merge_combinator_switches_the_join() {
        let expr = compile_filter(
            &GENERATION,
            &json!({"$or": {"generationName": "F1", "familyId": 3}}),
        )
        .unwrap();
        assert!(matches!(&expr, FilterExpr::Or(children) if children.len() == 2));
    }

    #[test]
    fn operator_map_composes_a_range() {
        let expr =
            compile_filter(&GENERATION, &json!({"generationId": {"$gte": 5, "$lte": 9}})).unwrap();
        let sql = render(&expr);
        assert!(sql.contains(">= 5") && sql.contains("<= 9"), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn list_shorthand_compiles_to_in() {
        let expr =
            compile_filter(&GENERATION, &json!({"generationName": ["F1", "F2"]})).unwrap();
        let sql = render(&expr);
        assert!(sql.contains("IN ('F1', 'F2')"), "{sql}");
    }

    #[test]
    fn nin_and_nlike_operators() {
        let expr = compile_filter(
            &PLANT,
            &json!({"plantName": {"$nlike": "test%", "$nin": ["a", "b"]}}),
        )
        .unwrap();
        let sql = render(&expr);
        assert!(sql.contains("NOT LIKE"), "{sql}");
        assert!(sql.contains("NOT IN"), "{sql}");
    }

    #[test]
    fn null_equality_renders_is_null() {
        let expr = compile_filter(&PLANT, &json!({"plantSex": null})).unwrap();
        assert!(render(&expr).contains("IS NULL"));
        let expr = compile_filter(&PLANT, &json!({"plantSex": {"$neq": null}})).unwrap();
        assert!(render(&expr).contains("IS NOT NULL"));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = compile_filter(&GENERATION, &json!({"plantColor": "green"})).unwrap_err();
        assert!(matches!(err, VerdantError::UnknownAttribute { .. }));
        // Same policy inside nested groups.
        let err =
            compile_filter(&GENERATION, &json!({"$or()": {"plantColor": "green"}})).unwrap_err();
        assert!(matches!(err, VerdantError::UnknownAttribute { .. }));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err =
            compile_filter(&GENERATION, &json!({"generationName": {"$regex": "F.*"}})).unwrap_err();
        assert!(matches!(err, VerdantError::Validation { .. }));
    }

    #[test]
    fn scalar_filter_spec_is_rejected() {
        assert!(compile_filter(&GENERATION, &json!("F1")).is_err());
        assert!(compile_filter(&GENERATION, &json!([42])).is_err());
    }

    #[test]
    fn exact_relation_compiles_to_grouped_subquery() {
        let expr = compile_filter(&GENERATION, &json!({"generationParents": [5, 7]})).unwrap();
        let sql = render(&expr);
        assert!(sql.contains(r#""generations"."generationId" IN (SELECT"#), "{sql}");
        assert!(sql.contains("GROUP BY"), "{sql}");
        assert!(sql.contains("HAVING"), "{sql}");
        assert!(sql.contains("= 2"), "{sql}");
    }

    #[test]
    fn exact_relation_deduplicates_ids() {
        let expr = compile_filter(&GENERATION, &json!({"generationParents": [5, 5, 7]})).unwrap();
        let FilterExpr::ExactRelation { ids, .. } = &expr else {
            panic!("expected relation node");
        };
        assert_eq!(ids, &vec![5, 7]);
    }

    #[test]
    fn relation_ids_must_be_integers() {
        assert!(compile_filter(&GENERATION, &json!({"generationParents": ["x"]})).is_err());
    }
}
