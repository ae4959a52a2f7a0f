use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Condition, Expr, Func, Order, Query, QueryStatementWriter, SelectStatement,
    SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value as JsonValue;

use verdant_core::{
    CreatedRecords, Criteria, EntityDescriptor, FoundRecords, Record, RecordCreateApi,
    RecordMutationApi, RecordQueryApi, SortDirection, Timestamp, Value, VerdantError,
    VerdantResult,
};

use crate::config::{DatabaseConfig, VerdantConfig};
use crate::filter::compile_filter;
use crate::migration::Migrator;
use crate::txn::TransactionGate;

pub struct VerdantStore {
    conn: DatabaseConnection,
    gate: TransactionGate,
}

impl VerdantStore {
    pub async fn connect(config: &VerdantConfig, base_dir: &Path) -> VerdantResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        // One connection: the SQLite handle carries one in-flight
        // transaction, and an in-memory database must not be split
        // across pool members.
        options.max_connections(1).min_connections(1);
        if let Some(pool) = &config.pool {
            if let Some(ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(ms));
            }
        }
        let conn = Database::connect(options).await?;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA foreign_keys = ON;".to_owned(),
        ))
        .await?;
        Migrator::up(&conn, None).await?;
        log::debug!("verdant store connected, schema is current");
        Ok(Self {
            conn,
            gate: TransactionGate::new(),
        })
    }

    pub async fn connect_in_memory() -> VerdantResult<Self> {
        Self::connect(&VerdantConfig::in_memory(), Path::new(".")).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub(crate) fn gate(&self) -> &TransactionGate {
        &self.gate
    }

    /// Ids of the records matched by `criteria`, honoring filter, sort
    /// and paging. Shared by update and delete.
    async fn resolve_ids(
        &self,
        descriptor: &'static EntityDescriptor,
        criteria: &Criteria,
    ) -> VerdantResult<Vec<i64>> {
        let mut select = Query::select()
            .column((
                Alias::new(descriptor.table),
                Alias::new(descriptor.id_attribute),
            ))
            .from(Alias::new(descriptor.table))
            .to_owned();
        if let Some(condition) = compile_condition(descriptor, criteria)? {
            select.cond_where(condition);
        }
        apply_sort(&mut select, descriptor, criteria)?;
        apply_paging(&mut select, criteria);
        let rows = query_all(&self.conn, &select).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<i64>("", descriptor.id_attribute)
                    .map_err(VerdantError::from)
            })
            .collect()
    }

    async fn resolve_relation_lists(
        &self,
        descriptor: &'static EntityDescriptor,
        group: &mut BTreeMap<i64, Record>,
    ) -> VerdantResult<()> {
        let Some(relation) = descriptor.relation else {
            return Ok(());
        };
        let mut lists: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        if !group.is_empty() {
            let select = Query::select()
                .column(Alias::new(relation.own_column))
                .column(Alias::new(relation.other_column))
                .from(Alias::new(relation.table))
                .and_where(Expr::col(Alias::new(relation.own_column)).is_in(group.keys().copied()))
                .to_owned();
            for row in query_all(&self.conn, &select).await? {
                let own: i64 = row.try_get("", relation.own_column)?;
                let other: i64 = row.try_get("", relation.other_column)?;
                lists.entry(own).or_default().push(other);
            }
        }
        for (id, record) in group.iter_mut() {
            let ids = lists.remove(id).unwrap_or_default();
            record.insert(
                relation.attribute.to_string(),
                JsonValue::Array(ids.into_iter().map(JsonValue::from).collect()),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RecordCreateApi for VerdantStore {
    async fn create(
        &self,
        descriptor: &'static EntityDescriptor,
        options: JsonValue,
    ) -> VerdantResult<CreatedRecords> {
        crate::create::run_create(self, descriptor, options).await
    }
}

#[async_trait]
impl RecordQueryApi for VerdantStore {
    async fn find(
        &self,
        descriptor: &'static EntityDescriptor,
        criteria: Criteria,
    ) -> VerdantResult<FoundRecords> {
        let condition = compile_condition(descriptor, &criteria)?;

        let mut count_query = Query::select()
            .expr_as(
                Func::count(Expr::col((
                    Alias::new(descriptor.table),
                    Alias::new(descriptor.id_attribute),
                ))),
                Alias::new("found"),
            )
            .from(Alias::new(descriptor.table))
            .to_owned();
        if let Some(cond) = condition.clone() {
            count_query.cond_where(cond);
        }
        let row = query_one(&self.conn, &count_query)
            .await?
            .ok_or_else(|| VerdantError::storage("count query returned no row"))?;
        let found: i64 = row.try_get("", "found")?;

        let projection = projection_attributes(descriptor, &criteria)?;
        let mut select = Query::select().from(Alias::new(descriptor.table)).to_owned();
        for attr in &projection {
            select.column((Alias::new(descriptor.table), Alias::new(attr.as_str())));
        }
        if let Some(cond) = condition {
            select.cond_where(cond);
        }
        apply_sort(&mut select, descriptor, &criteria)?;
        apply_paging(&mut select, &criteria);

        let rows = query_all(&self.conn, &select).await?;
        let mut group: BTreeMap<i64, Record> = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.try_get("", descriptor.id_attribute)?;
            let mut record = Record::new();
            for attr in &projection {
                record.insert(attr.clone(), read_column(row, attr));
            }
            group.insert(id, record);
        }
        if wants_relation(descriptor, &criteria) {
            self.resolve_relation_lists(descriptor, &mut group).await?;
        }

        let returned = group.len() as u64;
        let found = found.max(0) as u64;
        let remaining = found
            .saturating_sub(criteria.offset.unwrap_or(0))
            .saturating_sub(returned);
        let mut records = BTreeMap::new();
        records.insert(descriptor.plural_key.to_string(), group);
        Ok(FoundRecords {
            records,
            found,
            remaining,
        })
    }
}

#[async_trait]
impl RecordMutationApi for VerdantStore {
    async fn update(
        &self,
        descriptor: &'static EntityDescriptor,
        values: JsonValue,
        criteria: Criteria,
    ) -> VerdantResult<Vec<i64>> {
        let JsonValue::Object(values) = values else {
            return Err(VerdantError::invalid(
                "update values must be an object of attribute values",
            ));
        };
        if values.is_empty() {
            return Err(VerdantError::invalid("update values must not be empty"));
        }
        let mut fk_suspects = Vec::new();
        for (key, raw) in &values {
            if key == descriptor.id_attribute
                || key == descriptor.created_at_attribute
                || key == descriptor.modified_at_attribute
            {
                return Err(VerdantError::invalid(format!(
                    "{key} is assigned by the store and cannot be updated"
                )));
            }
            if descriptor.is_relation_attribute(key) {
                return Err(VerdantError::invalid(format!("{key} cannot be updated")));
            }
            let updatable = descriptor.insert_attributes().any(|attr| attr == key)
                || descriptor.parent_id_attributes().any(|attr| attr == key);
            if !updatable {
                return Err(VerdantError::unknown_attribute(key.as_str()));
            }
            let value = Value::from_json(raw)
                .map_err(|_| VerdantError::invalid(format!("attribute {key} must be a scalar")))?;
            if let Some(allowed) = descriptor.enum_values(key) {
                if !value.is_null() && !value.as_text().is_some_and(|t| allowed.contains(&t)) {
                    return Err(VerdantError::invalid(format!(
                        "attribute {key} must be one of {allowed:?}"
                    )));
                }
            }
            if descriptor.parent_id_attributes().any(|attr| attr == key)
                || descriptor.references.contains(&key.as_str())
            {
                fk_suspects.push(key.clone());
            }
        }

        let ids = self.resolve_ids(descriptor, &criteria).await?;
        if ids.is_empty() {
            return Ok(ids);
        }
        let mut update = Query::update()
            .table(Alias::new(descriptor.table))
            .to_owned();
        for (key, raw) in &values {
            update.value(Alias::new(key.as_str()), SeaValue::from(Value::from_json(raw)?));
        }
        update.value(
            Alias::new(descriptor.modified_at_attribute),
            SeaValue::BigInt(Some(Timestamp::now().as_i64())),
        );
        update.and_where(
            Expr::col(Alias::new(descriptor.id_attribute)).is_in(ids.iter().copied()),
        );
        if let Err(err) = exec(&self.conn, &update).await {
            if is_foreign_key_violation(&err) {
                if let Some(attr) = fk_suspects.first() {
                    return Err(VerdantError::reference(attr.clone()));
                }
            }
            return Err(err);
        }
        Ok(ids)
    }

    async fn delete(
        &self,
        descriptor: &'static EntityDescriptor,
        criteria: Criteria,
    ) -> VerdantResult<Vec<i64>> {
        let ids = self.resolve_ids(descriptor, &criteria).await?;
        if ids.is_empty() {
            return Ok(ids);
        }
        let delete = Query::delete()
            .from_table(Alias::new(descriptor.table))
            .and_where(Expr::col(Alias::new(descriptor.id_attribute)).is_in(ids.iter().copied()))
            .to_owned();
        exec(&self.conn, &delete).await?;
        Ok(ids)
    }
}

fn build_connection_url(config: &VerdantConfig, base_dir: &Path) -> VerdantResult<String> {
    match &config.database {
        DatabaseConfig::Memory => Ok("sqlite::memory:".to_owned()),
        DatabaseConfig::Sqlite { .. } => {
            let path = config
                .sqlite_path(base_dir)?
                .expect("sqlite config resolves to a path");
            Ok(format!("sqlite://{}?mode=rwc", path.to_string_lossy()))
        }
    }
}

fn compile_condition(
    descriptor: &'static EntityDescriptor,
    criteria: &Criteria,
) -> VerdantResult<Option<Condition>> {
    criteria
        .filter
        .as_ref()
        .map(|spec| compile_filter(descriptor, spec).map(|expr| expr.to_condition()))
        .transpose()
}

fn projection_attributes(
    descriptor: &'static EntityDescriptor,
    criteria: &Criteria,
) -> VerdantResult<Vec<String>> {
    let mut attrs = vec![descriptor.id_attribute.to_string()];
    if criteria.attributes.is_empty() {
        attrs.extend(descriptor.insert_attributes().map(str::to_string));
        attrs.extend(descriptor.parent_id_attributes().map(str::to_string));
        attrs.push(descriptor.created_at_attribute.to_string());
        attrs.push(descriptor.modified_at_attribute.to_string());
    } else {
        for attr in &criteria.attributes {
            if descriptor.is_relation_attribute(attr) {
                // Resolved from the join table, not a column.
                continue;
            }
            if !descriptor.searchable(attr) {
                return Err(VerdantError::unknown_attribute(attr.as_str()));
            }
            if attr != descriptor.id_attribute {
                attrs.push(attr.clone());
            }
        }
    }
    Ok(attrs)
}

fn wants_relation(descriptor: &'static EntityDescriptor, criteria: &Criteria) -> bool {
    descriptor.relation.is_some()
        && (criteria.attributes.is_empty()
            || criteria
                .attributes
                .iter()
                .any(|attr| descriptor.is_relation_attribute(attr)))
}

fn apply_sort(
    select: &mut SelectStatement,
    descriptor: &'static EntityDescriptor,
    criteria: &Criteria,
) -> VerdantResult<()> {
    for term in &criteria.sort {
        if !descriptor.searchable(&term.attribute)
            || descriptor.is_relation_attribute(&term.attribute)
        {
            return Err(VerdantError::unknown_attribute(term.attribute.as_str()));
        }
        let order = match term.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        select.order_by(
            (
                Alias::new(descriptor.table),
                Alias::new(term.attribute.as_str()),
            ),
            order,
        );
    }
    Ok(())
}

fn apply_paging(select: &mut SelectStatement, criteria: &Criteria) {
    match (criteria.limit, criteria.offset) {
        (Some(limit), offset) => {
            select.limit(limit);
            if let Some(offset) = offset {
                select.offset(offset);
            }
        }
        (None, Some(offset)) => {
            // SQLite needs a LIMIT clause to apply an OFFSET.
            log::warn!("criteria has an offset without a limit; applying the maximum limit");
            select.limit(i64::MAX as u64);
            select.offset(offset);
        }
        (None, None) => {}
    }
}

/// SQLite reports constraint violations only through the message text.
pub(crate) fn is_foreign_key_violation(err: &VerdantError) -> bool {
    matches!(err, VerdantError::Storage { message } if message.to_lowercase().contains("foreign key"))
}

fn read_column(row: &QueryResult, name: &str) -> JsonValue {
    if let Ok(value) = row.try_get::<Option<i64>>("", name) {
        return value.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>>("", name) {
        return value.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>>("", name) {
        return value.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    JsonValue::Null
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(stmt: &S) -> (String, sea_orm::sea_query::Values) {
    stmt.build(SqliteQueryBuilder)
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> VerdantResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = build_stmt(stmt);
    conn.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        sql,
        values,
    ))
    .await?;
    Ok(())
}

pub(crate) async fn exec_returning_id<C, S>(conn: &C, stmt: &S) -> VerdantResult<i64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = build_stmt(stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            sql,
            values,
        ))
        .await?;
    Ok(result.last_insert_id() as i64)
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> VerdantResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = build_stmt(stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            sql,
            values,
        ))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> VerdantResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = build_stmt(stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            sql,
            values,
        ))
        .await?;
    Ok(row)
}
