//! Store gateway: the only code that talks to the backend.
//!
//! Reads run directly against the pool. Every mutation goes through a
//! [`StoreTx`], which rolls back when dropped without [`StoreTx::commit`].

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::database::audit::AuditEntry;
use crate::database::entity::{EntityKind, FieldType};
use crate::database::manager::DatabaseError;
use crate::database::query_builder::QueryBuilder;
use crate::database::record::{parse_date, Fields, Record};

/// Read access plus the ability to open a mutation transaction
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn select_records(&self, kind: &'static EntityKind, active_only: bool) -> Result<Vec<Record>, DatabaseError>;

    async fn select_record(&self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError>;

    async fn select_audit(&self, kind: &'static EntityKind) -> Result<Vec<AuditEntry>, DatabaseError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// An open transaction. Dropping it without commit discards every write.
#[async_trait]
pub trait StoreTx: Send {
    /// Read one row and hold it locked until the transaction ends
    async fn lock_record(&mut self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError>;

    /// Insert an active row, returning the backend-assigned id
    async fn insert_record(&mut self, kind: &'static EntityKind, fields: &Fields) -> Result<Option<i64>, DatabaseError>;

    /// Overwrite every domain field and the state flag of `record.id`
    async fn update_record(&mut self, kind: &'static EntityKind, record: &Record) -> Result<u64, DatabaseError>;

    async fn set_state(&mut self, kind: &'static EntityKind, id: i64, estado: bool) -> Result<u64, DatabaseError>;

    async fn insert_audit(&mut self, kind: &'static EntityKind, entry: &AuditEntry) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// PostgreSQL gateway over a shared pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreGateway for PgStore {
    async fn select_records(&self, kind: &'static EntityKind, active_only: bool) -> Result<Vec<Record>, DatabaseError> {
        let sql = QueryBuilder::new(kind).select(active_only);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_record(kind, row)).collect()
    }

    async fn select_record(&self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError> {
        let sql = QueryBuilder::new(kind).select_one(false);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|row| decode_record(kind, &row)).transpose()
    }

    async fn select_audit(&self, kind: &'static EntityKind) -> Result<Vec<AuditEntry>, DatabaseError> {
        let sql = QueryBuilder::new(kind).audit_select();
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| match row_object(row)? {
                Value::Object(map) => AuditEntry::from_row_map(kind, map),
                other => Err(DatabaseError::QueryError(format!("unexpected audit row format: {}", other))),
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_record(&mut self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError> {
        let sql = QueryBuilder::new(kind).select_one(true);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        row.map(|row| decode_record(kind, &row)).transpose()
    }

    async fn insert_record(&mut self, kind: &'static EntityKind, fields: &Fields) -> Result<Option<i64>, DatabaseError> {
        let sql = QueryBuilder::new(kind).insert();
        let q = bind_params(sqlx::query(&sql), insert_params(kind, fields)?);
        let row = q.fetch_optional(&mut *self.tx).await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<i64>, _>(0)?),
            None => Ok(None),
        }
    }

    async fn update_record(&mut self, kind: &'static EntityKind, record: &Record) -> Result<u64, DatabaseError> {
        let sql = QueryBuilder::new(kind).update();
        let q = bind_params(sqlx::query(&sql), update_params(kind, record)?);
        let result = q.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn set_state(&mut self, kind: &'static EntityKind, id: i64, estado: bool) -> Result<u64, DatabaseError> {
        let sql = QueryBuilder::new(kind).set_state();
        let q = bind_params(sqlx::query(&sql), set_state_params(id, estado));
        let result = q.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert_audit(&mut self, kind: &'static EntityKind, entry: &AuditEntry) -> Result<(), DatabaseError> {
        let sql = QueryBuilder::new(kind).audit_insert();
        let q = bind_params(sqlx::query(&sql), audit_params(kind, entry)?);
        q.execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn row_object(row: &PgRow) -> Result<Value, DatabaseError> {
    Ok(row.try_get::<Value, _>("row")?)
}

fn decode_record(kind: &EntityKind, row: &PgRow) -> Result<Record, DatabaseError> {
    match row_object(row)? {
        Value::Object(map) => Record::from_row_map(kind, map),
        other => Err(DatabaseError::QueryError(format!("unexpected record format: {}", other))),
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A typed statement parameter; nulls keep the column's SQL type
#[derive(Debug, Clone, PartialEq)]
enum Param {
    Text(Option<String>),
    Integer(Option<i64>),
    Date(Option<NaiveDate>),
    Boolean(Option<bool>),
}

impl Param {
    /// Convert a JSON field value with the SQL type of its column
    fn field(field_type: FieldType, v: &Value) -> Result<Self, DatabaseError> {
        let mismatch = || DatabaseError::QueryError(format!("cannot bind {} as {}", v, field_type.describe()));

        let param = match (field_type, v) {
            (FieldType::Text, Value::Null) => Param::Text(None),
            (FieldType::Text, Value::String(s)) => Param::Text(Some(s.clone())),
            (FieldType::Integer, Value::Null) => Param::Integer(None),
            (FieldType::Integer, Value::Number(n)) => Param::Integer(Some(n.as_i64().ok_or_else(mismatch)?)),
            (FieldType::Date, Value::Null) => Param::Date(None),
            (FieldType::Date, Value::String(s)) => Param::Date(Some(parse_date(s).ok_or_else(mismatch)?)),
            (FieldType::Boolean, Value::Null) => Param::Boolean(None),
            (FieldType::Boolean, Value::Bool(b)) => Param::Boolean(Some(*b)),
            _ => return Err(mismatch()),
        };
        Ok(param)
    }
}

/// `$1..$n`: every domain field in descriptor order
fn insert_params(kind: &EntityKind, fields: &Fields) -> Result<Vec<Param>, DatabaseError> {
    kind.fields
        .iter()
        .map(|def| Param::field(def.field_type, fields.get(def.name).unwrap_or(&Value::Null)))
        .collect()
}

/// Domain fields, then `estado`, then the id
fn update_params(kind: &EntityKind, record: &Record) -> Result<Vec<Param>, DatabaseError> {
    let mut params = insert_params(kind, &record.fields)?;
    params.push(Param::Boolean(Some(record.estado)));
    params.push(Param::Integer(Some(record.id)));
    Ok(params)
}

fn set_state_params(id: i64, estado: bool) -> Vec<Param> {
    vec![Param::Boolean(Some(estado)), Param::Integer(Some(id))]
}

/// Same order as `QueryBuilder::audit_columns`
fn audit_params(kind: &EntityKind, entry: &AuditEntry) -> Result<Vec<Param>, DatabaseError> {
    let mut params = vec![Param::Integer(Some(entry.entity_id))];
    for def in kind.fields {
        let change = entry
            .change(def.name)
            .ok_or_else(|| DatabaseError::QueryError(format!("audit entry without field {}", def.name)))?;
        params.push(Param::field(def.field_type, &change.old_value)?);
        params.push(Param::field(def.field_type, &change.new_value)?);
    }
    params.push(Param::Boolean(entry.estado_anterior));
    params.push(Param::Boolean(entry.estado_nuevo));
    params.push(Param::Text(Some(entry.operation.as_str().to_string())));
    params.push(Param::Date(Some(entry.fecha_modificacion)));
    params.push(Param::Text(Some(entry.usuario_modificador.clone())));
    Ok(params)
}

fn bind_params(mut q: PgQuery<'_>, params: Vec<Param>) -> PgQuery<'_> {
    for param in params {
        q = match param {
            Param::Text(v) => q.bind(v),
            Param::Integer(v) => q.bind(v),
            Param::Date(v) => q.bind(v),
            Param::Boolean(v) => q.bind(v),
        };
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::database::entity::{ENTITY_KINDS, SECTION};
    use crate::types::Operation;

    /// Highest `$n` in a statement, checking that every lower index is used too
    fn placeholder_count(sql: &str) -> usize {
        let mut seen = Vec::new();
        let mut rest = sql;
        while let Some(pos) = rest.find('$') {
            rest = &rest[pos + 1..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(n) = digits.parse::<usize>() {
                seen.push(n);
            }
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, (1..=seen.len()).collect::<Vec<_>>(), "gap in placeholders: {}", sql);
        seen.len()
    }

    fn sample_value(field_type: FieldType) -> Value {
        match field_type {
            FieldType::Text => json!("x"),
            FieldType::Integer => json!(7),
            FieldType::Date => json!("2024-03-01"),
            FieldType::Boolean => json!(true),
        }
    }

    fn sample_record(kind: &EntityKind) -> Record {
        let fields = kind.fields.iter().map(|d| (d.name.to_string(), sample_value(d.field_type))).collect();
        Record { id: 11, estado: true, fields }
    }

    #[test]
    fn parameter_lists_match_every_statement() {
        for kind in ENTITY_KINDS {
            let qb = QueryBuilder::new(kind);
            let record = sample_record(kind);
            let prior = record.with_state(false);
            let entry = AuditEntry::capture(kind, Operation::Update, Some(&prior), &record, "admin1", Utc::now().date_naive());

            assert_eq!(placeholder_count(&qb.insert()), insert_params(kind, &record.fields).unwrap().len(), "{}", kind.name);
            assert_eq!(placeholder_count(&qb.update()), update_params(kind, &record).unwrap().len(), "{}", kind.name);
            assert_eq!(placeholder_count(&qb.set_state()), set_state_params(1, true).len(), "{}", kind.name);
            assert_eq!(placeholder_count(&qb.select_one(true)), 1, "{}", kind.name);

            let params = audit_params(kind, &entry).unwrap();
            assert_eq!(placeholder_count(&qb.audit_insert()), params.len(), "{}", kind.name);
            assert_eq!(qb.audit_columns().len(), params.len(), "{}", kind.name);
        }
    }

    #[test]
    fn audit_parameters_follow_column_order() {
        let kind = &SECTION;
        let prior = sample_record(kind);
        let mut current = prior.clone();
        current.fields.insert("aula".to_string(), json!("B2"));
        current.estado = false;
        let fecha = Utc::now().date_naive();
        let entry = AuditEntry::capture(kind, Operation::Delete, Some(&prior), &current, "admin2", fecha);

        let columns = QueryBuilder::new(kind).audit_columns();
        let params = audit_params(kind, &entry).unwrap();
        let at = |column: &str| {
            let i = columns.iter().position(|c| c == column).unwrap();
            params[i].clone()
        };

        assert_eq!(at(kind.id_column), Param::Integer(Some(11)));
        assert_eq!(at("aula_anterior"), Param::Text(Some("x".to_string())));
        assert_eq!(at("aula_nuevo"), Param::Text(Some("B2".to_string())));
        assert_eq!(at("estado_anterior"), Param::Boolean(Some(true)));
        assert_eq!(at("estado_nuevo"), Param::Boolean(Some(false)));
        assert_eq!(at("operacion"), Param::Text(Some("DELETE".to_string())));
        assert_eq!(at("fecha_modificacion"), Param::Date(Some(fecha)));
        assert_eq!(at("usuario_modificador"), Param::Text(Some("admin2".to_string())));
    }

    #[test]
    fn update_binds_state_then_id_last() {
        let record = sample_record(&SECTION);
        let params = update_params(&SECTION, &record).unwrap();
        let n = params.len();
        assert_eq!(params[n - 2], Param::Boolean(Some(true)));
        assert_eq!(params[n - 1], Param::Integer(Some(11)));
        assert!(QueryBuilder::new(&SECTION).update().ends_with(&format!("= ${}", n)));
    }

    #[test]
    fn mistyped_values_are_refused_before_binding() {
        assert!(Param::field(FieldType::Integer, &json!("7")).is_err());
        assert!(Param::field(FieldType::Date, &json!("2024-03-01 junk")).is_err());
        assert_eq!(Param::field(FieldType::Date, &Value::Null).unwrap(), Param::Date(None));
    }
}
