//! Audit trail rows and the recorder that writes them.
//!
//! Each mutation of a tracked entity produces exactly one [`AuditEntry`]
//! carrying the full before/after pair of every domain field. The recorder
//! writes it through the caller's open transaction, so the entity change and
//! its audit row commit or roll back together.

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::database::entity::{EntityKind, AUDIT_ID_COLUMN, NEW_SUFFIX, PRIOR_SUFFIX, STATE_COLUMN};
use crate::database::manager::DatabaseError;
use crate::database::record::Record;
use crate::database::store::StoreTx;
use crate::types::Operation;

pub const OPERATION_COLUMN: &str = "operacion";
pub const DATE_COLUMN: &str = "fecha_modificacion";
pub const USER_COLUMN: &str = "usuario_modificador";

/// Before/after values of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl FieldChange {
    pub fn changed(&self) -> bool {
        self.old_value != self.new_value
    }
}

/// One immutable row of an audit table
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// Assigned by the store on insert
    pub audit_id: Option<i64>,
    pub entity_id: i64,
    pub operation: Operation,
    /// One pair per domain field, in descriptor order
    pub changes: Vec<FieldChange>,
    pub estado_anterior: Option<bool>,
    pub estado_nuevo: Option<bool>,
    pub fecha_modificacion: NaiveDate,
    pub usuario_modificador: String,
}

impl AuditEntry {
    /// Snapshot a mutation. `prior` is `None` for inserts, in which case every
    /// `*_anterior` value is null.
    pub fn capture(
        kind: &EntityKind,
        operation: Operation,
        prior: Option<&Record>,
        new: &Record,
        usuario: &str,
        fecha: NaiveDate,
    ) -> Self {
        let changes = kind
            .field_names()
            .map(|name| FieldChange {
                field: name.to_string(),
                old_value: prior.map(|p| p.get(name).clone()).unwrap_or(Value::Null),
                new_value: new.get(name).clone(),
            })
            .collect();

        Self {
            audit_id: None,
            entity_id: new.id,
            operation,
            changes,
            estado_anterior: prior.map(|p| p.estado),
            estado_nuevo: Some(new.estado),
            fecha_modificacion: fecha,
            usuario_modificador: usuario.to_string(),
        }
    }

    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Fields whose value differs between the two sides
    pub fn changed_fields(&self) -> Vec<&str> {
        self.changes.iter().filter(|c| c.changed()).map(|c| c.field.as_str()).collect()
    }

    /// Build an entry from a `row_to_json` object of an audit table
    pub fn from_row_map(kind: &EntityKind, mut map: Map<String, Value>) -> Result<Self, DatabaseError> {
        let malformed = |what: &str| DatabaseError::QueryError(format!("{} row with invalid {}", kind.audit_table, what));

        let audit_id = map.remove(AUDIT_ID_COLUMN).and_then(|v| v.as_i64());
        let entity_id = map
            .remove(kind.id_column)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| malformed(kind.id_column))?;
        let operation = map
            .remove(OPERATION_COLUMN)
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(Operation::parse)
            .ok_or_else(|| malformed(OPERATION_COLUMN))?;
        let fecha_modificacion = map
            .remove(DATE_COLUMN)
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(crate::database::record::parse_date)
            .ok_or_else(|| malformed(DATE_COLUMN))?;
        let usuario_modificador = match map.remove(USER_COLUMN) {
            Some(Value::String(s)) => s,
            _ => return Err(malformed(USER_COLUMN)),
        };

        let estado_anterior = map.remove(&format!("{}{}", STATE_COLUMN, PRIOR_SUFFIX)).and_then(|v| v.as_bool());
        let estado_nuevo = map.remove(&format!("{}{}", STATE_COLUMN, NEW_SUFFIX)).and_then(|v| v.as_bool());

        let changes = kind
            .fields
            .iter()
            .map(|def| FieldChange {
                field: def.name.to_string(),
                old_value: map.remove(&def.prior_column()).unwrap_or(Value::Null),
                new_value: map.remove(&def.new_column()).unwrap_or(Value::Null),
            })
            .collect();

        Ok(Self {
            audit_id,
            entity_id,
            operation,
            changes,
            estado_anterior,
            estado_nuevo,
            fecha_modificacion,
            usuario_modificador,
        })
    }

    /// API output, flattened to the audit table's column layout
    pub fn to_json(&self, kind: &EntityKind) -> Value {
        let mut output = Map::new();
        if let Some(audit_id) = self.audit_id {
            output.insert(AUDIT_ID_COLUMN.to_string(), Value::Number(audit_id.into()));
        }
        output.insert(kind.id_column.to_string(), Value::Number(self.entity_id.into()));
        for change in &self.changes {
            output.insert(format!("{}{}", change.field, PRIOR_SUFFIX), change.old_value.clone());
            output.insert(format!("{}{}", change.field, NEW_SUFFIX), change.new_value.clone());
        }
        output.insert(
            format!("{}{}", STATE_COLUMN, PRIOR_SUFFIX),
            self.estado_anterior.map(Value::Bool).unwrap_or(Value::Null),
        );
        output.insert(
            format!("{}{}", STATE_COLUMN, NEW_SUFFIX),
            self.estado_nuevo.map(Value::Bool).unwrap_or(Value::Null),
        );
        output.insert(OPERATION_COLUMN.to_string(), Value::String(self.operation.as_str().to_string()));
        output.insert(
            DATE_COLUMN.to_string(),
            Value::String(self.fecha_modificacion.format("%Y-%m-%d").to_string()),
        );
        output.insert(USER_COLUMN.to_string(), Value::String(self.usuario_modificador.clone()));
        Value::Object(output)
    }

    pub fn to_json_array(kind: &EntityKind, entries: &[AuditEntry]) -> Value {
        Value::Array(entries.iter().map(|e| e.to_json(kind)).collect())
    }
}

/// Writes audit rows for one entity kind
#[derive(Debug, Clone, Copy)]
pub struct AuditRecorder {
    kind: &'static EntityKind,
}

impl AuditRecorder {
    pub fn new(kind: &'static EntityKind) -> Self {
        Self { kind }
    }

    /// Stamp the event date and insert the audit row inside `tx`
    pub async fn record(
        &self,
        tx: &mut dyn StoreTx,
        operation: Operation,
        prior: Option<&Record>,
        new: &Record,
        usuario: &str,
    ) -> Result<AuditEntry, DatabaseError> {
        let entry = AuditEntry::capture(self.kind, operation, prior, new, usuario, Utc::now().date_naive());
        tx.insert_audit(self.kind, &entry).await?;
        tracing::debug!(
            "Audit {} recorded for {} {} by {}",
            operation,
            self.kind,
            new.id,
            usuario
        );
        Ok(entry)
    }
}
