use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Number, Value};

use crate::database::entity::{EntityKind, FieldDef, FieldType, STATE_COLUMN};
use crate::database::manager::DatabaseError;

/// Domain field values keyed by column name
pub type Fields = Map<String, Value>;

/// Errors that can occur while turning API input into entity fields
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("System field '{0}' cannot be set via API input")]
    SystemFieldNotAllowed(String),
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Invalid value for field '{field}': expected {expected}, got {value}")]
    InvalidType {
        field: String,
        expected: &'static str,
        value: String,
    },
}

impl RecordError {
    /// Field the error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            RecordError::SystemFieldNotAllowed(field)
            | RecordError::MissingRequiredField(field)
            | RecordError::UnknownField(field) => Some(field),
            RecordError::InvalidType { field, .. } => Some(field),
            RecordError::InvalidJson(_) => None,
        }
    }
}

/// One row of an entity table
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub estado: bool,
    pub fields: Fields,
}

/// Validated mutation input: a complete set of domain fields plus an
/// optional state override (only honoured by updates)
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInput {
    pub fields: Fields,
    pub estado: Option<bool>,
}

impl RecordInput {
    /// Parse a create payload. The state flag is owned by the repository on create.
    pub fn for_create(kind: &EntityKind, json: Value) -> Result<Self, RecordError> {
        Self::parse(kind, json, false)
    }

    /// Parse an update payload. Every domain field is overwritten, so required
    /// fields must be present; `estado` may be supplied.
    pub fn for_update(kind: &EntityKind, json: Value) -> Result<Self, RecordError> {
        Self::parse(kind, json, true)
    }

    fn parse(kind: &EntityKind, json: Value, allow_state: bool) -> Result<Self, RecordError> {
        let map = match json {
            Value::Object(map) => map,
            _ => return Err(RecordError::InvalidJson("Expected JSON object".to_string())),
        };

        let mut estado = None;
        for (key, value) in &map {
            if key == kind.id_column {
                return Err(RecordError::SystemFieldNotAllowed(key.clone()));
            }
            if key == STATE_COLUMN {
                if !allow_state {
                    return Err(RecordError::SystemFieldNotAllowed(key.clone()));
                }
                estado = match value {
                    Value::Bool(b) => Some(*b),
                    Value::Null => None,
                    other => {
                        return Err(RecordError::InvalidType {
                            field: key.clone(),
                            expected: FieldType::Boolean.describe(),
                            value: other.to_string(),
                        })
                    }
                };
                continue;
            }
            if kind.field(key).is_none() {
                return Err(RecordError::UnknownField(key.clone()));
            }
        }

        let mut fields = Fields::new();
        for def in kind.fields {
            let value = normalize(def, map.get(def.name))?;
            fields.insert(def.name.to_string(), value);
        }

        Ok(Self { fields, estado })
    }
}

/// Check one input value against its field definition and bring it into the
/// canonical JSON shape stored in records (numbers for integers, ISO strings
/// for dates).
fn normalize(def: &FieldDef, value: Option<&Value>) -> Result<Value, RecordError> {
    let value = match value {
        None | Some(Value::Null) => {
            if def.required {
                return Err(RecordError::MissingRequiredField(def.name.to_string()));
            }
            return Ok(Value::Null);
        }
        Some(v) => v,
    };

    let invalid = || RecordError::InvalidType {
        field: def.name.to_string(),
        expected: def.field_type.describe(),
        value: value.to_string(),
    };

    match def.field_type {
        FieldType::Text => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(invalid()),
        },
        FieldType::Integer => match value {
            Value::Number(n) => n.as_i64().map(|i| Value::Number(i.into())).ok_or_else(invalid),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(Number::from(i)))
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        FieldType::Date => match value {
            Value::String(s) => parse_date(s)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(invalid()),
        },
    }
}

/// Accepts `YYYY-MM-DD` or a complete RFC 3339 timestamp, whose date is taken in its own offset
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
}

impl Record {
    /// The row that results from applying an update payload to this one
    pub fn updated_with(&self, input: &RecordInput) -> Record {
        Record {
            id: self.id,
            estado: input.estado.unwrap_or(self.estado),
            fields: input.fields.clone(),
        }
    }

    /// The same row with only the state flag changed
    pub fn with_state(&self, estado: bool) -> Record {
        Record { estado, ..self.clone() }
    }

    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    /// Build a record from a `row_to_json` object
    pub fn from_row_map(kind: &EntityKind, mut map: Map<String, Value>) -> Result<Self, DatabaseError> {
        let id = map
            .remove(kind.id_column)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DatabaseError::QueryError(format!("{} row without {}", kind.table, kind.id_column)))?;
        let estado = map
            .remove(STATE_COLUMN)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| DatabaseError::QueryError(format!("{} row {} without {}", kind.table, id, STATE_COLUMN)))?;

        let mut fields = Fields::new();
        for name in kind.field_names() {
            fields.insert(name.to_string(), map.remove(name).unwrap_or(Value::Null));
        }

        Ok(Self { id, estado, fields })
    }

    /// API output: the row as stored, id column first
    pub fn to_json(&self, kind: &EntityKind) -> Value {
        let mut output = Map::new();
        output.insert(kind.id_column.to_string(), Value::Number(self.id.into()));
        for name in kind.field_names() {
            output.insert(name.to_string(), self.get(name).clone());
        }
        output.insert(STATE_COLUMN.to_string(), Value::Bool(self.estado));
        Value::Object(output)
    }

    pub fn to_json_array(kind: &EntityKind, records: &[Record]) -> Value {
        Value::Array(records.iter().map(|r| r.to_json(kind)).collect())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record(id: {}, estado: {}, fields: {})", self.id, self.estado, self.fields.len())
    }
}
