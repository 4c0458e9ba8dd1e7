use crate::database::audit::{DATE_COLUMN, OPERATION_COLUMN, USER_COLUMN};
use crate::database::entity::{EntityKind, AUDIT_ID_COLUMN, NEW_SUFFIX, PRIOR_SUFFIX, STATE_COLUMN};

/// Builds the parameterized statements used against one entity kind.
///
/// Reads go through `row_to_json` so rows come back as JSON objects keyed by
/// column name, whatever the kind's field list looks like.
pub struct QueryBuilder {
    kind: &'static EntityKind,
}

impl QueryBuilder {
    pub fn new(kind: &'static EntityKind) -> Self {
        Self { kind }
    }

    /// All rows, or only rows with `estado = true`
    pub fn select(&self, active_only: bool) -> String {
        let filter = if active_only {
            format!(" WHERE t.{} = true", quote_identifier(STATE_COLUMN))
        } else {
            String::new()
        };
        format!(
            "SELECT row_to_json(t) AS row FROM {} t{} ORDER BY t.{}",
            quote_identifier(self.kind.table),
            filter,
            quote_identifier(self.kind.id_column)
        )
    }

    /// One row by id, optionally taking a row lock for the rest of the transaction
    pub fn select_one(&self, lock: bool) -> String {
        format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE t.{} = $1{}",
            quote_identifier(self.kind.table),
            quote_identifier(self.kind.id_column),
            if lock { " FOR UPDATE" } else { "" }
        )
    }

    /// Insert of every domain field; the row starts active
    pub fn insert(&self) -> String {
        let mut columns: Vec<String> = self.kind.field_names().map(quote_identifier).collect();
        let mut values = placeholders(1, columns.len());
        columns.push(quote_identifier(STATE_COLUMN));
        values.push("true".to_string());

        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote_identifier(self.kind.table),
            columns.join(", "),
            values.join(", "),
            quote_identifier(self.kind.id_column)
        )
    }

    /// Overwrite of every domain field plus the state flag; id is the last parameter
    pub fn update(&self) -> String {
        let assignments: Vec<String> = self
            .kind
            .field_names()
            .chain(std::iter::once(STATE_COLUMN))
            .enumerate()
            .map(|(i, name)| format!("{} = ${}", quote_identifier(name), i + 1))
            .collect();
        let id_param = assignments.len() + 1;

        format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            quote_identifier(self.kind.table),
            assignments.join(", "),
            quote_identifier(self.kind.id_column),
            id_param
        )
    }

    pub fn set_state(&self) -> String {
        format!(
            "UPDATE {} SET {} = $1 WHERE {} = $2",
            quote_identifier(self.kind.table),
            quote_identifier(STATE_COLUMN),
            quote_identifier(self.kind.id_column)
        )
    }

    /// Audit table columns in bind order
    pub fn audit_columns(&self) -> Vec<String> {
        let mut columns = vec![self.kind.id_column.to_string()];
        for def in self.kind.fields {
            columns.push(def.prior_column());
            columns.push(def.new_column());
        }
        columns.push(format!("{}{}", STATE_COLUMN, PRIOR_SUFFIX));
        columns.push(format!("{}{}", STATE_COLUMN, NEW_SUFFIX));
        columns.push(OPERATION_COLUMN.to_string());
        columns.push(DATE_COLUMN.to_string());
        columns.push(USER_COLUMN.to_string());
        columns
    }

    pub fn audit_insert(&self) -> String {
        let columns = self.audit_columns();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(self.kind.audit_table),
            columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
            placeholders(1, columns.len()).join(", ")
        )
    }

    /// Audit rows in insertion order
    pub fn audit_select(&self) -> String {
        format!(
            "SELECT row_to_json(t) AS row FROM {} t ORDER BY t.{}",
            quote_identifier(self.kind.audit_table),
            quote_identifier(AUDIT_ID_COLUMN)
        )
    }
}

fn placeholders(start: usize, count: usize) -> Vec<String> {
    (start..start + count).map(|i| format!("${}", i)).collect()
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
