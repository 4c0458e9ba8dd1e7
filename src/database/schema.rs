//! DDL for the entity and audit tables, generated from the entity catalog.

use sqlx::PgPool;
use tracing::info;

use crate::database::audit::{DATE_COLUMN, OPERATION_COLUMN, USER_COLUMN};
use crate::database::entity::{EntityKind, AUDIT_ID_COLUMN, ENTITY_KINDS, NEW_SUFFIX, PRIOR_SUFFIX, STATE_COLUMN};
use crate::database::manager::DatabaseError;
use crate::database::query_builder::quote_identifier;

const IMMUTABLE_FUNCTION: &str = "aula_audit_immutable";

/// Trigger function shared by every audit table: audit rows are write-once
fn immutable_function() -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {}() RETURNS trigger AS $$ \
         BEGIN RAISE EXCEPTION 'audit rows are immutable (%)', TG_TABLE_NAME; END; \
         $$ LANGUAGE plpgsql",
        IMMUTABLE_FUNCTION
    )
}

pub fn entity_table(kind: &EntityKind) -> String {
    let mut columns = vec![format!("{} BIGSERIAL PRIMARY KEY", quote_identifier(kind.id_column))];
    for def in kind.fields {
        columns.push(format!(
            "{} {}{}",
            quote_identifier(def.name),
            def.field_type.sql_type(),
            if def.required { " NOT NULL" } else { "" }
        ));
    }
    columns.push(format!("{} BOOLEAN NOT NULL DEFAULT TRUE", quote_identifier(STATE_COLUMN)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(kind.table),
        columns.join(", ")
    )
}

pub fn audit_table(kind: &EntityKind) -> String {
    let mut columns = vec![
        format!("{} BIGSERIAL PRIMARY KEY", quote_identifier(AUDIT_ID_COLUMN)),
        format!(
            "{} BIGINT NOT NULL REFERENCES {} ({})",
            quote_identifier(kind.id_column),
            quote_identifier(kind.table),
            quote_identifier(kind.id_column)
        ),
    ];
    for def in kind.fields {
        columns.push(format!("{} {}", quote_identifier(&def.prior_column()), def.field_type.sql_type()));
        columns.push(format!("{} {}", quote_identifier(&def.new_column()), def.field_type.sql_type()));
    }
    columns.push(format!("{} BOOLEAN", quote_identifier(&format!("{}{}", STATE_COLUMN, PRIOR_SUFFIX))));
    columns.push(format!("{} BOOLEAN", quote_identifier(&format!("{}{}", STATE_COLUMN, NEW_SUFFIX))));
    columns.push(format!(
        "{} TEXT NOT NULL CHECK ({} IN ('INSERT', 'UPDATE', 'DELETE'))",
        quote_identifier(OPERATION_COLUMN),
        quote_identifier(OPERATION_COLUMN)
    ));
    columns.push(format!("{} DATE NOT NULL", quote_identifier(DATE_COLUMN)));
    columns.push(format!("{} TEXT NOT NULL", quote_identifier(USER_COLUMN)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(kind.audit_table),
        columns.join(", ")
    )
}

fn audit_triggers(kind: &EntityKind) -> [String; 2] {
    let trigger = quote_identifier(&format!("{}_immutable", kind.audit_table));
    let table = quote_identifier(kind.audit_table);
    [
        format!("DROP TRIGGER IF EXISTS {} ON {}", trigger, table),
        format!(
            "CREATE TRIGGER {} BEFORE UPDATE OR DELETE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
            trigger, table, IMMUTABLE_FUNCTION
        ),
    ]
}

/// Every statement needed for a fresh database, in execution order
pub fn statements() -> Vec<String> {
    let mut statements = vec![immutable_function()];
    for kind in ENTITY_KINDS {
        statements.push(entity_table(kind));
        statements.push(audit_table(kind));
        statements.extend(audit_triggers(kind));
    }
    statements
}

/// Create any missing tables and (re)install the audit triggers, atomically
pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
    let mut tx = pool.begin().await?;
    for statement in statements() {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!("Schema applied for {} entity kinds", ENTITY_KINDS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entity::{SECTION, STUDENT};

    #[test]
    fn entity_table_has_identity_fields_and_state() {
        let ddl = entity_table(&STUDENT);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"tb_estudiante\""));
        assert!(ddl.contains("\"id_estudiante\" BIGSERIAL PRIMARY KEY"));
        assert!(ddl.contains("\"fecha_nacimiento\" DATE NOT NULL"));
        assert!(ddl.contains("\"id_seccion\" BIGINT,"));
        assert!(ddl.contains("\"estado\" BOOLEAN NOT NULL DEFAULT TRUE"));
    }

    #[test]
    fn audit_table_pairs_every_field() {
        let ddl = audit_table(&SECTION);
        assert!(ddl.contains("REFERENCES \"tb_seccion\" (\"id_seccion\")"));
        for name in ["aula", "grado", "nombre", "periodo", "estado"] {
            assert!(ddl.contains(&format!("\"{}_anterior\"", name)), "missing {}_anterior", name);
            assert!(ddl.contains(&format!("\"{}_nuevo\"", name)), "missing {}_nuevo", name);
        }
        assert!(ddl.contains("\"fecha_modificacion\" DATE NOT NULL"));
        assert!(ddl.contains("\"usuario_modificador\" TEXT NOT NULL"));
    }

    #[test]
    fn creates_entity_tables_before_their_audit_tables() {
        let statements = statements();
        assert!(statements[0].contains(IMMUTABLE_FUNCTION));
        for kind in ENTITY_KINDS {
            let entity = statements.iter().position(|s| s == &entity_table(kind)).unwrap();
            let audit = statements.iter().position(|s| s == &audit_table(kind)).unwrap();
            assert!(entity < audit, "{} audit table created first", kind);
        }
        assert_eq!(statements.len(), 1 + ENTITY_KINDS.len() * 4);
    }
}
