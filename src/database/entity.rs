//! Entity kind descriptors.
//!
//! Every tracked table is described by one static [`EntityKind`]. The generic
//! repository, the audit recorder, the SQL builder and the schema generator
//! all derive their column lists from these descriptors, so adding a field
//! means touching exactly one table below.

/// Name of the soft-delete flag column shared by every entity table
pub const STATE_COLUMN: &str = "estado";

/// Surrogate key of every audit table
pub const AUDIT_ID_COLUMN: &str = "id_audit";

/// Suffix for the "before" half of an audit column pair
pub const PRIOR_SUFFIX: &str = "_anterior";

/// Suffix for the "after" half of an audit column pair
pub const NEW_SUFFIX: &str = "_nuevo";

/// Column types supported by entity fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Date,
    Boolean,
}

impl FieldType {
    /// PostgreSQL column type used by the generated schema
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "BIGINT",
            FieldType::Date => "DATE",
            FieldType::Boolean => "BOOLEAN",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FieldType::Text => "string",
            FieldType::Integer => "integer",
            FieldType::Date => "date (YYYY-MM-DD)",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type, required: true }
    }

    const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type, required: false }
    }

    pub fn prior_column(&self) -> String {
        format!("{}{}", self.name, PRIOR_SUFFIX)
    }

    pub fn new_column(&self) -> String {
        format!("{}{}", self.name, NEW_SUFFIX)
    }
}

/// Static description of one tracked entity table and its audit table
#[derive(Debug, PartialEq, Eq)]
pub struct EntityKind {
    /// Name used in URLs and logs
    pub name: &'static str,
    /// Human readable label for error messages
    pub label: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub audit_table: &'static str,
    /// Domain fields, excluding the id and the state flag
    pub fields: &'static [FieldDef],
}

impl EntityKind {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

use FieldType::*;

pub static SECTION: EntityKind = EntityKind {
    name: "seccion",
    label: "Sección",
    table: "tb_seccion",
    id_column: "id_seccion",
    audit_table: "tb_audit_seccion",
    fields: &[
        FieldDef::required("aula", Text),
        FieldDef::required("grado", Integer),
        FieldDef::required("nombre", Text),
        FieldDef::required("periodo", Integer),
    ],
};

pub static GRADE: EntityKind = EntityKind {
    name: "grado",
    label: "Grado",
    table: "tb_grado",
    id_column: "id_grado",
    audit_table: "tb_audit_grado",
    fields: &[
        FieldDef::required("nombre", Text),
        FieldDef::required("nivel", Text),
        FieldDef::optional("descripcion", Text),
    ],
};

pub static STUDENT: EntityKind = EntityKind {
    name: "estudiante",
    label: "Estudiante",
    table: "tb_estudiante",
    id_column: "id_estudiante",
    audit_table: "tb_audit_estudiante",
    fields: &[
        FieldDef::required("nombres", Text),
        FieldDef::required("apellidos", Text),
        FieldDef::required("dni", Text),
        FieldDef::required("fecha_nacimiento", Date),
        FieldDef::optional("id_seccion", Integer),
    ],
};

pub static EMPLOYEE: EntityKind = EntityKind {
    name: "empleado",
    label: "Empleado",
    table: "tb_empleado",
    id_column: "id_empleado",
    audit_table: "tb_audit_empleado",
    fields: &[
        FieldDef::required("nombres", Text),
        FieldDef::required("apellidos", Text),
        FieldDef::required("dni", Text),
        FieldDef::required("cargo", Text),
        FieldDef::optional("correo", Text),
        FieldDef::optional("telefono", Text),
    ],
};

pub static COURSE_SECTION: EntityKind = EntityKind {
    name: "curso_seccion",
    label: "Curso-sección",
    table: "tb_curso_seccion",
    id_column: "id_curso_seccion",
    audit_table: "tb_audit_curso_seccion",
    fields: &[
        FieldDef::required("id_curso", Integer),
        FieldDef::required("id_seccion", Integer),
        FieldDef::required("id_empleado", Integer),
        FieldDef::optional("horario", Text),
    ],
};

/// All tracked kinds, in schema creation order
pub static ENTITY_KINDS: [&EntityKind; 5] = [&GRADE, &SECTION, &STUDENT, &EMPLOYEE, &COURSE_SECTION];

/// Resolve a kind by its URL name
pub fn lookup(name: &str) -> Option<&'static EntityKind> {
    ENTITY_KINDS.iter().copied().find(|kind| kind.name == name)
}
