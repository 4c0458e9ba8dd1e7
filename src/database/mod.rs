pub mod audit;
pub mod entity;
pub mod manager;
pub mod memory;
pub mod query_builder;
pub mod record;
pub mod repository;
pub mod schema;
pub mod store;

pub use audit::{AuditEntry, AuditRecorder, FieldChange};
pub use entity::{EntityKind, FieldDef, FieldType};
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use record::{Record, RecordError, RecordInput};
pub use repository::{EntityRepository, RepositoryError};
pub use store::{PgStore, StoreGateway, StoreTx};
