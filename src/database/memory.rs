//! In-process store gateway.
//!
//! Keeps every entity table and audit table in memory behind one async mutex.
//! A transaction holds the mutex for its whole lifetime and works on a private
//! copy of the tables, which replaces the shared state only on commit. That
//! gives the same all-or-nothing and serialized read-before-write behaviour
//! the PostgreSQL gateway gets from `BEGIN … FOR UPDATE … COMMIT`.
//!
//! Used by the test suites and by `aula serve --memory`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::database::audit::AuditEntry;
use crate::database::entity::EntityKind;
use crate::database::manager::DatabaseError;
use crate::database::record::{Fields, Record};
use crate::database::store::{StoreGateway, StoreTx};

#[derive(Debug, Clone, Default)]
struct KindTable {
    rows: BTreeMap<i64, Record>,
    audit: Vec<AuditEntry>,
    last_audit_id: i64,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    kinds: HashMap<&'static str, KindTable>,
}

impl Tables {
    fn table(&self, kind: &EntityKind) -> Option<&KindTable> {
        self.kinds.get(kind.name)
    }

    fn table_mut(&mut self, kind: &'static EntityKind) -> &mut KindTable {
        self.kinds.entry(kind.name).or_default()
    }
}

/// Switches for simulating backend failures in tests
#[derive(Debug, Default)]
struct Faults {
    audit_writes: AtomicBool,
    insert_ids: AtomicBool,
}

/// Id sequences live outside the transactional state, like PostgreSQL
/// sequences: an id handed out by a rolled-back insert is never reused.
#[derive(Debug, Default)]
struct Sequences {
    last_ids: std::sync::Mutex<HashMap<&'static str, i64>>,
}

impl Sequences {
    fn next(&self, kind: &'static EntityKind) -> i64 {
        let mut last_ids = self.last_ids.lock().unwrap_or_else(|e| e.into_inner());
        let last = last_ids.entry(kind.name).or_insert(0);
        *last += 1;
        *last
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    sequences: Arc<Sequences>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit insert fail with a backend error
    pub fn fail_audit_writes(&self, fail: bool) {
        self.faults.audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Make entity inserts succeed without returning an identifier
    pub fn drop_insert_ids(&self, drop: bool) {
        self.faults.insert_ids.store(drop, Ordering::SeqCst);
    }

    /// Number of committed rows in the kind's entity table
    pub async fn row_count(&self, kind: &EntityKind) -> usize {
        self.tables.lock().await.table(kind).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Number of committed rows in the kind's audit table
    pub async fn audit_count(&self, kind: &EntityKind) -> usize {
        self.tables.lock().await.table(kind).map(|t| t.audit.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn select_records(&self, kind: &'static EntityKind, active_only: bool) -> Result<Vec<Record>, DatabaseError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .table(kind)
            .map(|t| t.rows.values().filter(|r| !active_only || r.estado).cloned().collect())
            .unwrap_or_default())
    }

    async fn select_record(&self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError> {
        let tables = self.tables.lock().await;
        Ok(tables.table(kind).and_then(|t| t.rows.get(&id)).cloned())
    }

    async fn select_audit(&self, kind: &'static EntityKind) -> Result<Vec<AuditEntry>, DatabaseError> {
        let tables = self.tables.lock().await;
        Ok(tables.table(kind).map(|t| t.audit.clone()).unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, DatabaseError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            sequences: self.sequences.clone(),
            faults: self.faults.clone(),
        }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    sequences: Arc<Sequences>,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_record(&mut self, kind: &'static EntityKind, id: i64) -> Result<Option<Record>, DatabaseError> {
        Ok(self.staged.table(kind).and_then(|t| t.rows.get(&id)).cloned())
    }

    async fn insert_record(&mut self, kind: &'static EntityKind, fields: &Fields) -> Result<Option<i64>, DatabaseError> {
        let id = self.sequences.next(kind);
        self.staged.table_mut(kind).rows.insert(id, Record { id, estado: true, fields: fields.clone() });

        if self.faults.insert_ids.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(id))
    }

    async fn update_record(&mut self, kind: &'static EntityKind, record: &Record) -> Result<u64, DatabaseError> {
        match self.staged.table_mut(kind).rows.get_mut(&record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_state(&mut self, kind: &'static EntityKind, id: i64, estado: bool) -> Result<u64, DatabaseError> {
        match self.staged.table_mut(kind).rows.get_mut(&id) {
            Some(row) => {
                row.estado = estado;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_audit(&mut self, kind: &'static EntityKind, entry: &AuditEntry) -> Result<(), DatabaseError> {
        if self.faults.audit_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError(format!("insert into {} rejected", kind.audit_table)));
        }

        let table = self.staged.table_mut(kind);
        if !table.rows.contains_key(&entry.entity_id) {
            return Err(DatabaseError::QueryError(format!(
                "{} references missing {} {}",
                kind.audit_table, kind.id_column, entry.entity_id
            )));
        }
        table.last_audit_id += 1;
        let mut stored = entry.clone();
        stored.audit_id = Some(table.last_audit_id);
        table.audit.push(stored);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTx { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }
}
