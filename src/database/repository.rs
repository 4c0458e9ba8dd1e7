use std::sync::Arc;

use tracing::info;

use crate::database::audit::{AuditEntry, AuditRecorder};
use crate::database::entity::EntityKind;
use crate::database::manager::DatabaseError;
use crate::database::record::{Record, RecordInput};
use crate::database::store::{StoreGateway, StoreTx};
use crate::types::{InactivePolicy, Operation};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} was not persisted: insert returned no identifier")]
    NotPersisted(&'static str),

    #[error("{entity} {id} is already {}", state_label(.estado))]
    StateConflict {
        entity: &'static str,
        id: i64,
        estado: bool,
    },

    #[error("audit write failed for {entity}: {source}")]
    AuditWriteFailure {
        entity: &'static str,
        #[source]
        source: DatabaseError,
    },

    #[error(transparent)]
    Backend(#[from] DatabaseError),
}

fn state_label(estado: &bool) -> &'static str {
    if *estado {
        "active"
    } else {
        "inactive"
    }
}

/// CRUD-with-history over one entity kind.
///
/// Every mutation runs in a single store transaction: the current row is read
/// and locked, the entity table is written, and the audit row is inserted
/// before commit. Any early return drops the transaction, which rolls back.
/// Update, delete and restore report rows affected; 0 means no such id.
#[derive(Clone)]
pub struct EntityRepository {
    kind: &'static EntityKind,
    store: Arc<dyn StoreGateway>,
    recorder: AuditRecorder,
    policy: InactivePolicy,
}

impl EntityRepository {
    pub fn new(kind: &'static EntityKind, store: Arc<dyn StoreGateway>) -> Self {
        Self {
            kind,
            store,
            recorder: AuditRecorder::new(kind),
            policy: InactivePolicy::Permit,
        }
    }

    pub fn with_policy(mut self, policy: InactivePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn list_active(&self) -> Result<Vec<Record>, RepositoryError> {
        Ok(self.store.select_records(self.kind, true).await?)
    }

    /// Administrative view including soft-deleted rows
    pub async fn list_all(&self) -> Result<Vec<Record>, RepositoryError> {
        Ok(self.store.select_records(self.kind, false).await?)
    }

    pub async fn list_audit_trail(&self) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self.store.select_audit(self.kind).await?)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Record>, RepositoryError> {
        Ok(self.store.select_record(self.kind, id).await?)
    }

    /// Insert an active row and its INSERT audit entry; returns the new id
    pub async fn create(&self, input: RecordInput, usuario: &str) -> Result<i64, RepositoryError> {
        let mut tx = self.store.begin().await?;

        let id = tx
            .insert_record(self.kind, &input.fields)
            .await?
            .ok_or(RepositoryError::NotPersisted(self.kind.name))?;

        let created = Record { id, estado: true, fields: input.fields };
        self.audit(tx.as_mut(), Operation::Insert, None, &created, usuario).await?;
        tx.commit().await?;

        info!("{} {} created by {}", self.kind, id, usuario);
        Ok(id)
    }

    /// Overwrite every domain field of `id` (and the state, when the input
    /// carries one), auditing the prior row as read inside the transaction
    pub async fn update(&self, id: i64, input: RecordInput, usuario: &str) -> Result<u64, RepositoryError> {
        let mut tx = self.store.begin().await?;

        let Some(prior) = tx.lock_record(self.kind, id).await? else {
            return Ok(0);
        };
        if self.policy == InactivePolicy::Reject && !prior.estado {
            return Err(self.conflict(&prior));
        }

        let updated = prior.updated_with(&input);
        let affected = tx.update_record(self.kind, &updated).await?;
        if affected == 0 {
            return Ok(0);
        }

        self.audit(tx.as_mut(), Operation::Update, Some(&prior), &updated, usuario).await?;
        tx.commit().await?;

        info!("{} {} updated by {}", self.kind, id, usuario);
        Ok(affected)
    }

    /// Mark `id` inactive. The row and its history stay in place.
    pub async fn soft_delete(&self, id: i64, usuario: &str) -> Result<u64, RepositoryError> {
        self.transition(id, false, Operation::Delete, usuario).await
    }

    /// Mark a soft-deleted `id` active again, audited as an UPDATE
    pub async fn restore(&self, id: i64, usuario: &str) -> Result<u64, RepositoryError> {
        self.transition(id, true, Operation::Update, usuario).await
    }

    /// State-only change: domain fields are copied unchanged into both sides
    /// of the audit row
    async fn transition(
        &self,
        id: i64,
        estado: bool,
        operation: Operation,
        usuario: &str,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.store.begin().await?;

        let Some(prior) = tx.lock_record(self.kind, id).await? else {
            return Ok(0);
        };
        if self.policy == InactivePolicy::Reject && prior.estado == estado {
            return Err(self.conflict(&prior));
        }

        let affected = tx.set_state(self.kind, id, estado).await?;
        if affected == 0 {
            return Ok(0);
        }

        let next = prior.with_state(estado);
        self.audit(tx.as_mut(), operation, Some(&prior), &next, usuario).await?;
        tx.commit().await?;

        info!("{} {} set estado={} by {}", self.kind, id, estado, usuario);
        Ok(affected)
    }

    async fn audit(
        &self,
        tx: &mut dyn StoreTx,
        operation: Operation,
        prior: Option<&Record>,
        new: &Record,
        usuario: &str,
    ) -> Result<AuditEntry, RepositoryError> {
        self.recorder
            .record(tx, operation, prior, new, usuario)
            .await
            .map_err(|source| RepositoryError::AuditWriteFailure { entity: self.kind.name, source })
    }

    fn conflict(&self, row: &Record) -> RepositoryError {
        RepositoryError::StateConflict {
            entity: self.kind.name,
            id: row.id,
            estado: row.estado,
        }
    }
}
