//! Contrato de persistencia de linaje y backend en memoria.

mod memory;

use chrono::{DateTime, Utc};
use log::warn;
use uuid::Uuid;

use crate::errors::LineageError;
use crate::model::{AccessInfo, AuditAction, AuditLogEntry, LineageRecord, NewLineageRecord};

pub use memory::InMemoryLineageStore;

/// Filtros conjuntivos de búsqueda; fechas inclusivas sobre `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub lead_id: Option<String>,
    pub pipeline_run_id: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self { lead_id: None, pipeline_run_id: None, created_after: None, created_before: None, limit: 50 }
    }
}

impl SearchQuery {
    pub fn matches(&self, record: &LineageRecord) -> bool {
        self.lead_id.as_ref().map_or(true, |lead| &record.lead_id == lead)
        && self.pipeline_run_id.map_or(true, |run| record.pipeline_run_id == run)
        && self.created_after.map_or(true, |after| record.created_at >= after)
        && self.created_before.map_or(true, |before| record.created_at <= before)
    }
}

/// Almacenamiento durable de registros de linaje y su audit trail.
///
/// Contrato:
/// - `insert` falla con `DuplicateReportGeneration` si ya existe registro para
///   ese `report_generation_id`; el store nunca queda con dos.
/// - `record_access` agrega un `AuditLogEntry` e incrementa `access_count` /
///   fija `last_accessed_at` de forma atómica. `Ok(None)` si el id no existe.
/// - Los errores de E/S se reportan como `StorageUnavailable`.
pub trait LineageStore: Send + Sync {
    fn insert(&self, record: NewLineageRecord) -> Result<LineageRecord, LineageError>;
    fn get(&self, lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError>;
    fn get_by_report(&self, report_generation_id: Uuid) -> Result<Option<LineageRecord>, LineageError>;
    /// Más recientes primero.
    fn search(&self, query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError>;
    fn record_access(&self, lineage_id: Uuid, action: AuditAction, access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError>;
    /// Audit trail de un registro, del más antiguo al más reciente.
    fn audit_trail(&self, lineage_id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError>;

    /// Variante fire-and-forget: los errores se registran y se devuelven como `None`.
    fn try_record_access(&self, lineage_id: Uuid, action: AuditAction, access: &AccessInfo) -> Option<AuditLogEntry> {
        match self.record_access(lineage_id, action, access) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("record_access failed lineage_id={lineage_id} action={action} err={e}");
                None
            }
        }
    }
}

impl<S: LineageStore + ?Sized> LineageStore for std::sync::Arc<S> {
    fn insert(&self, record: NewLineageRecord) -> Result<LineageRecord, LineageError> {
        (**self).insert(record)
    }
    fn get(&self, lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        (**self).get(lineage_id)
    }
    fn get_by_report(&self, report_generation_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        (**self).get_by_report(report_generation_id)
    }
    fn search(&self, query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        (**self).search(query)
    }
    fn record_access(&self, lineage_id: Uuid, action: AuditAction, access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError> {
        (**self).record_access(lineage_id, action, access)
    }
    fn audit_trail(&self, lineage_id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        (**self).audit_trail(lineage_id)
    }
}
