use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::{LineageStore, SearchQuery};
use crate::errors::LineageError;
use crate::model::{AccessInfo, AuditAction, AuditLogEntry, LineageRecord, NewLineageRecord};

#[derive(Default)]
struct State {
    records: HashMap<Uuid, LineageRecord>,
    by_report: HashMap<Uuid, Uuid>,
    audit: Vec<AuditLogEntry>,
}

/// Backend en memoria (tests y demos). Un único mutex hace atómicos
/// `insert` (chequeo de unicidad + alta) y `record_access` (contador + audit).
#[derive(Default)]
pub struct InMemoryLineageStore {
    state: Mutex<State>,
}

impl InMemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cantidad de registros; un mutex envenenado es error, no un store vacío.
    pub fn len(&self) -> Result<usize, LineageError> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, LineageError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LineageError> {
        self.state.lock().map_err(|_| LineageError::StorageUnavailable("in-memory store poisoned".into()))
    }
}

impl LineageStore for InMemoryLineageStore {
    fn insert(&self, record: NewLineageRecord) -> Result<LineageRecord, LineageError> {
        let mut state = self.lock()?;
        if state.by_report.contains_key(&record.report_generation_id) {
            return Err(LineageError::DuplicateReportGeneration(record.report_generation_id));
        }
        let stored = LineageRecord::from_new(record, Uuid::new_v4(), Utc::now());
        state.by_report.insert(stored.report_generation_id, stored.id);
        state.records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn get(&self, lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        Ok(self.lock()?.records.get(&lineage_id).cloned())
    }

    fn get_by_report(&self, report_generation_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        let state = self.lock()?;
        Ok(state.by_report.get(&report_generation_id).and_then(|id| state.records.get(id)).cloned())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        let state = self.lock()?;
        let mut hits: Vec<LineageRecord> = state.records.values().filter(|r| query.matches(r)).cloned().collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        hits.truncate(query.limit);
        Ok(hits)
    }

    fn record_access(&self, lineage_id: Uuid, action: AuditAction, access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let Some(record) = state.records.get_mut(&lineage_id) else {
            return Ok(None);
        };
        record.access_count += 1;
        record.last_accessed_at = Some(now);
        let entry = AuditLogEntry { id: Uuid::new_v4(),
                                    lineage_id,
                                    action,
                                    user_id: access.user_id.clone(),
                                    ip_address: access.ip_address.clone(),
                                    user_agent: access.user_agent.clone(),
                                    accessed_at: now };
        state.audit.push(entry.clone());
        Ok(Some(entry))
    }

    fn audit_trail(&self, lineage_id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        Ok(self.lock()?.audit.iter().filter(|e| e.lineage_id == lineage_id).cloned().collect())
    }
}
