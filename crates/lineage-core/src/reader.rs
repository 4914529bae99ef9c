//! Camino de lectura para colaboradores (HTTP/CLI).
//!
//! Cada lectura puntual registra un acceso en el audit trail (best-effort:
//! un fallo al auditar no impide la lectura). La búsqueda es un listado y no
//! cuenta como acceso a ningún registro.
use serde_json::Value;
use uuid::Uuid;

use crate::compression::decompress;
use crate::constants::BLOB_MEDIA_TYPE;
use crate::errors::LineageError;
use crate::model::{AccessInfo, AuditAction, AuditLogEntry, LineageRecord};
use crate::store::{LineageStore, SearchQuery};

/// Blob listo para servir como descarga.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobDownload {
    pub lineage_id: Uuid,
    pub filename: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Nombre de archivo convencional del blob descargado.
pub fn blob_filename(lineage_id: Uuid) -> String {
    format!("lineage_{lineage_id}_raw_inputs.json.gz")
}

pub struct LineageReader<S: LineageStore> {
    store: S,
}

impl<S: LineageStore> LineageReader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Metadatos del linaje de un reporte (registra `view`).
    pub fn view(&self, report_generation_id: Uuid, access: &AccessInfo) -> Result<Option<LineageRecord>, LineageError> {
        let Some(record) = self.store.get_by_report(report_generation_id)? else {
            return Ok(None);
        };
        let entry = self.store.try_record_access(record.id, AuditAction::View, access);
        Ok(Some(with_access(record, entry)))
    }

    /// Payload descomprimido del linaje de un reporte (registra `view_logs`).
    pub fn view_logs(&self, report_generation_id: Uuid, access: &AccessInfo) -> Result<Option<Value>, LineageError> {
        let Some(record) = self.store.get_by_report(report_generation_id)? else {
            return Ok(None);
        };
        let payload = decompress(&record.compressed_blob)?;
        self.store.try_record_access(record.id, AuditAction::ViewLogs, access);
        Ok(Some(payload))
    }

    /// Blob comprimido tal cual fue persistido (registra `download`).
    pub fn download(&self, lineage_id: Uuid, access: &AccessInfo) -> Result<Option<BlobDownload>, LineageError> {
        let Some(record) = self.store.get(lineage_id)? else {
            return Ok(None);
        };
        self.store.try_record_access(record.id, AuditAction::Download, access);
        Ok(Some(BlobDownload { lineage_id: record.id,
                               filename: blob_filename(record.id),
                               media_type: BLOB_MEDIA_TYPE,
                               bytes: record.compressed_blob }))
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        self.store.search(query)
    }

    pub fn audit_trail(&self, lineage_id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        self.store.audit_trail(lineage_id)
    }
}

fn with_access(mut record: LineageRecord, entry: Option<AuditLogEntry>) -> LineageRecord {
    if let Some(entry) = entry {
        record.access_count += 1;
        record.last_accessed_at = Some(entry.accessed_at);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_follows_convention() {
        let id = Uuid::nil();
        assert_eq!(blob_filename(id), "lineage_00000000-0000-0000-0000-000000000000_raw_inputs.json.gz");
    }
}
