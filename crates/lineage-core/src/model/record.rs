//! `LineageRecord`: snapshot persistido y acotado de un run de pipeline.
//!
//! Invariantes:
//! - Como máximo un registro por `report_generation_id` (lo impone el store).
//! - `pipeline_end_time >= pipeline_start_time`.
//! - `raw_size_bytes == compressed_blob.len()`.
//! - `access_count` y `last_accessed_at` sólo cambian vía `record_access`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proyección ligera (sin comprimir) del log del run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLogsSummary {
    pub total_events: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub duration_seconds: f64,
    pub success: bool,
}

/// Registro a insertar; `id` y `created_at` los asigna el store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineageRecord {
    pub report_generation_id: Uuid,
    pub lead_id: String,
    pub pipeline_run_id: Uuid,
    pub template_version_id: String,
    pub pipeline_start_time: DateTime<Utc>,
    pub pipeline_end_time: DateTime<Utc>,
    #[serde(skip)]
    pub compressed_blob: Vec<u8>,
    pub raw_size_bytes: i64,
    pub compression_ratio: f64,
    pub pipeline_logs_summary: PipelineLogsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub id: Uuid,
    pub report_generation_id: Uuid,
    pub lead_id: String,
    pub pipeline_run_id: Uuid,
    pub template_version_id: String,
    pub pipeline_start_time: DateTime<Utc>,
    pub pipeline_end_time: DateTime<Utc>,
    // El blob no viaja en la vista JSON; se descarga por separado.
    #[serde(skip)]
    pub compressed_blob: Vec<u8>,
    pub raw_size_bytes: i64,
    pub compression_ratio: f64,
    pub pipeline_logs_summary: PipelineLogsSummary,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: i64,
}

impl LineageRecord {
    /// Materializa un registro nuevo con identidad y bookkeeping iniciales.
    pub fn from_new(new: NewLineageRecord, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self { id,
               report_generation_id: new.report_generation_id,
               lead_id: new.lead_id,
               pipeline_run_id: new.pipeline_run_id,
               template_version_id: new.template_version_id,
               pipeline_start_time: new.pipeline_start_time,
               pipeline_end_time: new.pipeline_end_time,
               compressed_blob: new.compressed_blob,
               raw_size_bytes: new.raw_size_bytes,
               compression_ratio: new.compression_ratio,
               pipeline_logs_summary: new.pipeline_logs_summary,
               created_at,
               last_accessed_at: None,
               access_count: 0 }
    }
}
