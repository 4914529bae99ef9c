//! Orquestador de captura: cierra un run y persiste su linaje.
//!
//! Flujo de `capture_on_completion`:
//! 1. Retira el `PipelineContext` del tracker (si no existe → `false`).
//! 2. Agrega el evento sintético de cierre (éxito o fallo con `error_data`).
//! 3. Arma el registro canónico: identificadores, tiempos, `pipeline_logs`
//!    (`events` + `summary`), `raw_inputs` y `error` si hubo fallo.
//! 4. Comprime bajo `max_lineage_bytes`.
//! 5. Inserta el `LineageRecord` en el store.
//!
//! Invariante: `capture_on_completion` nunca propaga errores ni pánicos al
//! pipeline llamador. La I/O de storage ocurre sobre datos ya retirados del
//! tracker, sin sostener ningún lock compartido con él.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::compression::compress;
use crate::config::CaptureConfig;
use crate::errors::LineageError;
use crate::model::{EventType, LineageRecord, NewLineageRecord, PipelineContext, PipelineLogsSummary};
use crate::store::LineageStore;
use crate::tracker::PipelineTracker;

pub struct CaptureOrchestrator<S: LineageStore> {
    tracker: Arc<PipelineTracker>,
    store: S,
    config: CaptureConfig,
}

impl<S: LineageStore> CaptureOrchestrator<S> {
    pub fn new(store: S, config: CaptureConfig) -> Self {
        Self::with_tracker(Arc::new(PipelineTracker::new()), store, config)
    }

    /// Permite compartir un tracker ya existente (p.ej. entre servicios).
    pub fn with_tracker(tracker: Arc<PipelineTracker>, store: S, config: CaptureConfig) -> Self {
        Self { tracker, store, config }
    }

    pub fn tracker(&self) -> &Arc<PipelineTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn start_pipeline(&self, lead_id: &str, template_version: &str, initial_inputs: Option<IndexMap<String, Value>>) -> Uuid {
        self.tracker.start_pipeline(lead_id, template_version, initial_inputs)
    }

    pub fn log_event(&self, run_id: Uuid, event_type: EventType, message: &str, data: Option<Value>) {
        self.tracker.log_event(run_id, event_type, message, data)
    }

    pub fn add_raw_input(&self, run_id: Uuid, key: &str, value: Value) {
        self.tracker.add_raw_input(run_id, key, value)
    }

    /// Best-effort: `true` sólo si el registro quedó persistido.
    pub fn capture_on_completion(&self, report_generation_id: Uuid, run_id: Uuid, success: bool, error_data: Option<Value>) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.capture(report_generation_id, run_id, success, error_data)));
        match outcome {
            Ok(Ok(record)) => {
                info!("capture:stored report_generation_id={report_generation_id} run_id={run_id} lineage_id={} bytes={} ratio={}",
                      record.id,
                      record.raw_size_bytes,
                      record.compression_ratio);
                true
            }
            Ok(Err(LineageError::UnknownRun(_))) => {
                debug!("capture:skip unknown or finished run_id={run_id}");
                false
            }
            Ok(Err(LineageError::CaptureDisabled)) => {
                debug!("capture:disabled run_id={run_id}");
                false
            }
            Ok(Err(e)) => {
                warn!("capture:failed report_generation_id={report_generation_id} run_id={run_id} err={e}");
                false
            }
            Err(_) => {
                error!("capture:panicked report_generation_id={report_generation_id} run_id={run_id}");
                false
            }
        }
    }

    /// Variante explícita de la captura, con el error tipado.
    pub fn capture(&self, report_generation_id: Uuid, run_id: Uuid, success: bool, error_data: Option<Value>) -> Result<LineageRecord, LineageError> {
        let mut ctx = self.tracker.finish_pipeline(run_id).ok_or(LineageError::UnknownRun(run_id))?;
        if !self.config.enabled {
            return Err(LineageError::CaptureDisabled);
        }

        if success {
            ctx.push_event(EventType::Complete, "Pipeline completed successfully", None);
        } else {
            ctx.push_event(EventType::Error, "Pipeline failed", error_data.clone());
        }
        let end_time = Utc::now().max(ctx.start_time);
        let summary = summarize(&ctx, end_time, success);
        let payload = build_payload(&ctx, report_generation_id, end_time, &summary, if success { None } else { error_data })?;

        let blob = compress(&payload, self.config.max_lineage_bytes)?;
        if !blob.is_lossless() {
            debug!("capture:truncated run_id={run_id} original={} passes={} forced={}", blob.original_size, blob.truncation_passes, blob.forced);
        }
        let raw_size_bytes = blob.len() as i64;
        self.store.insert(NewLineageRecord { report_generation_id,
                                             lead_id: ctx.lead_id,
                                             pipeline_run_id: ctx.run_id,
                                             template_version_id: ctx.template_version,
                                             pipeline_start_time: ctx.start_time,
                                             pipeline_end_time: end_time,
                                             compressed_blob: blob.bytes,
                                             raw_size_bytes,
                                             compression_ratio: blob.ratio,
                                             pipeline_logs_summary: summary })
    }
}

fn summarize(ctx: &PipelineContext, end_time: DateTime<Utc>, success: bool) -> PipelineLogsSummary {
    PipelineLogsSummary { total_events: ctx.events.len(),
                          error_count: ctx.count_of(EventType::Error),
                          warning_count: ctx.count_of(EventType::Warning),
                          duration_seconds: (end_time - ctx.start_time).num_milliseconds() as f64 / 1000.0,
                          success }
}

fn build_payload(ctx: &PipelineContext, report_generation_id: Uuid, end_time: DateTime<Utc>, summary: &PipelineLogsSummary, error: Option<Value>) -> Result<Value, LineageError> {
    let events = serde_json::to_value(&ctx.events)?;
    let raw_inputs = serde_json::to_value(&ctx.raw_inputs)?;
    let summary = serde_json::to_value(summary)?;
    let mut payload = json!({
        "lead_id": ctx.lead_id,
        "pipeline_run_id": ctx.run_id,
        "template_version_id": ctx.template_version,
        "report_generation_id": report_generation_id,
        "pipeline_start_time": ctx.start_time,
        "pipeline_end_time": end_time,
        "pipeline_logs": {
            "events": events,
            "summary": summary,
        },
        "raw_inputs": raw_inputs,
    });
    if let (Some(error), Some(map)) = (error, payload.as_object_mut()) {
        map.insert("error".into(), error);
    }
    Ok(payload)
}
