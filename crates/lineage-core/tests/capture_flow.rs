use std::sync::Arc;

use lineage_core::compression::decompress;
use lineage_core::errors::LineageError;
use lineage_core::model::{AccessInfo, AuditAction, AuditLogEntry, EventType, LineageRecord, NewLineageRecord};
use lineage_core::{CaptureConfig, CaptureOrchestrator, InMemoryLineageStore, LineageReader, LineageStore, SearchQuery};
use serde_json::json;
use uuid::Uuid;

// Store que simula storage caído.
struct FailingStore;

impl LineageStore for FailingStore {
    fn insert(&self, _record: NewLineageRecord) -> Result<LineageRecord, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
    fn get(&self, _lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
    fn get_by_report(&self, _id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
    fn search(&self, _query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
    fn record_access(&self, _id: Uuid, _action: AuditAction, _access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
    fn audit_trail(&self, _id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        Err(LineageError::StorageUnavailable("connection refused".into()))
    }
}

// Store cuyo insert entra en pánico (implementación defectuosa de terceros).
struct PanickingStore;

impl LineageStore for PanickingStore {
    fn insert(&self, _record: NewLineageRecord) -> Result<LineageRecord, LineageError> {
        panic!("driver exploded")
    }
    fn get(&self, _lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        Ok(None)
    }
    fn get_by_report(&self, _id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        Ok(None)
    }
    fn search(&self, _query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        Ok(vec![])
    }
    fn record_access(&self, _id: Uuid, _action: AuditAction, _access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError> {
        Ok(None)
    }
    fn audit_trail(&self, _id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        Ok(vec![])
    }
}

fn orchestrator() -> CaptureOrchestrator<Arc<InMemoryLineageStore>> {
    CaptureOrchestrator::new(Arc::new(InMemoryLineageStore::new()), CaptureConfig::default())
}

#[test]
fn capture_counts_logged_and_synthetic_events() {
    let orch = orchestrator();
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    orch.log_event(run_id, EventType::Step, "lead loaded", None);
    orch.log_event(run_id, EventType::Step, "template rendered", Some(json!({ "pages": 3 })));
    let report_id = Uuid::new_v4();

    assert!(orch.capture_on_completion(report_id, run_id, true, None));

    let record = orch.store().get_by_report(report_id).unwrap().expect("lineage persisted");
    assert_eq!(record.pipeline_logs_summary.total_events, 3);
    assert_eq!(record.pipeline_logs_summary.error_count, 0);
    assert!(record.pipeline_logs_summary.success);
    assert_eq!(record.lead_id, "lead-1");
    assert_eq!(record.pipeline_run_id, run_id);
    assert_eq!(record.template_version_id, "v1");
    assert!(record.pipeline_end_time >= record.pipeline_start_time);
    assert_eq!(record.raw_size_bytes, record.compressed_blob.len() as i64);
    assert!((0.0..=100.0).contains(&record.compression_ratio));

    let payload = decompress(&record.compressed_blob).unwrap();
    let events = payload["pipeline_logs"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2]["message"], json!("Pipeline completed successfully"));
    assert_eq!(events[2]["type"], json!("complete"));
    assert_eq!(payload["report_generation_id"], json!(report_id));
}

#[test]
fn double_capture_of_same_run_returns_false() {
    let orch = orchestrator();
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    let report_id = Uuid::new_v4();
    assert!(orch.capture_on_completion(report_id, run_id, true, None));
    assert!(!orch.capture_on_completion(report_id, run_id, true, None));
    assert_eq!(orch.store().len(), Ok(1));
}

#[test]
fn second_run_for_same_report_is_rejected() {
    let orch = orchestrator();
    let report_id = Uuid::new_v4();
    let first = orch.start_pipeline("lead-1", "v1", None);
    let second = orch.start_pipeline("lead-1", "v2", None);
    assert!(orch.capture_on_completion(report_id, first, true, None));
    assert!(!orch.capture_on_completion(report_id, second, true, None));
    assert_eq!(orch.store().get_by_report(report_id).unwrap().unwrap().pipeline_run_id, first);
    // El contexto de la segunda corrida se consumió igualmente.
    assert!(!orch.tracker().is_active(second));
}

#[test]
fn failing_store_never_propagates() {
    let orch = CaptureOrchestrator::new(FailingStore, CaptureConfig::default());
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    assert!(!orch.capture_on_completion(Uuid::new_v4(), run_id, true, None));
    assert!(orch.store().try_record_access(Uuid::new_v4(), AuditAction::View, &AccessInfo::default()).is_none());
}

#[test]
fn panicking_store_is_contained() {
    let orch = CaptureOrchestrator::new(PanickingStore, CaptureConfig::default());
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    assert!(!orch.capture_on_completion(Uuid::new_v4(), run_id, true, None));
}

#[test]
fn disabled_capture_consumes_context_without_persisting() {
    let store = Arc::new(InMemoryLineageStore::new());
    let orch = CaptureOrchestrator::new(Arc::clone(&store), CaptureConfig::disabled());
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    assert!(!orch.capture_on_completion(Uuid::new_v4(), run_id, true, None));
    assert_eq!(store.is_empty(), Ok(true));
    assert_eq!(orch.tracker().active_runs(), 0);
}

#[test]
fn failed_run_keeps_error_data() {
    let orch = orchestrator();
    let run_id = orch.start_pipeline("lead-9", "v3", None);
    orch.log_event(run_id, EventType::Warning, "slow upstream", None);
    orch.add_raw_input(run_id, "lead", json!({ "company": "ACME" }));
    let report_id = Uuid::new_v4();
    let error = json!({ "code": "RENDER_TIMEOUT", "step": "render" });

    assert!(orch.capture_on_completion(report_id, run_id, false, Some(error.clone())));

    let record = orch.store().get_by_report(report_id).unwrap().unwrap();
    assert!(!record.pipeline_logs_summary.success);
    assert_eq!(record.pipeline_logs_summary.error_count, 1);
    assert_eq!(record.pipeline_logs_summary.warning_count, 1);
    let payload = decompress(&record.compressed_blob).unwrap();
    assert_eq!(payload["error"], error);
    assert_eq!(payload["raw_inputs"]["lead"], json!({ "company": "ACME" }));
    let last = payload["pipeline_logs"]["events"].as_array().unwrap().last().cloned().unwrap();
    assert_eq!(last["message"], json!("Pipeline failed"));
    assert_eq!(last["data"], error);
}

#[test]
fn small_budget_still_persists_truncated_lineage() {
    let store = Arc::new(InMemoryLineageStore::new());
    let orch = CaptureOrchestrator::new(Arc::clone(&store), CaptureConfig::default().with_max_bytes(4096));
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    for n in 0..1000 {
        orch.log_event(run_id, EventType::Info, &format!("step {n} done with checksum {:x}", n * 7919), None);
    }
    orch.add_raw_input(run_id, "document", json!("d".repeat(10_000)));
    let report_id = Uuid::new_v4();
    assert!(orch.capture_on_completion(report_id, run_id, true, None));

    let record = store.get_by_report(report_id).unwrap().unwrap();
    assert!(record.compressed_blob.len() <= 4096);
    assert_eq!(record.pipeline_logs_summary.total_events, 1001);
    let payload = decompress(&record.compressed_blob).unwrap();
    assert_eq!(payload["lead_id"], json!("lead-1"));
    assert_eq!(payload["pipeline_run_id"], json!(run_id));
}

#[test]
fn reader_records_every_access() {
    let orch = orchestrator();
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    let report_id = Uuid::new_v4();
    assert!(orch.capture_on_completion(report_id, run_id, true, None));

    let reader = LineageReader::new(Arc::clone(orch.store()));
    let access = AccessInfo { user_id: Some("analyst".into()), ip_address: Some("10.0.0.7".into()), user_agent: None };
    let viewed = reader.view(report_id, &access).unwrap().expect("record");
    assert_eq!(viewed.access_count, 1);

    let download = reader.download(viewed.id, &access).unwrap().expect("blob");
    assert_eq!(download.media_type, "application/gzip");
    assert_eq!(download.filename, format!("lineage_{}_raw_inputs.json.gz", viewed.id));
    assert!(!download.bytes.is_empty());

    let payload = reader.view_logs(report_id, &access).unwrap().expect("payload");
    assert_eq!(payload["lead_id"], json!("lead-1"));

    let trail = reader.audit_trail(viewed.id).unwrap();
    assert_eq!(trail.iter().map(|e| e.action).collect::<Vec<_>>(), vec![AuditAction::View, AuditAction::Download, AuditAction::ViewLogs]);
    assert!(trail.iter().all(|e| e.user_id.as_deref() == Some("analyst")));

    let stored = orch.store().get(viewed.id).unwrap().unwrap();
    assert_eq!(stored.access_count, 3);
    assert_eq!(stored.last_accessed_at, trail.last().map(|e| e.accessed_at));

    assert!(reader.view(Uuid::new_v4(), &access).unwrap().is_none());
}

#[test]
fn view_then_download_counts_two() {
    let orch = orchestrator();
    let run_id = orch.start_pipeline("lead-1", "v1", None);
    let report_id = Uuid::new_v4();
    assert!(orch.capture_on_completion(report_id, run_id, true, None));
    let lineage_id = orch.store().get_by_report(report_id).unwrap().unwrap().id;

    orch.store().record_access(lineage_id, AuditAction::View, &AccessInfo::default()).unwrap();
    orch.store().record_access(lineage_id, AuditAction::Download, &AccessInfo::default()).unwrap();
    assert_eq!(orch.store().get(lineage_id).unwrap().unwrap().access_count, 2);
}
