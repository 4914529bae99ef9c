//! Demo de punta a punta: un run exitoso, uno fallido y uno con inputs
//! enormes (truncado), seguido de lecturas auditadas.
//!
//! Backend: memoria por defecto; Postgres con `--features pg_demo` y
//! `DATABASE_URL` definido.
use std::sync::Arc;

use indexmap::IndexMap;
use lineage_core::model::{AccessInfo, EventType};
use lineage_core::{InMemoryLineageStore, LineageStore, SearchQuery};
use lineage_persistence::{build_pool, PgLineageStore, PoolProvider};
use log::info;
use report_lineage::{AppConfig, AppError, LineageService};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn build_store(cfg: &AppConfig) -> Result<Arc<dyn LineageStore>, AppError> {
    match &cfg.database {
        Some(db) if cfg!(feature = "pg_demo") => {
            let pool = build_pool(&db.url, db.min_connections, db.max_connections)?;
            info!("demo backend=postgres");
            Ok(Arc::new(PgLineageStore::new(PoolProvider { pool })))
        }
        _ => {
            info!("demo backend=memory");
            Ok(Arc::new(InMemoryLineageStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cfg = AppConfig::from_env()?;
    let service = LineageService::new(build_store(&cfg)?, cfg.capture.clone());
    let _sweeper = service.spawn_sweeper(cfg.context_ttl, std::time::Duration::from_secs(60));

    // Run 1: éxito con inputs modestos
    let mut inputs = IndexMap::new();
    inputs.insert("lead".to_string(), json!({ "company": "ACME", "country": "MX" }));
    let ok_run = service.start_pipeline("lead-001", "tpl-v1", Some(inputs));
    service.log_event(ok_run, EventType::Step, "lead enriched", None);
    service.log_event(ok_run, EventType::Step, "report rendered", Some(json!({ "pages": 4 })));
    let ok_report = Uuid::new_v4();
    let stored = service.capture_on_completion(ok_report, ok_run, true, None).await;
    println!("run ok: stored={stored}");

    // Run 2: falla con diagnóstico
    let failed_run = service.start_pipeline("lead-002", "tpl-v1", None);
    service.log_event(failed_run, EventType::Warning, "upstream slow", Some(json!({ "latency_ms": 4200 })));
    let failed_report = Uuid::new_v4();
    let stored = service.capture_on_completion(failed_report, failed_run, false, Some(json!({ "code": "RENDER_TIMEOUT" }))).await;
    println!("run failed: stored={stored}");

    // Run 3: log largo + input enorme, fuerza truncado
    let big_run = service.start_pipeline("lead-003", "tpl-v2", None);
    for n in 0..5_000 {
        service.log_event(big_run, EventType::Info, &format!("Event {n}"), None);
    }
    service.add_raw_input(big_run, "scraped_html", json!("<div>".repeat(600_000)));
    let big_report = Uuid::new_v4();
    let stored = service.capture_on_completion(big_report, big_run, true, None).await;
    println!("run big: stored={stored}");

    // Doble captura del mismo run: no-op
    let again = service.capture_on_completion(ok_report, ok_run, true, None).await;
    println!("double capture: stored={again}");

    let reader = service.reader();
    let access = AccessInfo { user_id: Some("demo".into()), ip_address: Some("127.0.0.1".into()), user_agent: Some("lineage-demo".into()) };
    for report in [ok_report, failed_report, big_report] {
        if let Some(record) = reader.view(report, &access)? {
            println!("report={report} lineage={} bytes={} ratio={}% events={} success={} accesses={}",
                     record.id,
                     record.raw_size_bytes,
                     record.compression_ratio,
                     record.pipeline_logs_summary.total_events,
                     record.pipeline_logs_summary.success,
                     record.access_count);
            if let Some(download) = reader.download(record.id, &access)? {
                println!("  download {} ({}, {} bytes)", download.filename, download.media_type, download.bytes.len());
            }
        }
    }
    if let Some(payload) = reader.view_logs(big_report, &access)? {
        println!("big run truncated: logs={} raw_inputs={}",
                 payload["pipeline_logs_truncated"],
                 payload["raw_inputs_truncated"]);
    }

    let recent = reader.search(&SearchQuery { limit: 10, ..SearchQuery::default() })?;
    println!("search: {} records (newest first)", recent.len());
    Ok(())
}
