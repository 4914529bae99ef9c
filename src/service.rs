//! Fachada async para hosts tokio.
//!
//! La compresión es CPU-bound: `capture_on_completion` corre el orquestador
//! en el pool bloqueante de tokio para no frenar la contabilidad de otros
//! runs. El resto de operaciones del pipeline son baratas y síncronas.
use std::sync::Arc;

use chrono::Duration;
use indexmap::IndexMap;
use log::{debug, error};
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use lineage_core::model::EventType;
use lineage_core::{CaptureConfig, CaptureOrchestrator, LineageReader, LineageStore};

pub struct LineageService<S: LineageStore + 'static> {
    orchestrator: Arc<CaptureOrchestrator<S>>,
}

impl<S: LineageStore + 'static> Clone for LineageService<S> {
    fn clone(&self) -> Self {
        Self { orchestrator: Arc::clone(&self.orchestrator) }
    }
}

impl<S: LineageStore + 'static> LineageService<S> {
    pub fn new(store: S, config: CaptureConfig) -> Self {
        Self { orchestrator: Arc::new(CaptureOrchestrator::new(store, config)) }
    }

    pub fn orchestrator(&self) -> &Arc<CaptureOrchestrator<S>> {
        &self.orchestrator
    }

    pub fn start_pipeline(&self, lead_id: &str, template_version: &str, initial_inputs: Option<IndexMap<String, Value>>) -> Uuid {
        self.orchestrator.start_pipeline(lead_id, template_version, initial_inputs)
    }

    pub fn log_event(&self, run_id: Uuid, event_type: EventType, message: &str, data: Option<Value>) {
        self.orchestrator.log_event(run_id, event_type, message, data)
    }

    pub fn add_raw_input(&self, run_id: Uuid, key: &str, value: Value) {
        self.orchestrator.add_raw_input(run_id, key, value)
    }

    /// Nunca falla: un error de la tarea bloqueante también es `false`.
    pub async fn capture_on_completion(&self, report_generation_id: Uuid, run_id: Uuid, success: bool, error_data: Option<Value>) -> bool {
        let orchestrator = Arc::clone(&self.orchestrator);
        let task = tokio::task::spawn_blocking(move || orchestrator.capture_on_completion(report_generation_id, run_id, success, error_data));
        match task.await {
            Ok(stored) => stored,
            Err(e) => {
                error!("capture task failed report_generation_id={report_generation_id} run_id={run_id} err={e}");
                false
            }
        }
    }

    /// Lector que comparte el store del orquestador.
    pub fn reader(&self) -> LineageReader<S>
        where S: Clone
    {
        LineageReader::new(self.orchestrator.store().clone())
    }

    /// Barrido periódico de contextos huérfanos (runs nunca finalizados).
    pub fn spawn_sweeper(&self, ttl: Duration, every: std::time::Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self.orchestrator.tracker());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let dropped = tracker.sweep_stale(ttl);
                if !dropped.is_empty() {
                    debug!("sweeper: dropped {} stale contexts (active={})", dropped.len(), tracker.active_runs());
                }
            }
        })
    }
}
