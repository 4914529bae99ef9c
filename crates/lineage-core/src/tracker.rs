//! Tracker de contextos de pipeline en vuelo.
//!
//! Es un arena explícito: el `run_id` es el handle y el tracker es dueño de
//! los `PipelineContext` hasta que `finish_pipeline` los entrega. Se comparte
//! entre hilos (`DashMap`, lock por shard); la mutación de un mismo run se
//! espera de un único dueño lógico.
//!
//! Política ante `run_id` desconocido: no-op silencioso (`log_event`,
//! `add_raw_input`) o `None` (`finish_pipeline`). Un evento tardío que llega
//! después de `finish_pipeline` simplemente se descarta.
use chrono::{Duration, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{EventType, PipelineContext};

#[derive(Debug, Default)]
pub struct PipelineTracker {
    contexts: DashMap<Uuid, PipelineContext>,
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abre un contexto nuevo y devuelve su `run_id`.
    pub fn start_pipeline(&self, lead_id: &str, template_version: &str, initial_inputs: Option<IndexMap<String, Value>>) -> Uuid {
        let run_id = Uuid::new_v4();
        let mut ctx = PipelineContext::new(run_id, lead_id.to_string(), template_version.to_string());
        if let Some(inputs) = initial_inputs {
            ctx.raw_inputs = inputs;
        }
        self.contexts.insert(run_id, ctx);
        debug!("start_pipeline run_id={run_id} lead_id={lead_id} template={template_version}");
        run_id
    }

    pub fn log_event(&self, run_id: Uuid, event_type: EventType, message: &str, data: Option<Value>) {
        match self.contexts.get_mut(&run_id) {
            Some(mut ctx) => ctx.push_event(event_type, message, data),
            None => debug!("log_event: unknown run_id={run_id} (ignored)"),
        }
    }

    /// Inserta o sobrescribe un input con nombre.
    pub fn add_raw_input(&self, run_id: Uuid, key: &str, value: Value) {
        match self.contexts.get_mut(&run_id) {
            Some(mut ctx) => {
                ctx.raw_inputs.insert(key.to_string(), value);
            }
            None => debug!("add_raw_input: unknown run_id={run_id} key={key} (ignored)"),
        }
    }

    /// Retira y entrega el contexto. Una segunda llamada devuelve `None`.
    pub fn finish_pipeline(&self, run_id: Uuid) -> Option<PipelineContext> {
        self.contexts.remove(&run_id).map(|(_, ctx)| ctx)
    }

    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.contexts.contains_key(&run_id)
    }

    pub fn active_runs(&self) -> usize {
        self.contexts.len()
    }

    /// Descarta contextos huérfanos más viejos que `max_age` y devuelve sus ids.
    pub fn sweep_stale(&self, max_age: Duration) -> Vec<Uuid> {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<Uuid> = self.contexts.iter().filter(|entry| entry.start_time < cutoff).map(|entry| *entry.key()).collect();
        // Se retira uno a uno: nunca se sostiene un shard mientras se itera.
        stale.into_iter().filter(|run_id| self.contexts.remove(run_id).is_some()).inspect(|run_id| debug!("sweep_stale: dropped run_id={run_id}")).collect()
    }
}
