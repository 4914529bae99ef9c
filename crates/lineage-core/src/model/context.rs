//! Contexto transitorio de un run de pipeline en vuelo (no persistido).
//!
//! Ciclo de vida: lo crea `start_pipeline`, lo mutan `log_event` /
//! `add_raw_input` y lo consume `finish_pipeline`.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Info,
    Step,
    Warning,
    Error,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub run_id: Uuid,
    pub lead_id: String,
    pub template_version: String,
    pub start_time: DateTime<Utc>,
    pub events: Vec<PipelineEvent>, // orden de append
    pub raw_inputs: IndexMap<String, Value>,
}

impl PipelineContext {
    pub fn new(run_id: Uuid, lead_id: String, template_version: String) -> Self {
        Self { run_id,
               lead_id,
               template_version,
               start_time: Utc::now(),
               events: Vec::new(),
               raw_inputs: IndexMap::new() }
    }

    pub fn push_event(&mut self, event_type: EventType, message: impl Into<String>, data: Option<Value>) {
        self.events.push(PipelineEvent { timestamp: Utc::now(),
                                         event_type,
                                         message: message.into(),
                                         data });
    }

    pub fn count_of(&self, event_type: EventType) -> usize {
        self.events.iter().filter(|e| e.event_type == event_type).count()
    }
}
