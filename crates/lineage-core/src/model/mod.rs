//! Tipos del modelo de linaje.

mod audit;
mod context;
mod record;

pub use audit::{AccessInfo, AuditAction, AuditLogEntry};
pub use context::{EventType, PipelineContext, PipelineEvent};
pub use record::{LineageRecord, NewLineageRecord, PipelineLogsSummary};
