//! lineage-core: captura acotada de linaje por ejecución de pipeline.
//!
//! Componentes (de hoja a raíz):
//! - `compression`: serializa, comprime (gzip) y trunca por prioridad hasta
//!   respetar un presupuesto de bytes.
//! - `tracker`: acumulador en memoria de eventos e inputs por `run_id`.
//! - `store`: contrato `LineageStore` + backend en memoria.
//! - `capture`: orquestador "terminar run y persistir linaje" (nunca falla al
//!   llamador).
//! - `reader`: lecturas con registro de acceso (auditoría).
pub mod capture;
pub mod compression;
pub mod config;
pub mod constants;
pub mod errors;
pub mod model;
pub mod reader;
pub mod store;
pub mod tracker;

pub use capture::CaptureOrchestrator;
pub use compression::{compress, decompress, CompressedBlob};
pub use config::CaptureConfig;
pub use errors::LineageError;
pub use model::{AccessInfo, AuditAction, AuditLogEntry, EventType, LineageRecord, NewLineageRecord, PipelineContext, PipelineEvent, PipelineLogsSummary};
pub use reader::{BlobDownload, LineageReader};
pub use store::{InMemoryLineageStore, LineageStore, SearchQuery};
pub use tracker::PipelineTracker;
