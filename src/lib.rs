//! Report Lineage
//!
//! Este crate actúa como la librería de aplicación sobre `lineage-core`:
//! - Expone `config` para cargar la configuración desde el entorno (.env).
//! - Expone `errors` con el error agregado de la aplicación.
//! - Expone `service`, la fachada async (tokio) que usan los pipelines de
//!   generación de reportes.

pub mod config;
pub mod errors;
pub mod service;

pub use config::AppConfig;
pub use errors::AppError;
pub use service::LineageService;
