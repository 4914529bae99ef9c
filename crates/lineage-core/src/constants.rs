//! Constantes de captura y truncado.
//!
//! Los umbrales de truncado forman parte del contrato observable: un cambio
//! altera qué campos sobreviven dentro del blob persistido.

/// Presupuesto por defecto del blob comprimido (2 MiB).
pub const DEFAULT_MAX_LINEAGE_BYTES: usize = 2 * 1024 * 1024;

/// Nivel de compresión gzip (balance velocidad/ratio).
pub const GZIP_LEVEL: u32 = 6;

/// Reintentos máximos de truncado antes de caer al payload mínimo.
pub const MAX_TRUNCATION_ATTEMPTS: usize = 5;

/// Por encima de este número de entradas el log se recorta a cabeza + cola.
pub const LOG_TRUNCATION_THRESHOLD: usize = 200;
/// Entradas conservadas al inicio del log.
pub const LOG_HEAD_KEEP: usize = 100;
/// Entradas conservadas al final del log.
pub const LOG_TAIL_KEEP: usize = 100;

/// Strings de `raw_inputs` por debajo de este largo (chars) se conservan.
pub const SAMPLE_MAX_STRING_CHARS: usize = 100;
/// Arrays de `raw_inputs` con menos elementos que esto se conservan.
pub const SAMPLE_MAX_ARRAY_LEN: usize = 10;
/// Objetos de `raw_inputs` cuya forma serializada no supera esto se conservan.
pub const SAMPLE_MAX_OBJECT_BYTES: usize = 500;

/// Campos genéricos cuyo tamaño supera este umbral se descartan con marcador.
pub const LARGE_FIELD_BYTES: usize = 1000;

/// Campos que nunca se truncan (identidad y tiempos del run).
pub const ESSENTIAL_FIELDS: [&str; 5] = ["lead_id", "pipeline_run_id", "template_version_id", "pipeline_start_time", "pipeline_end_time"];

/// Media type del blob descargable.
pub const BLOB_MEDIA_TYPE: &str = "application/gzip";
