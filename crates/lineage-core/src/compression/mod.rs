//! Compresor acotado: registro JSON arbitrario → blob gzip `<= max_bytes`.
//!
//! Algoritmo:
//! 1. Serializa el registro en forma compacta (sin espacios). Como
//!    `serde_json::Map` ordena las claves, la serialización es determinista.
//! 2. Comprime con gzip (nivel balanceado).
//! 3. Si cabe en el presupuesto, devuelve blob + ratio.
//! 4. Si no, aplica truncado por prioridad (`truncation::truncate`) y
//!    reintenta. Cada reintento debe reducir estrictamente el tamaño
//!    serializado; tras `MAX_TRUNCATION_ATTEMPTS` (o sin progreso) se usa la
//!    escalera de payloads mínimos (`truncation::fallback_ladder`).
//!
//! Garantía: `bytes.len() <= max_bytes` en todo retorno `Ok`. El último
//! escalón es el blob vacío.

mod truncation;

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde_json::Value;

use crate::constants::{GZIP_LEVEL, MAX_TRUNCATION_ATTEMPTS};
use crate::errors::LineageError;

pub use truncation::{fallback_ladder, truncate};

/// Resultado de `compress`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedBlob {
    pub bytes: Vec<u8>,
    /// Porcentaje de reducción respecto del registro original serializado.
    pub ratio: f64,
    /// Bytes del registro original serializado (antes de truncar).
    pub original_size: usize,
    /// Pasadas de truncado aplicadas (0 = sin pérdida).
    pub truncation_passes: usize,
    /// Se recurrió a la escalera de payloads mínimos.
    pub forced: bool,
}

impl CompressedBlob {
    fn new(bytes: Vec<u8>, original_size: usize, truncation_passes: usize, forced: bool) -> Self {
        let ratio = compression_ratio(original_size, bytes.len());
        Self { bytes, ratio, original_size, truncation_passes, forced }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_lossless(&self) -> bool {
        self.truncation_passes == 0 && !self.forced
    }
}

/// Porcentaje de reducción redondeado a 2 decimales y acotado a `[0, 100]`.
pub fn compression_ratio(original_size: usize, compressed_size: usize) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let raw = (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0;
    ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

/// Comprime `record` garantizando `len(blob) <= max_bytes`.
pub fn compress(record: &Value, max_bytes: usize) -> Result<CompressedBlob, LineageError> {
    let mut serialized = serde_json::to_vec(record)?;
    let original_size = serialized.len();
    let mut working = record.clone();
    let mut passes = 0;

    for pass in 0..=MAX_TRUNCATION_ATTEMPTS {
        let bytes = gzip(&serialized)?;
        if bytes.len() <= max_bytes {
            debug!("compress:fit pass={pass} original={original_size} compressed={} budget={max_bytes}", bytes.len());
            return Ok(CompressedBlob::new(bytes, original_size, pass, false));
        }
        if pass == MAX_TRUNCATION_ATTEMPTS {
            break;
        }
        let reduced = truncate(&working);
        let reduced_bytes = serde_json::to_vec(&reduced)?;
        if reduced_bytes.len() >= serialized.len() {
            debug!("compress:no-progress pass={pass} size={}", serialized.len());
            break;
        }
        debug!("compress:truncated pass={pass} from={} to={}", serialized.len(), reduced_bytes.len());
        working = reduced;
        serialized = reduced_bytes;
        passes = pass + 1;
    }

    warn!("compress:forced truncation original={original_size} passes={passes} budget={max_bytes}");
    for candidate in fallback_ladder(record) {
        let bytes = gzip(&serde_json::to_vec(&candidate)?)?;
        if bytes.len() <= max_bytes {
            return Ok(CompressedBlob::new(bytes, original_size, passes, true));
        }
    }
    warn!("compress:budget below minimal payload budget={max_bytes}; emitting empty blob");
    Ok(CompressedBlob::new(Vec::new(), original_size, passes, true))
}

/// Decodifica un blob producido por `compress`. Un blob vacío es `null`.
pub fn decompress(blob: &[u8]) -> Result<Value, LineageError> {
    if blob.is_empty() {
        return Ok(Value::Null);
    }
    let mut decoder = GzDecoder::new(blob);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(serde_json::from_slice(&out)?)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, LineageError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::new(GZIP_LEVEL));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
