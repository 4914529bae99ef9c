//! Configuración consumida por el orquestador de captura.

use crate::constants::DEFAULT_MAX_LINEAGE_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Techo duro del blob comprimido persistido.
    pub max_lineage_bytes: usize,
    /// Si es `false`, la captura no comprime ni persiste.
    pub enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { max_lineage_bytes: DEFAULT_MAX_LINEAGE_BYTES, enabled: true }
    }
}

impl CaptureConfig {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn with_max_bytes(mut self, max_lineage_bytes: usize) -> Self {
        self.max_lineage_bytes = max_lineage_bytes;
        self
    }
}
