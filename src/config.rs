//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y las traduce a la configuración de
//! captura del core más los parámetros opcionales de base de datos.
use std::env;

use chrono::Duration;
use dotenvy::dotenv;
use lineage_core::constants::DEFAULT_MAX_LINEAGE_BYTES;
use lineage_core::CaptureConfig;
use lineage_persistence::config::{DbConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS};
use once_cell::sync::Lazy;

use crate::errors::AppError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// TTL por defecto de contextos huérfanos (1h).
pub const DEFAULT_CONTEXT_TTL_SECS: i64 = 3600;

/// Configuración global de la aplicación.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    /// Edad a partir de la cual un contexto no finalizado se considera huérfano.
    pub context_ttl: Duration,
    /// Presente sólo si `DATABASE_URL` está definido.
    pub database: Option<DbConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables inyectable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
        where F: Fn(&str) -> Option<String>
    {
        let max_lineage_bytes = parse_or("LINEAGE_MAX_BYTES", &lookup, DEFAULT_MAX_LINEAGE_BYTES)?;
        if max_lineage_bytes == 0 {
            return Err(AppError::Config("LINEAGE_MAX_BYTES debe ser > 0".into()));
        }
        let enabled = match lookup("LINEAGE_CAPTURE_ENABLED") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| AppError::Config(format!("LINEAGE_CAPTURE_ENABLED inválido: {raw}")))?,
            None => true,
        };
        let ttl_secs: i64 = parse_or("LINEAGE_CONTEXT_TTL_SECS", &lookup, DEFAULT_CONTEXT_TTL_SECS)?;
        let database = match lookup("DATABASE_URL") {
            Some(url) => Some(DbConfig { url,
                                         min_connections: parse_or("DATABASE_MIN_CONNECTIONS", &lookup, DEFAULT_MIN_CONNECTIONS)?,
                                         max_connections: parse_or("DATABASE_MAX_CONNECTIONS", &lookup, DEFAULT_MAX_CONNECTIONS)? }),
            None => None,
        };
        Ok(Self { capture: CaptureConfig { max_lineage_bytes, enabled },
                  context_ttl: Duration::seconds(ttl_secs),
                  database })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, AppError>
    where T: std::str::FromStr,
          F: Fn(&str) -> Option<String>
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| AppError::Config(format!("{key} inválido: {raw}"))),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
