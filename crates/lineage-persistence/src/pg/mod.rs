//! Implementación Postgres (Diesel) de `LineageStore`.
//!
//! Objetivo general del módulo:
//! - Persistir un `LineageRecord` por generación de reporte con paridad 1:1
//!   respecto del backend en memoria del core.
//! - Unicidad de `report_generation_id` delegada al índice UNIQUE: la
//!   violación se traduce a `LineageError::DuplicateReportGeneration`, salvo
//!   que un reintento encuentre la fila ya confirmada del mismo run.
//! - `record_access`: update del contador + insert del audit entry en la MISMA
//!   transacción; `accessed_at` del entry == nuevo `last_accessed_at`.
//! - Manejo básico de errores transitorios: reintento con backoff.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, error, warn};
use serde_json::Value;
use uuid::Uuid;

use lineage_core::model::{AccessInfo, AuditAction, AuditLogEntry, LineageRecord, NewLineageRecord, PipelineLogsSummary};
use lineage_core::{LineageError, LineageStore, SearchQuery};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{lineage_audit_log, pipeline_lineage};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo, se corre automáticamente el set de migraciones pendientes
/// (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simular en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}
impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila mapeada de `pipeline_lineage` (orden de columnas == tabla).
#[derive(Queryable, Debug)]
pub struct LineageRow {
    pub id: Uuid,
    pub report_generation_id: Uuid,
    pub lead_id: String,
    pub pipeline_run_id: Uuid,
    pub template_version_id: String,
    pub pipeline_start_time: DateTime<Utc>,
    pub pipeline_end_time: DateTime<Utc>,
    pub compressed_blob: Vec<u8>,
    pub raw_size_bytes: i64,
    pub compression_ratio: f64,
    pub pipeline_logs_summary: Value,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: i64,
}

/// Estructura para inserción en `pipeline_lineage`; `id` y `created_at` los
/// asigna la base (DEFAULT) y vuelven vía `RETURNING`.
#[derive(Insertable, Debug)]
#[diesel(table_name = pipeline_lineage)]
pub struct NewLineageRow<'a> {
    pub report_generation_id: Uuid,
    pub lead_id: &'a str,
    pub pipeline_run_id: Uuid,
    pub template_version_id: &'a str,
    pub pipeline_start_time: DateTime<Utc>,
    pub pipeline_end_time: DateTime<Utc>,
    pub compressed_blob: &'a [u8],
    pub raw_size_bytes: i64,
    pub compression_ratio: f64,
    pub pipeline_logs_summary: &'a Value,
}

/// Fila mapeada de `lineage_audit_log` (append-only).
#[derive(Queryable, Debug)]
pub struct AuditRow {
    pub id: Uuid,
    pub lineage_id: Uuid,
    pub action: String,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lineage_audit_log)]
pub struct NewAuditRow<'a> {
    pub lineage_id: Uuid,
    pub action: &'a str,
    pub user_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub accessed_at: DateTime<Utc>,
}

impl TryFrom<LineageRow> for LineageRecord {
    type Error = LineageError;

    fn try_from(row: LineageRow) -> Result<Self, Self::Error> {
        let summary: PipelineLogsSummary = serde_json::from_value(row.pipeline_logs_summary)
            .map_err(|e| LineageError::StorageUnavailable(format!("corrupt pipeline_logs_summary id={}: {e}", row.id)))?;
        Ok(LineageRecord { id: row.id,
                           report_generation_id: row.report_generation_id,
                           lead_id: row.lead_id,
                           pipeline_run_id: row.pipeline_run_id,
                           template_version_id: row.template_version_id,
                           pipeline_start_time: row.pipeline_start_time,
                           pipeline_end_time: row.pipeline_end_time,
                           compressed_blob: row.compressed_blob,
                           raw_size_bytes: row.raw_size_bytes,
                           compression_ratio: row.compression_ratio,
                           pipeline_logs_summary: summary,
                           created_at: row.created_at,
                           last_accessed_at: row.last_accessed_at,
                           access_count: row.access_count })
    }
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = LineageError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action: AuditAction = row.action.parse().map_err(LineageError::StorageUnavailable)?;
        Ok(AuditLogEntry { id: row.id,
                           lineage_id: row.lineage_id,
                           action,
                           user_id: row.user_id,
                           ip_address: row.ip_address,
                           user_agent: row.user_agent,
                           accessed_at: row.accessed_at })
    }
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos mensajes de error (dependen de driver/pg) llegan como Unknown
        // con texto. Best-effort string match sin acoplar a SQLSTATE.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff lineal (hasta 3 reintentos: 15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Resuelve una violación de unicidad en `insert`: la fila existente cuenta
/// como propia sólo si pertenece al mismo run.
fn settle_duplicate(record: &NewLineageRecord, existing: Option<LineageRecord>) -> Result<LineageRecord, LineageError> {
    match existing {
        Some(stored) if stored.pipeline_run_id == record.pipeline_run_id => {
            debug!("insert:recovered committed row lineage_id={} report_generation_id={}", stored.id, stored.report_generation_id);
            Ok(stored)
        }
        _ => Err(LineageError::DuplicateReportGeneration(record.report_generation_id)),
    }
}

/// Implementación Postgres de `LineageStore`.
pub struct PgLineageStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgLineageStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn load_one<F>(&self, op: &str, f: F) -> Result<Option<LineageRecord>, LineageError>
        where F: Fn(&mut PgConnection) -> QueryResult<Option<LineageRow>>
    {
        let row = with_retry(|| {
                      let mut conn = self.provider.connection()?;
                      f(&mut *conn).map_err(PersistenceError::from)
                  }).map_err(|e| {
                        error!("{op}:load error err={e:?}");
                        LineageError::from(e)
                    })?;
        row.map(LineageRecord::try_from).transpose()
    }
}

impl<P: ConnectionProvider> LineageStore for PgLineageStore<P> {
    fn insert(&self, record: NewLineageRecord) -> Result<LineageRecord, LineageError> {
        debug!("insert:start report_generation_id={} run_id={}", record.report_generation_id, record.pipeline_run_id);
        let summary = serde_json::to_value(&record.pipeline_logs_summary)
            .map_err(|e| LineageError::StorageUnavailable(format!("serialize summary: {e}")))?;
        let mut attempts = 0u32;
        let inserted = with_retry(|| {
            attempts += 1;
            let mut conn = self.provider.connection()?;
            diesel::insert_into(pipeline_lineage::table)
                .values(NewLineageRow { report_generation_id: record.report_generation_id,
                                        lead_id: &record.lead_id,
                                        pipeline_run_id: record.pipeline_run_id,
                                        template_version_id: &record.template_version_id,
                                        pipeline_start_time: record.pipeline_start_time,
                                        pipeline_end_time: record.pipeline_end_time,
                                        compressed_blob: &record.compressed_blob,
                                        raw_size_bytes: record.raw_size_bytes,
                                        compression_ratio: record.compression_ratio,
                                        pipeline_logs_summary: &summary })
                .get_result::<LineageRow>(&mut conn)
                .map_err(PersistenceError::from)
        });
        match inserted {
            Ok(row) => {
                debug!("insert:done lineage_id={} report_generation_id={}", row.id, row.report_generation_id);
                LineageRecord::try_from(row)
            }
            Err(PersistenceError::UniqueViolation(msg)) => {
                debug!("insert:duplicate report_generation_id={} attempts={attempts} detail={msg}", record.report_generation_id);
                // Un reintento pudo chocar con el INSERT propio ya confirmado.
                let existing = if attempts > 1 { self.get_by_report(record.report_generation_id)? } else { None };
                settle_duplicate(&record, existing)
            }
            Err(e) => {
                error!("insert:error report_generation_id={} err={:?}", record.report_generation_id, e);
                Err(e.into())
            }
        }
    }

    fn get(&self, lineage_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        self.load_one("get", |conn| pipeline_lineage::table.find(lineage_id).first::<LineageRow>(conn).optional())
    }

    fn get_by_report(&self, report_generation_id: Uuid) -> Result<Option<LineageRecord>, LineageError> {
        self.load_one("get_by_report", |conn| {
                pipeline_lineage::table.filter(pipeline_lineage::report_generation_id.eq(report_generation_id))
                                       .first::<LineageRow>(conn)
                                       .optional()
            })
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<LineageRecord>, LineageError> {
        debug!("search:start query={query:?}");
        let rows: Vec<LineageRow> = with_retry(|| {
                                        let mut conn = self.provider.connection()?;
                                        let mut q = pipeline_lineage::table.into_boxed();
                                        if let Some(lead_id) = &query.lead_id {
                                            q = q.filter(pipeline_lineage::lead_id.eq(lead_id.clone()));
                                        }
                                        if let Some(run_id) = query.pipeline_run_id {
                                            q = q.filter(pipeline_lineage::pipeline_run_id.eq(run_id));
                                        }
                                        if let Some(after) = query.created_after {
                                            q = q.filter(pipeline_lineage::created_at.ge(after));
                                        }
                                        if let Some(before) = query.created_before {
                                            q = q.filter(pipeline_lineage::created_at.le(before));
                                        }
                                        q.order((pipeline_lineage::created_at.desc(), pipeline_lineage::id.desc()))
                                         .limit(i64::try_from(query.limit).unwrap_or(i64::MAX))
                                         .load::<LineageRow>(&mut conn)
                                         .map_err(PersistenceError::from)
                                    }).map_err(|e| {
                                          error!("search:load error err={e:?}");
                                          LineageError::from(e)
                                      })?;
        debug!("search:done count={}", rows.len());
        rows.into_iter().map(LineageRecord::try_from).collect()
    }

    fn record_access(&self, lineage_id: Uuid, action: AuditAction, access: &AccessInfo) -> Result<Option<AuditLogEntry>, LineageError> {
        debug!("record_access:start lineage_id={lineage_id} action={action}");
        let row: Option<AuditRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| {
                    let now = Utc::now();
                    // Paso 1: contador + último acceso (0 filas => linaje inexistente)
                    let updated = diesel::update(pipeline_lineage::table.find(lineage_id))
                        .set((pipeline_lineage::access_count.eq(pipeline_lineage::access_count + 1),
                              pipeline_lineage::last_accessed_at.eq(Some(now))))
                        .execute(tx_conn)?;
                    if updated == 0 {
                        return Ok(None);
                    }
                    // Paso 2: entrada append-only con el mismo timestamp
                    let entry = diesel::insert_into(lineage_audit_log::table)
                        .values(NewAuditRow { lineage_id,
                                              action: action.as_str(),
                                              user_id: access.user_id.as_deref(),
                                              ip_address: access.ip_address.as_deref(),
                                              user_agent: access.user_agent.as_deref(),
                                              accessed_at: now })
                        .get_result::<AuditRow>(tx_conn)?;
                    Ok::<Option<AuditRow>, diesel::result::Error>(Some(entry))
                })
                .map_err(PersistenceError::from)
        }).map_err(|e| {
              error!("record_access:error lineage_id={lineage_id} err={e:?}");
              LineageError::from(e)
          })?;
        debug!("record_access:done lineage_id={lineage_id} found={}", row.is_some());
        row.map(AuditLogEntry::try_from).transpose()
    }

    fn audit_trail(&self, lineage_id: Uuid) -> Result<Vec<AuditLogEntry>, LineageError> {
        let rows: Vec<AuditRow> = with_retry(|| {
                                      let mut conn = self.provider.connection()?;
                                      lineage_audit_log::table.filter(lineage_audit_log::lineage_id.eq(lineage_id))
                                                              .order((lineage_audit_log::accessed_at.asc(), lineage_audit_log::id.asc()))
                                                              .load::<AuditRow>(&mut conn)
                                                              .map_err(PersistenceError::from)
                                  }).map_err(|e| {
                                        error!("audit_trail:load error lineage_id={lineage_id} err={e:?}");
                                        LineageError::from(e)
                                    })?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre migraciones.
///
/// Si `min_size > max_size`, usa `min_size = max_size`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_retryable(&PersistenceError::SerializationConflict));
        assert!(is_retryable(&PersistenceError::TransientIo("pool".into())));
        assert!(is_retryable(&PersistenceError::Unknown("Deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::UniqueViolation("dup".into())));
    }

    #[test]
    fn retry_gives_up_after_three_attempts() {
        let mut calls = 0;
        let out: Result<(), PersistenceError> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::TransientIo("down".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls, 4);
    }

    fn new_record(report_generation_id: Uuid, pipeline_run_id: Uuid) -> NewLineageRecord {
        let start = Utc::now();
        NewLineageRecord { report_generation_id,
                           lead_id: "lead-1".into(),
                           pipeline_run_id,
                           template_version_id: "v1".into(),
                           pipeline_start_time: start,
                           pipeline_end_time: start,
                           compressed_blob: vec![],
                           raw_size_bytes: 0,
                           compression_ratio: 100.0,
                           pipeline_logs_summary: PipelineLogsSummary { total_events: 1,
                                                                        error_count: 0,
                                                                        warning_count: 0,
                                                                        duration_seconds: 0.0,
                                                                        success: true } }
    }

    #[test]
    fn committed_row_from_same_run_counts_as_inserted() {
        let report = Uuid::new_v4();
        let run = Uuid::new_v4();
        let stored = LineageRecord::from_new(new_record(report, run), Uuid::new_v4(), Utc::now());
        let settled = settle_duplicate(&new_record(report, run), Some(stored.clone()));
        assert_eq!(settled, Ok(stored));
    }

    #[test]
    fn row_from_another_run_stays_duplicate() {
        let report = Uuid::new_v4();
        let other = LineageRecord::from_new(new_record(report, Uuid::new_v4()), Uuid::new_v4(), Utc::now());
        let record = new_record(report, Uuid::new_v4());
        assert_eq!(settle_duplicate(&record, Some(other)), Err(LineageError::DuplicateReportGeneration(report)));
        assert_eq!(settle_duplicate(&record, None), Err(LineageError::DuplicateReportGeneration(report)));
    }

    #[test]
    fn corrupt_action_is_reported() {
        let row = AuditRow { id: Uuid::new_v4(),
                             lineage_id: Uuid::new_v4(),
                             action: "delete".into(),
                             user_id: None,
                             ip_address: None,
                             user_agent: None,
                             accessed_at: Utc::now() };
        assert!(matches!(AuditLogEntry::try_from(row), Err(LineageError::StorageUnavailable(_))));
    }
}
