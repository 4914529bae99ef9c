//! Esquema Diesel (mantenido a mano en paralelo a `migrations/`).

diesel::table! {
    pipeline_lineage (id) {
        id -> Uuid,
        report_generation_id -> Uuid,
        lead_id -> Text,
        pipeline_run_id -> Uuid,
        template_version_id -> Text,
        pipeline_start_time -> Timestamptz,
        pipeline_end_time -> Timestamptz,
        compressed_blob -> Bytea,
        raw_size_bytes -> BigInt,
        compression_ratio -> Double,
        pipeline_logs_summary -> Jsonb,
        created_at -> Timestamptz,
        last_accessed_at -> Nullable<Timestamptz>,
        access_count -> BigInt,
    }
}

diesel::table! {
    lineage_audit_log (id) {
        id -> Uuid,
        lineage_id -> Uuid,
        action -> Text,
        user_id -> Nullable<Text>,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        accessed_at -> Timestamptz,
    }
}

diesel::joinable!(lineage_audit_log -> pipeline_lineage (lineage_id));

diesel::allow_tables_to_appear_in_same_query!(
    pipeline_lineage,
    lineage_audit_log,
);
