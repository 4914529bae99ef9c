//! Truncado determinista por prioridad.
//!
//! Prioridades (de mayor a menor):
//! 1. `ESSENTIAL_FIELDS`: siempre verbatim.
//! 2. `error`: verbatim (diagnóstico de fallos).
//! 3. `summary`: verbatim (conteos agregados).
//! 4. `pipeline_logs`: con más de `LOG_TRUNCATION_THRESHOLD` entradas se
//!    conserva cabeza + centinela + cola; acepta secuencia u objeto con
//!    `events`.
//! 5. `raw_inputs`: se reemplaza por claves + muestra acotada.
//! 6. Resto: descartado con marcador si es grande, verbatim si no.
use serde_json::{json, Map, Value};

use crate::constants::{ESSENTIAL_FIELDS, LARGE_FIELD_BYTES, LOG_HEAD_KEEP, LOG_TAIL_KEEP, LOG_TRUNCATION_THRESHOLD, SAMPLE_MAX_ARRAY_LEN, SAMPLE_MAX_OBJECT_BYTES, SAMPLE_MAX_STRING_CHARS};

const LOGS_FIELD: &str = "pipeline_logs";
const RAW_INPUTS_FIELD: &str = "raw_inputs";
const FORCED_FLAG: &str = "forced_truncation";

/// Una pasada de truncado sobre `record`.
pub fn truncate(record: &Value) -> Value {
    let Some(map) = record.as_object() else {
        return json!({ FORCED_FLAG: true, "original_type": type_name(record) });
    };
    let logs_already_truncated = map.get("pipeline_logs_truncated").and_then(Value::as_bool).unwrap_or(false);

    let mut out = Map::new();
    for (key, value) in map {
        match key.as_str() {
            k if ESSENTIAL_FIELDS.contains(&k) => {
                out.insert(key.clone(), value.clone());
            }
            "error" | "summary" => {
                out.insert(key.clone(), value.clone());
            }
            LOGS_FIELD if logs_already_truncated => {
                out.insert(key.clone(), value.clone());
            }
            LOGS_FIELD => truncate_logs(value, &mut out),
            RAW_INPUTS_FIELD if value.is_object() => summarize_raw_inputs(value, &mut out),
            _ => truncate_generic(key, value, &mut out),
        }
    }
    Value::Object(out)
}

fn truncate_logs(value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Array(entries) => match cut_head_tail(entries) {
            Some(kept) => {
                out.insert(LOGS_FIELD.into(), Value::Array(kept));
                mark_logs_truncated(out, entries.len());
            }
            None => {
                out.insert(LOGS_FIELD.into(), value.clone());
            }
        },
        Value::Object(obj) => {
            let cut = obj.get("events").and_then(Value::as_array).and_then(|events| cut_head_tail(events).map(|kept| (kept, events.len())));
            match cut {
                Some((kept, total)) => {
                    let mut logs = obj.clone();
                    logs.insert("events".into(), Value::Array(kept));
                    out.insert(LOGS_FIELD.into(), Value::Object(logs));
                    mark_logs_truncated(out, total);
                }
                None => {
                    out.insert(LOGS_FIELD.into(), value.clone());
                }
            }
        }
        other => truncate_generic(LOGS_FIELD, other, out),
    }
}

fn cut_head_tail(entries: &[Value]) -> Option<Vec<Value>> {
    if entries.len() <= LOG_TRUNCATION_THRESHOLD {
        return None;
    }
    let omitted = entries.len() - LOG_HEAD_KEEP - LOG_TAIL_KEEP;
    let mut kept = Vec::with_capacity(LOG_HEAD_KEEP + LOG_TAIL_KEEP + 1);
    kept.extend_from_slice(&entries[..LOG_HEAD_KEEP]);
    kept.push(json!({
        "type": "truncated",
        "message": format!("... {omitted} entries truncated ..."),
        "omitted_count": omitted,
    }));
    kept.extend_from_slice(&entries[entries.len() - LOG_TAIL_KEEP..]);
    Some(kept)
}

fn mark_logs_truncated(out: &mut Map<String, Value>, total: usize) {
    out.insert("pipeline_logs_truncated".into(), Value::Bool(true));
    out.insert("pipeline_logs_total_count".into(), json!(total));
}

fn summarize_raw_inputs(value: &Value, out: &mut Map<String, Value>) {
    let Some(inputs) = value.as_object() else { return };
    let keys: Vec<Value> = inputs.keys().cloned().map(Value::String).collect();
    let sample: Map<String, Value> = inputs.iter().map(|(k, v)| (k.clone(), sample_value(v))).collect();
    out.insert("raw_inputs_keys".into(), Value::Array(keys));
    out.insert("raw_inputs_truncated".into(), Value::Bool(true));
    out.insert("raw_inputs_sample".into(), Value::Object(sample));
}

fn sample_value(value: &Value) -> Value {
    let keep = match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => s.chars().count() < SAMPLE_MAX_STRING_CHARS,
        Value::Array(items) => items.len() < SAMPLE_MAX_ARRAY_LEN,
        Value::Object(_) => serialized_len(value) < SAMPLE_MAX_OBJECT_BYTES,
    };
    if keep {
        value.clone()
    } else {
        Value::String(format!("<truncated {}>", type_name(value)))
    }
}

fn truncate_generic(key: &str, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::String(s) => {
            let chars = s.chars().count();
            if chars > LARGE_FIELD_BYTES {
                out.insert(format!("{key}_truncated"), Value::Bool(true));
                out.insert(format!("{key}_length"), json!(chars));
                return;
            }
        }
        Value::Array(_) | Value::Object(_) => {
            let size = serialized_len(value);
            if size > LARGE_FIELD_BYTES {
                out.insert(format!("{key}_truncated"), Value::Bool(true));
                out.insert(format!("{key}_type"), json!(type_name(value)));
                out.insert(format!("{key}_size"), json!(size));
                return;
            }
        }
        _ => {}
    }
    out.insert(key.to_string(), value.clone());
}

/// Payloads mínimos, del más rico al más pobre. Se construyen desde el
/// registro original para que los campos de mayor prioridad lleguen intactos.
pub fn fallback_ladder(record: &Value) -> Vec<Value> {
    let empty = Map::new();
    let map = record.as_object().unwrap_or(&empty);

    let mut essentials = Map::new();
    for field in ESSENTIAL_FIELDS {
        if let Some(v) = map.get(field) {
            essentials.insert(field.to_string(), v.clone());
        }
    }
    essentials.insert(FORCED_FLAG.into(), Value::Bool(true));

    let mut diagnostics = essentials.clone();
    for field in ["error", "summary"] {
        if let Some(v) = map.get(field) {
            diagnostics.insert(field.to_string(), v.clone());
        }
    }
    if let Some(logs_summary) = map.get(LOGS_FIELD).and_then(|l| l.get("summary")) {
        diagnostics.insert(LOGS_FIELD.into(), json!({ "summary": logs_summary }));
    }

    vec![Value::Object(diagnostics), Value::Object(essentials), json!({ FORCED_FLAG: true })]
}

fn serialized_len(value: &Value) -> usize {
    serde_json::to_vec(value).map_or(usize::MAX, |b| b.len())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
