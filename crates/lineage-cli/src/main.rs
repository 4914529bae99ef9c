use std::path::PathBuf;
use std::process::exit;

use chrono::{DateTime, Utc};
use lineage_core::model::AccessInfo;
use lineage_core::{LineageReader, SearchQuery};
use lineage_persistence::{PgLineageStore, PoolProvider};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = "Uso:
  lineage-cli show --report <UUID> [--user <ID>]
  lineage-cli logs --report <UUID> [--user <ID>]
  lineage-cli search [--lead <ID>] [--run <UUID>] [--after <RFC3339>] [--before <RFC3339>] [--limit <N>]
  lineage-cli download --lineage <UUID> [--out <DIR>] [--user <ID>]";

/// Límite superior de resultados por búsqueda (lo impone la capa de API).
const MAX_SEARCH_LIMIT: usize = 500;

#[derive(Default)]
struct Args {
    report: Option<Uuid>,
    lineage: Option<Uuid>,
    lead: Option<String>,
    run: Option<Uuid>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    limit: Option<usize>,
    out: Option<PathBuf>,
    user: Option<String>,
}

fn parse_args(rest: &[String]) -> Args {
    let mut args = Args::default();
    let mut i = 0;
    while i < rest.len() {
        let value = rest.get(i + 1);
        match (rest[i].as_str(), value) {
            ("--report", Some(v)) => args.report = Uuid::parse_str(v).ok(),
            ("--lineage", Some(v)) => args.lineage = Uuid::parse_str(v).ok(),
            ("--lead", Some(v)) => args.lead = Some(v.clone()),
            ("--run", Some(v)) => args.run = Uuid::parse_str(v).ok(),
            ("--after", Some(v)) => args.after = parse_ts(v),
            ("--before", Some(v)) => args.before = parse_ts(v),
            ("--limit", Some(v)) => args.limit = v.parse().ok(),
            ("--out", Some(v)) => args.out = Some(PathBuf::from(v)),
            ("--user", Some(v)) => args.user = Some(v.clone()),
            (other, _) => {
                eprintln!("[lineage-cli] argumento ignorado: {other}");
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    args
}

fn parse_ts(v: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(v).ok().map(|t| t.with_timezone(&Utc))
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let argv: Vec<String> = std::env::args().collect();
    let Some(command) = argv.get(1).cloned() else {
        eprintln!("{USAGE}");
        exit(2);
    };
    let args = parse_args(&argv[2..]);

    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[lineage-cli] requiere DATABASE_URL para operar contra backend persistente");
        exit(4);
    }
    let pool = match lineage_persistence::build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[lineage-cli] pool error: {e}");
            exit(5);
        }
    };
    let reader = LineageReader::new(PgLineageStore::new(PoolProvider { pool }));
    let access = AccessInfo { user_id: args.user.clone(), ip_address: None, user_agent: Some(format!("lineage-cli/{}", env!("CARGO_PKG_VERSION"))) };

    let code = match command.as_str() {
        "show" => show(&reader, &args, &access),
        "logs" => logs(&reader, &args, &access),
        "search" => search(&reader, &args),
        "download" => download(&reader, &args, &access),
        _ => {
            eprintln!("{USAGE}");
            2
        }
    };
    exit(code);
}

type Reader = LineageReader<PgLineageStore<PoolProvider>>;

fn show(reader: &Reader, args: &Args, access: &AccessInfo) -> i32 {
    let Some(report) = args.report else {
        eprintln!("{USAGE}");
        return 2;
    };
    match reader.view(report, access) {
        Ok(Some(record)) => print_json(&record),
        Ok(None) => {
            eprintln!("[lineage-cli show] sin linaje para report={report}");
            4
        }
        Err(e) => {
            eprintln!("error: {e}");
            5
        }
    }
}

fn logs(reader: &Reader, args: &Args, access: &AccessInfo) -> i32 {
    let Some(report) = args.report else {
        eprintln!("{USAGE}");
        return 2;
    };
    match reader.view_logs(report, access) {
        Ok(Some(payload)) => print_json(&payload),
        Ok(None) => {
            eprintln!("[lineage-cli logs] sin linaje para report={report}");
            4
        }
        Err(e) => {
            eprintln!("error: {e}");
            5
        }
    }
}

fn search(reader: &Reader, args: &Args) -> i32 {
    let query = SearchQuery { lead_id: args.lead.clone(),
                              pipeline_run_id: args.run,
                              created_after: args.after,
                              created_before: args.before,
                              limit: args.limit.unwrap_or(SearchQuery::default().limit).clamp(1, MAX_SEARCH_LIMIT) };
    match reader.search(&query) {
        Ok(records) => print_json(&records),
        Err(e) => {
            eprintln!("error: {e}");
            5
        }
    }
}

fn download(reader: &Reader, args: &Args, access: &AccessInfo) -> i32 {
    let Some(lineage_id) = args.lineage else {
        eprintln!("{USAGE}");
        return 2;
    };
    let blob = match reader.download(lineage_id, access) {
        Ok(Some(b)) => b,
        Ok(None) => {
            eprintln!("[lineage-cli download] linaje no encontrado: {lineage_id}");
            return 4;
        }
        Err(e) => {
            eprintln!("error: {e}");
            return 5;
        }
    };
    let path = args.out.clone().unwrap_or_else(|| PathBuf::from(".")).join(&blob.filename);
    if let Err(e) = std::fs::write(&path, &blob.bytes) {
        eprintln!("[lineage-cli download] no se pudo escribir {}: {e}", path.display());
        return 5;
    }
    let digest = Sha256::digest(&blob.bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    println!("{} {} bytes={} sha256={hex}", path.display(), blob.media_type, blob.bytes.len());
    0
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            5
        }
    }
}
