//! Route Guard CLI
//!
//! Command-line interface for checking request fixtures against route
//! schemas without starting a server.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use axum::http::{Method, Uri};
use clap::{Parser, Subcommand};
use route_guard::{
    load_schema, load_schema_config, query_object, validate_request, ErrorFormat, PluginConfig,
    RequestData, SchemaConfig, SchemaFailureBody, SchemaOutcome, Source,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "route-guard")]
#[command(about = "Check request fixtures against route schemas")]
#[command(version)]
struct Cli {
    /// Log validation events to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a request fixture against a route config
    Check {
        /// Request fixture: {"method", "url", "body", "query", "params"}
        request: PathBuf,

        /// Route config naming the body/query/params schemas
        #[arg(long)]
        schemas: PathBuf,

        /// Error format: simple (default), detailed or flat
        #[arg(long)]
        format: Option<String>,

        /// Message placed in the failure response
        #[arg(long)]
        hint: Option<String>,

        /// Skip schemas that are not usable instead of failing
        #[arg(long)]
        soft: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check that every schema in a route config is usable
    Lint {
        /// Route config file
        config: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

/// A request captured as JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestFixture {
    id: Option<String>,
    method: Option<String>,
    url: Option<String>,
    body: Value,
    query: Option<Value>,
    params: Option<Value>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check {
            request,
            schemas,
            format,
            hint,
            soft,
            pretty,
        } => {
            let mut config = PluginConfig::from_env();
            if soft {
                config = config.soft(true);
            }
            if cli.verbose {
                config = config.verbose(true);
            }
            if let Some(format) = format {
                config = config.format(ErrorFormat::parse(&format));
            }
            if let Some(hint) = hint {
                config = config.hint(hint);
            }
            run_check(&request, &schemas, &config, pretty)
        }
        Commands::Lint { config, json } => run_lint(&config, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_check(
    request_path: &Path,
    schemas_path: &Path,
    config: &PluginConfig,
    pretty: bool,
) -> Result<(), u8> {
    let schemas = load_schema_config(schemas_path).map_err(|e| {
        eprintln!("Error: loading schemas: {}", e);
        e.exit_code() as u8
    })?;
    let mut request = load_request(request_path)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            eprintln!("Error: starting runtime: {}", e);
            3u8
        })?;

    let outcome = runtime
        .block_on(validate_request(&mut request, &schemas, config))
        .map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;

    match outcome {
        SchemaOutcome::Valid => {
            print_json(&request.into_validated(), pretty)?;
            Ok(())
        }
        SchemaOutcome::Invalid { issues, .. } => {
            print_json(&SchemaFailureBody::new(&request.id, &issues, config), pretty)?;
            Err(1)
        }
    }
}

fn load_request(path: &Path) -> Result<RequestData, u8> {
    let raw = load_schema(path).map_err(|e| {
        eprintln!("Error: loading request: {}", e);
        e.exit_code() as u8
    })?;
    let fixture: RequestFixture = serde_json::from_value(raw).map_err(|e| {
        eprintln!("Error: invalid request fixture: {}", e);
        2u8
    })?;

    let method = match fixture.method.as_deref() {
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| {
            eprintln!("Error: invalid method {:?}: {}", m, e);
            2u8
        })?,
        None => Method::GET,
    };
    let uri: Uri = fixture.url.as_deref().unwrap_or("/").parse().map_err(|e| {
        eprintln!("Error: invalid url: {}", e);
        2u8
    })?;

    let query = fixture.query.unwrap_or_else(|| query_object(&uri));
    let params = fixture
        .params
        .unwrap_or_else(|| Value::Object(Map::new()));

    let mut request = RequestData::new(method, uri)
        .with_body(fixture.body)
        .with_query(query)
        .with_params(params);
    if let Some(id) = fixture.id {
        request = request.with_id(id);
    }
    Ok(request)
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), u8> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}

fn run_lint(path: &Path, json_output: bool) -> Result<(), u8> {
    let schemas: SchemaConfig = load_schema_config(path).map_err(|e| {
        if json_output {
            println!("{}", json!({ "valid": false, "error": e.to_string() }));
        } else {
            eprintln!("Error: {}", e);
        }
        e.exit_code() as u8
    })?;

    let mut slots = Map::new();
    let mut failed = 0;
    for source in Source::ALL {
        let status = match schemas.slot(source).map(|slot| slot.conformance()) {
            None => json!({ "status": "absent" }),
            Some(Ok(_)) => json!({ "status": "ok" }),
            Some(Err(reason)) => {
                failed += 1;
                json!({ "status": "error", "reason": reason })
            }
        };
        slots.insert(source.to_string(), status);
    }

    if json_output {
        println!("{}", json!({ "valid": failed == 0, "slots": slots }));
    } else {
        println!("Linting {} ...\n", path.display());
        for (source, status) in &slots {
            match status["status"].as_str() {
                Some("ok") => println!("  \x1b[32m✓\x1b[0m {}", source),
                Some("error") => println!(
                    "  \x1b[31m✗\x1b[0m {}: {}",
                    source,
                    status["reason"].as_str().unwrap_or_default()
                ),
                _ => println!("  - {} (no schema)", source),
            }
        }
        println!();
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(1)
    }
}
