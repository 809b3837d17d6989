use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use datadock::{OperationService, ServerConfig, ServiceConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage: datadock [options]

Options:
  --host <addr>          Bind address [env: DATADOCK_HOST] [default: 0.0.0.0]
  --port <port>          Bind port [env: DATADOCK_PORT] [default: 5058]
  --body-limit <bytes>   Largest request body [env: DATADOCK_BODY_LIMIT] [default: 52428800]
  --cors-origin <url>    Browser origin allowed cross-origin [env: DATADOCK_CORS_ORIGIN] [default: http://localhost:3000]
  --worker-dir <dir>     Worker program directory [env: DATADOCK_WORKER_DIR] [default: workers]
  --interpreter <cmd>    Interpreter for worker programs [env: DATADOCK_INTERPRETER] [default: python3]
  --no-interpreter       Execute worker programs directly
  --timeout-secs <n>     Per-invocation worker timeout [env: DATADOCK_TIMEOUT_SECS] [default: 300]";

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("DATADOCK_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "datadock={level},datadock_server={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

/// Overlay `DATADOCK_HOST`, `DATADOCK_PORT`, `DATADOCK_BODY_LIMIT` and
/// `DATADOCK_CORS_ORIGIN`.
fn server_from_env(
    mut config: ServerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, String> {
    if let Some(host) = lookup("DATADOCK_HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("DATADOCK_PORT") {
        config.port = parse_number("DATADOCK_PORT", &port)?;
    }
    if let Some(limit) = lookup("DATADOCK_BODY_LIMIT") {
        config.body_limit = parse_number("DATADOCK_BODY_LIMIT", &limit)?;
    }
    if let Some(origin) = lookup("DATADOCK_CORS_ORIGIN") {
        config = cors_origin(config, "DATADOCK_CORS_ORIGIN", &origin)?;
    }
    Ok(config)
}

fn cors_origin(config: ServerConfig, name: &str, origin: &str) -> Result<ServerConfig, String> {
    config
        .with_cors_origin(origin)
        .map_err(|e| format!("invalid value for {name}: {origin:?}: {e}"))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {name}: {value:?}: {e}"))
}

/// Apply command-line flags on top of the environment-derived configs.
fn parse_args(
    args: &[String],
    mut server: ServerConfig,
    mut service: ServiceConfig,
) -> Result<(ServerConfig, ServiceConfig), String> {
    let mut i = 1; // skip argv[0]
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "--host" => server.host = value()?,
            "--port" => server.port = parse_number("--port", &value()?)?,
            "--body-limit" => server.body_limit = parse_number("--body-limit", &value()?)?,
            "--cors-origin" => server = cors_origin(server, "--cors-origin", &value()?)?,
            "--worker-dir" => service.worker_dir = PathBuf::from(value()?),
            "--interpreter" => service.interpreter = Some(value()?),
            "--no-interpreter" => service.interpreter = None,
            "--timeout-secs" => {
                service.worker_timeout = datadock::config::parse_timeout_secs("--timeout-secs", &value()?)
                    .map_err(|e| e.to_string())?;
            }
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }
    Ok((server, service))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let service_env = ServiceConfig::default()
        .from_env()
        .context("invalid worker configuration")?;
    let server_env = server_from_env(ServerConfig::default(), |name| std::env::var(name).ok())
        .map_err(anyhow::Error::msg)?;

    let (server, service) = match parse_args(&args, server_env, service_env) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    tracing::info!(
        worker_dir = %service.worker_dir.display(),
        interpreter = ?service.interpreter,
        timeout = ?service.worker_timeout,
        "Worker configuration"
    );

    datadock::serve(server, Arc::new(OperationService::new(&service))).await
}
