//! arbwatch - command-line client for the arbwatch dashboard API.
//!
//! Logs in, inspects and ends dashboard sessions using the same
//! authenticated client the dashboard services use.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arbwatch_core::Config;

/// Set to `1` to also write logs to a daily rolling file in the cache directory
const ENV_LOG_FILE: &str = "ARBWATCH_LOG_FILE";

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "arbwatch.log";

const USAGE: &str = "\
Usage: arbwatch <command> [args]

Commands:
  login [email]           Sign in (prompts for password)
  register <name> <email> Create an account (prompts for password)
  me                      Show the signed-in user
  logout                  Sign out and forget the stored token
  status                  Show API endpoint and session state

Environment:
  ARBWATCH_API_URL               API base URL (default http://localhost:3001/api)
  ARBWATCH_REQUEST_TIMEOUT_SECS  Request timeout in seconds (default 30)
  ARBWATCH_CREDENTIAL_STORE      'file' (default) or 'keyring'
  ARBWATCH_LOG_FILE              Set to 1 to log to a file in the cache directory
  RUST_LOG                       Log filter (default warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;

    let log_dir = if std::env::var(ENV_LOG_FILE).is_ok_and(|v| v == "1") {
        Some(config.cache_dir()?)
    } else {
        None
    };
    let _log_guard = init_tracing(log_dir.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    info!(command = %command, "arbwatch starting");

    let app = commands::App::new(&config)?;
    match command.as_str() {
        "login" => app.login(&mut config, args.get(1).cloned()).await,
        "register" => match (args.get(1), args.get(2)) {
            (Some(name), Some(email)) => app.register(&mut config, name, email).await,
            _ => {
                eprintln!("Usage: arbwatch register <name> <email>");
                Ok(())
            }
        },
        "me" => app.me().await,
        "logout" => app.logout().await,
        "status" => app.status(),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            Ok(())
        }
    }
}
