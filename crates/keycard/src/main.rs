//! Keycard service entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use keycard::{app, items};
use keycard_config::{ConfigLoader, ENV_PREFIX};
use keycard_database::{connect, PgTransactionSource};
use keycard_server::Server;
use keycard_telemetry::init_logging;

const DEFAULT_CONFIG_FILE: &str = "keycard.toml";
const HUB_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("keycard {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(2);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Keycard - HTTP service

USAGE:
    keycard [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

Without --config, ./keycard.toml is read if present. Any value can be
overridden with KEYCARD__SECTION__KEY, for example:

    KEYCARD__SERVER__PORT=4000
    KEYCARD__DATABASE__URL=postgres://keycard@localhost/keycard
    KEYCARD__LOGGING__FORMAT=pretty
"
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "keycard exited with error");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let loader = ConfigLoader::new().with_dotenv();
    let loader = match &args.config {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let config = loader
        .with_env_prefix(ENV_PREFIX)
        .load()
        .context("failed to load configuration")?;

    init_logging(&config.log_config()?).context("failed to initialise logging")?;

    let hub = app::build_hub(&config);
    let mut router = app::router(&config);

    let pool = match config.database.url.as_deref() {
        Some(url) => {
            let pool = connect(&app::pool_settings(&config.database, url))
                .await
                .context("failed to connect to database")?;
            items::routes(&mut router, Arc::new(PgTransactionSource::new(pool.clone())));
            Some(pool)
        }
        None => {
            tracing::warn!("no database configured, item routes disabled");
            None
        }
    };

    let handler = app::pipeline(&config, hub.clone()).wrap(router.into_handler());
    let served = Server::run(app::server_config(&config), handler).await;

    if !hub.flush(HUB_FLUSH_TIMEOUT) {
        tracing::warn!("error reports still pending after flush timeout");
    }
    if let Some(pool) = pool {
        pool.close().await;
    }

    served.context("server did not shut down cleanly")
}
