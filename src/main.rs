//! SQL console - run one read-only query and print the result.

use std::process::ExitCode;
use std::sync::Arc;

use sql_console::cli::Cli;
use sql_console::config::{Config, ConnectionConfig};
use sql_console::db::{self, ConnectionSource, MockSource};
use sql_console::error::{ConsoleError, Result};
use sql_console::gateway::{GatewayResponse, SqlGateway};
use sql_console::{logging, output};
use tracing::{error, info};

/// Exit code when the gateway rejected or failed the query.
const EXIT_QUERY_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    match run().await {
        Ok(response) if response.error.is_some() => ExitCode::from(EXIT_QUERY_ERROR),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<GatewayResponse> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let source: Arc<dyn ConnectionSource> = if cli.mock_db {
        Arc::new(MockSource::sample())
    } else {
        let connection = resolve_connection(&cli, &config)?;
        info!("Connection: {}", connection.display_string());
        db::connect(&connection).await?
    };

    let sql = cli.read_sql()?;
    let gateway = SqlGateway::new(Arc::clone(&source), config.gateway);
    let response = gateway.respond(sql.as_deref()).await;
    source.close().await;

    print!("{}", output::render(&response, cli.format));
    Ok(response)
}

/// Resolves the connection with precedence:
/// 1. CLI connection string
/// 2. Named connection from config
/// 3. Default connection from config
/// 4. `DATABASE_URL`
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    if let Some(connection) = cli.to_connection_config()? {
        return Ok(connection);
    }

    if let Some(name) = cli.connection_name() {
        return config.get_connection(Some(name)).cloned().ok_or_else(|| {
            ConsoleError::config(format!("Connection '{}' not found in config file", name))
        });
    }

    if let Some(connection) = config.get_connection(None) {
        return Ok(connection.clone());
    }

    match std::env::var("DATABASE_URL") {
        Ok(url) => ConnectionConfig::from_connection_string(&url),
        Err(_) => Err(ConsoleError::config(
            "No database connection configured. Pass a connection string, use -c NAME, or set DATABASE_URL.",
        )),
    }
}
