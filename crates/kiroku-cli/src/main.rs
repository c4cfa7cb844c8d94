use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kiroku_api::{AuthContext, EntityId, Filters, RawEntity, ResourceEndpoint, ReqwestTransport};
use kiroku_core::{AppConfig, KirokuError, ListLoadController, LoadOutcome};
use tracing_subscriber::EnvFilter;

/// Browse a Kiroku backend from the terminal.
#[derive(Debug, Parser)]
#[command(name = "kiroku", version, about)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `api.base_url` from the config.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Page through a collection, printing one JSON entity per line.
    List {
        /// Item path template, e.g. `/shows/{id}`.
        template: String,
        /// Filter as `name=value`; repeatable.
        #[arg(long = "filter", value_parser = parse_pair)]
        filters: Vec<(String, String)>,
        /// Bind a path placeholder as `name=value`; repeatable.
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
        /// Maximum number of pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Fetch a single entity.
    Get {
        template: String,
        id: String,
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the config file location.
    Path,
    /// Print the effective configuration.
    Show,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("kiroku: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, cli.config.as_deref(), &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("kiroku: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, KirokuError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }
    Ok(config)
}

/// The file `--config` points at, or the platform default.
fn config_location(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(AppConfig::config_path, Path::to_path_buf)
}

fn auth_from_env() -> AuthContext {
    let auth = AuthContext::new();
    if let Ok(token) = std::env::var("KIROKU_TOKEN") {
        auth.login(token);
    }
    auth
}

fn endpoint(
    config: &AppConfig,
    template: &str,
    params: Vec<(String, String)>,
) -> Result<ResourceEndpoint<RawEntity, ReqwestTransport>, KirokuError> {
    let client = config.api_client(auth_from_env())?;
    let mut endpoint = ResourceEndpoint::new(client, template)?
        .with_cursor_param(config.api.cursor_param.clone());
    if let Some(size) = config.api.page_size {
        endpoint = endpoint.with_page_size(config.api.limit_param.clone(), size);
    }
    for (name, value) in params {
        endpoint = endpoint.bind(name, value);
    }
    Ok(endpoint)
}

async fn run(
    command: Command,
    config_file: Option<&Path>,
    config: &AppConfig,
) -> Result<ExitCode, KirokuError> {
    match command {
        Command::List {
            template,
            filters,
            params,
            pages,
        } => {
            let filters: Filters = filters.into_iter().collect();
            let endpoint = endpoint(config, &template, params)?
                .with_filters(filters.keys().cloned().collect::<Vec<_>>());
            let controller = ListLoadController::new(endpoint.listing(filters));

            let mut outcome = controller.load_first().await;
            let mut fetched = 1;
            while fetched < pages && matches!(outcome, LoadOutcome::Loaded { .. }) {
                outcome = controller.load_more().await;
                if outcome == LoadOutcome::Skipped {
                    break;
                }
                fetched += 1;
            }

            for entity in controller.items() {
                println!("{}", serde_json::to_string(&entity).unwrap_or_default());
            }

            let state = controller.state();
            if let Some(cursor) = &state.cursor {
                tracing::info!(%cursor, "more pages available");
            }
            match state.error {
                Some(err) => {
                    if err.is_auth_failure() {
                        eprintln!("kiroku: not authorized, set KIROKU_TOKEN and try again");
                    }
                    Err(err.into())
                }
                None => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Get {
            template,
            id,
            params,
        } => {
            let entity = endpoint(config, &template, params)?
                .fetch_one(&EntityId::new(id))
                .await?;
            println!("{}", serde_json::to_string_pretty(&entity).unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Path => println!("{}", config_location(config_file).display()),
                ConfigAction::Show => {
                    let rendered = toml::to_string_pretty(config)
                        .map_err(|e| KirokuError::Config(e.to_string()))?;
                    print!("{rendered}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
