use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use academy_roster::config::{Config, LogFormat};
use academy_roster::middleware::rate_limit::spawn_purge_task;
use academy_roster::services::SystemClock;
use academy_roster::store::JsonFileStore;
use academy_roster::{build_router, AppState};

const WINDOW_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(name = "academy-server", version, about = "Academy roster API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print a bcrypt hash for use in *_PASSWORD_HASH settings
    HashPassword {
        password: String,
        /// bcrypt work factor
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Some(Command::HashPassword { password, cost }) = cli.command {
        println!("{}", bcrypt::hash(password, cost)?);
        return Ok(());
    }

    let config = Config::from_env();
    init_tracing(config.log_format);

    if config.auth.users.is_empty() {
        tracing::warn!("No login credentials configured; every login will be rejected");
    }
    if config.is_production() && config.jwt.secret == "change-me-to-a-secure-random-string" {
        tracing::warn!("JWT_SECRET is still the default value");
    }

    let store = Arc::new(JsonFileStore::new(config.store.data_dir.clone()));
    tracing::info!(data_dir = %store.dir().display(), "Using JSON file store");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, store, Arc::new(SystemClock));
    spawn_purge_task(
        vec![state.rate_limiter.clone(), state.login_limiter.clone()],
        WINDOW_PURGE_INTERVAL,
    );

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Academy roster API listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_starts_the_server() {
        let cli = Cli::try_parse_from(["academy-server"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn hash_password_takes_a_password_and_optional_cost() {
        let cli = Cli::try_parse_from(["academy-server", "hash-password", "s3cret"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::HashPassword {
                password: "s3cret".into(),
                cost: bcrypt::DEFAULT_COST,
            })
        );

        let cli =
            Cli::try_parse_from(["academy-server", "hash-password", "s3cret", "--cost", "4"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::HashPassword { cost: 4, .. })));
    }

    #[test]
    fn hash_password_without_password_is_a_usage_error() {
        let err = Cli::try_parse_from(["academy-server", "hash-password"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
