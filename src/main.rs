use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use superset_sso::{
    AppState,
    auth::{DEFAULT_ROLE, SessionStore, TokenIssuer},
    build_app,
    config::SsoBridgeConfig,
    observability,
};
use tokio::time::MissedTickBehavior;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// CLI arguments for the Superset SSO bridge
#[derive(Parser, Debug)]
#[command(version, about = "JWT single sign-on bridge for Apache Superset", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(
        short,
        long,
        global = true,
        env = "SUPERSET_SSO_CONFIG",
        default_value = "superset-sso.toml"
    )]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the bridge server (default)
    Serve,
    /// Fetch every user from the main application's API and sync them into Superset
    SyncUsers {
        /// User list endpoint (defaults to sync.api_url)
        #[arg(long, env = "SUPERSET_SSO_API_URL")]
        api_url: Option<String>,
        /// Bearer token for the user list endpoint (defaults to sync.api_token)
        #[arg(long, env = "SUPERSET_SSO_API_TOKEN", hide_env_values = true)]
        api_token: Option<String>,
    },
    /// Print a login token and URL for one main application user
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        email: String,
        /// Full name; split on the first space into first and last name
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_ROLE)]
        role: String,
        #[arg(long)]
        company_id: Option<String>,
    },
    /// Load and validate the configuration file, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);

    match args.command {
        Some(Command::Serve) | None => run_server(config, &args.config).await,
        Some(Command::SyncUsers { api_url, api_token }) => {
            run_sync_users(config, api_url, api_token).await
        }
        Some(Command::IssueToken {
            user_id,
            email,
            name,
            role,
            company_id,
        }) => run_issue_token(&config, &user_id, &email, &name, &role, company_id.as_deref()),
        Some(Command::CheckConfig) => {
            println!("Configuration OK: {}", args.config.display());
        }
    }
}

fn load_config(path: &Path) -> SsoBridgeConfig {
    match SsoBridgeConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &SsoBridgeConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_server(config: SsoBridgeConfig, config_path: &Path) {
    init_tracing(&config);
    tracing::info!(config_file = %config_path.display(), "Starting Superset SSO bridge");

    if config.auth.admin.is_none() {
        tracing::info!("auth.admin.token is not set; /admin endpoints are disabled");
    }

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            std::process::exit(1);
        }
    };

    let cleanup = spawn_session_cleanup(state.sessions.clone());
    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    cleanup.abort();
    tracing::info!("Server stopped");
}

/// Periodically drop expired sessions so the in-memory store stays bounded.
fn spawn_session_cleanup(sessions: Arc<dyn SessionStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sessions.cleanup().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Removed expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

async fn run_sync_users(
    mut config: SsoBridgeConfig,
    api_url: Option<String>,
    api_token: Option<String>,
) {
    init_tracing(&config);

    if api_url.is_some() {
        config.sync.api_url = api_url;
    }
    if api_token.is_some() {
        config.sync.api_token = api_token;
    }
    let Some((api_url, api_token)) = config
        .sync
        .credentials()
        .map(|(url, token)| (url.to_string(), token.to_string()))
    else {
        eprintln!(
            "Error: set sync.api_url and sync.api_token in the config file \
             or pass --api-url and --api-token"
        );
        std::process::exit(1);
    };

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            std::process::exit(1);
        }
    };

    match state.bulk_sync.sync_all(&api_url, &api_token).await {
        Ok(report) => {
            println!(
                "Synced {} of {} users ({} skipped)",
                report.synced, report.total, report.skipped
            );
        }
        Err(e) => {
            eprintln!("Error: bulk sync failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_issue_token(
    config: &SsoBridgeConfig,
    user_id: &str,
    email: &str,
    name: &str,
    role: &str,
    company_id: Option<&str>,
) {
    let issuer = TokenIssuer::new(&config.auth.jwt, &config.issuer);
    match issuer.issue(user_id, email, name, role, company_id) {
        Ok(token) => {
            println!("Token: {token}");
            println!("Login URL: {}", issuer.build_login_url(&token));
        }
        Err(e) => {
            eprintln!("Error: failed to issue token: {e}");
            std::process::exit(1);
        }
    }
}
