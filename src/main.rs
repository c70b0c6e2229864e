use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use rivulet_server::auth::cache::{CredentialCache, MemoryCredentialCache};
use rivulet_server::auth::token;
use rivulet_server::config::{generate_config_template, Config};
use rivulet_server::directory::{MembershipDirectory, MemoryDirectory};
use rivulet_server::routes;
use rivulet_server::state::AppState;
use rivulet_server::store::{MemoryMessageStore, MessageStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "rivulet_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "rivulet_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Rivulet gateway v{} starting", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.data_dir)?;
    let jwt_secret = token::load_or_generate_signing_key(&config.data_dir)?;

    // Collaborators. The in-memory implementations serve standalone runs;
    // a deployment embeds the gateway and supplies its own store/directory.
    let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
    let directory: Arc<dyn MembershipDirectory> = Arc::new(MemoryDirectory::new());
    let tokens: Arc<dyn CredentialCache> = Arc::new(MemoryCredentialCache::new());

    let state = AppState::new(
        jwt_secret,
        store,
        directory,
        tokens,
        Duration::from_secs(config.offline_debounce_secs),
    );

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
