use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Rivulet chat gateway
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "rivulet-server", version, about = "Rivulet chat gateway")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "RIVULET_PORT", default_value = "4620")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "RIVULET_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./rivulet.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RIVULET_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (signing key)
    #[arg(long, env = "RIVULET_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Seconds to wait after a disconnect before declaring a user offline
    #[arg(long, env = "RIVULET_OFFLINE_DEBOUNCE_SECS", default_value = "30")]
    pub offline_debounce_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4620,
            bind_address: "0.0.0.0".to_string(),
            config: "./rivulet.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            offline_debounce_secs: 30,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RIVULET_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("RIVULET_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Rivulet Chat Gateway Configuration
# Place this file at ./rivulet.toml or specify with --config <path>
# All settings can be overridden via environment variables (RIVULET_PORT, etc.)
# or CLI flags (--port, etc.)

# Gateway port (default: 4620)
# port = 4620

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JWT signing key
# data_dir = "./data"

# Seconds between a disconnect and the offline broadcast.
# A reconnect inside this window is treated as continuity: no presence
# churn is emitted to room members.
# offline_debounce_secs = 30
"#
    .to_string()
}
