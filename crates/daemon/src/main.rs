//! adchain provider daemon.

use adchain_core::config::{
    AnnounceConfig, AppConfig, EngineConfig, IdentityConfig, PrivateKeyConfig, StorageConfig,
};
use adchain_engine::Engine;
use adchain_signer::{AdvertisementSigner, Signer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// adchain - signed advertisement chain provider
#[derive(Parser, Debug)]
#[command(name = "adchaind")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "ADCHAIN_CONFIG",
        default_value = "config/adchain.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an initial configuration file and provider identity
    Init {
        /// How new heads are announced
        #[arg(long, value_enum, default_value_t = AnnounceKind::Http)]
        announce: AnnounceKind,
        /// Where to write the private key (defaults to next to the config file)
        #[arg(long)]
        key_path: Option<PathBuf>,
        /// Datastore directory (defaults to next to the config file)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Name recorded with the generated key
        #[arg(long, default_value = "provider")]
        key_name: String,
    },
    /// Run the engine until interrupted (default)
    Daemon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum AnnounceKind {
    Disabled,
    Gossip,
    Http,
}

impl AnnounceKind {
    fn to_config(self) -> AnnounceConfig {
        match self {
            Self::Disabled => AnnounceConfig::Disabled,
            Self::Gossip => AnnounceConfig::Gossip {
                topic: "/indexer/ingest/mainnet".to_string(),
                extra_data: None,
                capacity: 64,
            },
            Self::Http => AnnounceConfig::Http {
                listen_addr: "0.0.0.0:3104".to_string(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Init {
            announce,
            key_path,
            data_dir,
            key_name,
        } => {
            let options = InitOptions {
                announce,
                key_path,
                data_dir,
                key_name,
            };
            let (config, provider_id) = init_config(&cli.config, options).await?;
            println!("Configuration written to: {}", cli.config.display());
            if let PrivateKeyConfig::File { path } = &config.identity.private_key {
                println!("Private key written to: {}", path.display());
            }
            println!("\nProvider ID:");
            println!("{provider_id}");
            Ok(())
        }
        Commands::Daemon => {
            tracing::info!("adchain v{}", env!("CARGO_PKG_VERSION"));
            let config = load_config(&cli.config)?;
            let engine = build_engine(&config).await?;
            engine.start().await.context("failed to start engine")?;
            tracing::info!(
                provider_id = %engine.provider_id(),
                announce = config.engine.announce.kind(),
                "Engine started"
            );

            shutdown_signal().await;
            tracing::info!("Shutdown signal received, stopping engine");

            engine.shutdown().await.context("engine shutdown failed")?;
            tracing::info!("Engine stopped");
            Ok(())
        }
    }
}

/// Load configuration from the file (if present) and `ADCHAIN_` variables.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path.display());
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("ADCHAIN_") && key != "ADCHAIN_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: adchaind --config /path/to/adchain.toml (see `adchaind init`)\n  \
             2. Environment variables: ADCHAIN_STORAGE__TYPE=memory adchaind\n\n\
             Set ADCHAIN_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("ADCHAIN_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    Ok(config)
}

/// Open storage, load the identity and construct an idle engine.
async fn build_engine(config: &AppConfig) -> Result<Engine> {
    let store = adchain_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = store.backend_name(), "Datastore ready");

    let signer = load_signer(&config.identity).await?;
    Engine::new(config.engine.clone(), store, Arc::new(signer))
        .context("failed to create engine")
}

async fn load_signer(config: &IdentityConfig) -> Result<AdvertisementSigner> {
    match &config.private_key {
        PrivateKeyConfig::File { path } => {
            let key_data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read key file: {}", path.display()))?;
            let signer = AdvertisementSigner::from_secret_key(key_data.trim())
                .context("failed to parse private key")?;
            tracing::info!("Loaded provider key: {}", signer.key_name());
            Ok(signer)
        }
        PrivateKeyConfig::Env { var } => {
            let key_data =
                std::env::var(var).with_context(|| format!("private key env var not set: {var}"))?;
            let signer = AdvertisementSigner::from_secret_key(key_data.trim())
                .context("failed to parse private key")?;
            tracing::info!("Loaded provider key from env: {}", signer.key_name());
            Ok(signer)
        }
        PrivateKeyConfig::Generate => {
            tracing::warn!("Generating ephemeral provider key (not suitable for production)");
            let signer = AdvertisementSigner::generate(&config.key_name);
            tracing::info!("Provider ID: {}", signer.provider_id());
            Ok(signer)
        }
        PrivateKeyConfig::Value { key } => {
            tracing::warn!("Using inline provider key (not recommended for production)");
            let signer = AdvertisementSigner::from_secret_key(key.trim())
                .context("failed to parse private key")?;
            tracing::info!("Loaded provider key: {}", signer.key_name());
            Ok(signer)
        }
    }
}

#[derive(Debug)]
struct InitOptions {
    announce: AnnounceKind,
    key_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    key_name: String,
}

/// Write a fresh configuration and identity. Refuses to overwrite an
/// existing configuration file.
async fn init_config(config_path: &Path, options: InitOptions) -> Result<(AppConfig, String)> {
    if config_path.exists() {
        anyhow::bail!(
            "configuration already initialized at {}",
            config_path.display()
        );
    }

    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let key_path = options
        .key_path
        .unwrap_or_else(|| base.join("identity.key"));
    let data_dir = options.data_dir.unwrap_or_else(|| base.join("datastore"));

    let signer = AdvertisementSigner::generate(&options.key_name);
    write_private(&key_path, &signer.secret_key())
        .await
        .with_context(|| format!("failed to write key to {}", key_path.display()))?;

    let config = AppConfig {
        engine: EngineConfig {
            announce: options.announce.to_config(),
            ..EngineConfig::default()
        },
        storage: StorageConfig::Filesystem { path: data_dir },
        identity: IdentityConfig {
            key_name: options.key_name,
            private_key: PrivateKeyConfig::File { path: key_path },
        },
    };
    let contents = toml::to_string_pretty(&config).context("failed to serialize config")?;
    write_private(config_path, &contents)
        .await
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    tracing::info!(
        config_path = %config_path.display(),
        provider_id = %signer.provider_id(),
        "Initialized provider configuration"
    );
    Ok((config, signer.provider_id()))
}

async fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;

    // Set restrictive permissions (0600) since the file may hold key material
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
