mod cli;

use ifilm::{
    cache::ResponseCache,
    config::{self, Config},
    jellyfin::{CacheTtls, JellyfinClient},
    server, sync,
};
use ifilm_common::ConfigId;
use ifilm_db::pool::{init_pool, DbPool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Database file: `[server] database_path`, else `ifilm.db` next to the
/// config file, else in the working directory.
fn database_path(config: &Config, config_path: Option<&Path>) -> PathBuf {
    if let Some(ref path) = config.server.database_path {
        return PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    }

    let data_dir = config_path
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    data_dir.join("ifilm.db")
}

fn open_database(config: &Config, config_path: Option<&Path>) -> Result<DbPool> {
    let db_path = database_path(config, config_path);
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    init_pool(&db_path_str).with_context(|| format!("Failed to open database {}", db_path_str))
}

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting iFilm server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let db_pool = open_database(&config, config_path)?;
    server::start_server(config, db_pool).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ifilm=trace,ifilm_db=debug,ifilm_common=debug,tower_http=debug".to_string()
        } else {
            "ifilm=debug,ifilm_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Ping => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(ping(cli.config.as_deref()))
        }
        Commands::Sync { config_id } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sync_libraries(&config_id, cli.config.as_deref()))
        }
        Commands::Version => {
            println!("ifilm {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Public URL: {}",
                config.server.public_url.as_deref().unwrap_or("(from request headers)")
            );
            match config.jellyfin {
                Some(ref jellyfin) => println!("  Jellyfin: {}", jellyfin.url),
                None => println!("  Jellyfin: (from database)"),
            }
            println!(
                "  Proxy account: {}",
                if config.proxy.credentials().is_some() { "configured" } else { "none (API key)" }
            );
            println!(
                "  Cache TTLs: {}s default, {}s items",
                config.cache.default_ttl_secs, config.cache.item_ttl_secs
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

async fn ping(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let db_pool = open_database(&config, config_path)?;

    let connection = server::resolve_connection(&config, &db_pool)
        .context("No Jellyfin server to ping")?;
    let client = JellyfinClient::connect(
        &connection,
        Arc::new(ResponseCache::new()),
        CacheTtls::from(&config.cache),
    );

    let info = client
        .system_info()
        .await
        .with_context(|| format!("Jellyfin at {} is not reachable", connection.server_url))?;

    println!("✓ Connected to {}", connection.server_url);
    println!("  Server: {}", info.server_name.as_deref().unwrap_or("unknown"));
    println!("  Version: {}", info.version.as_deref().unwrap_or("unknown"));
    Ok(())
}

async fn sync_libraries(config_id: &str, config_path: Option<&Path>) -> Result<()> {
    let id: ConfigId = config_id
        .parse()
        .with_context(|| format!("Invalid config ID: {}", config_id))?;

    let config = config::load_config_or_default(config_path)?;
    let db_pool = open_database(&config, config_path)?;

    let report = sync::sync_config(&db_pool, id, CacheTtls::from(&config.cache)).await?;

    println!("Synced {} libraries ({} failed)", report.synced, report.failed);
    for library in &report.libraries {
        println!(
            "  {} [{}] {} items{}",
            library.library_name,
            library.collection_type,
            library.item_count,
            if library.is_visible { "" } else { " (hidden)" }
        );
    }
    for failure in &report.failures {
        println!("  ✗ {}: {}", failure.library_name, failure.reason);
    }
    Ok(())
}
