mod cli;

use pixshare::{
    config::{self, Config},
    images,
    server::{self, auth},
};
use pixshare_db::pool::{get_conn, init_pool, DbPool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn open_database(config: &Config) -> Result<DbPool> {
    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let db_path = data_dir.join("pixshare.db");
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    Ok(init_pool(&db_path_str)?)
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting pixshare server");

    let db_pool = open_database(&config)?;
    server::start_server(config, db_pool).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "pixshare=trace,pixshare_db=debug,pixshare_common=debug,tower_http=debug".to_string()
        } else {
            "pixshare=debug,pixshare_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Encode { input, output } => encode_file(&input, &output, cli.config.as_deref()),
        Commands::CreateUser {
            username,
            password,
            admin,
        } => create_user(&username, &password, admin, cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("pixshare {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn encode_file(input: &Path, output: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let data = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let encoded = images::encode_for_inline(&data, &config.encoder)?;

    std::fs::write(output, &encoded.bytes)
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Input:  {} bytes", data.len());
    println!(
        "Output: {} bytes, {}x{}, {}",
        encoded.bytes.len(),
        encoded.width,
        encoded.height,
        encoded.mime_type
    );
    match encoded.tier {
        Some(tier) => {
            println!(
                "Tier:   max {}px, quality {:.2}{}",
                tier.max_dimension,
                tier.quality,
                if tier.retried { " (retry pass)" } else { "" }
            );
        }
        None => println!("Tier:   pass-through"),
    }

    Ok(())
}

fn create_user(username: &str, password: &str, admin: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let pool = open_database(&config)?;
    let conn = get_conn(&pool)?;

    let hash = auth::hash_password(password)?;
    let user = pixshare_db::queries::users::create_user(&conn, username, &hash, admin)?;

    println!(
        "Created user {} ({}){}",
        user.username,
        user.id,
        if user.is_admin { " [admin]" } else { "" }
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Public URL: {}", config.server.public_url);
            println!("  Data dir: {:?}", config.server.data_dir);
            println!("  Registration: {}", config.auth.allow_registration);
            println!("  Max upload: {} bytes", config.upload.max_upload_bytes);
            println!(
                "  Inline limit: {} bytes ({} tiers)",
                config.encoder.inline_limit,
                config.encoder.tiers.len()
            );
            println!("  Crawler agents: {}", config.share.crawler_agents.len());
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
