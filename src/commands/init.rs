//! Init command implementation

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where `init` put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitInfo {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

/// Write the default configuration and create the catalog database
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitInfo> {
    let config = Config::with_base_dir(base_dir);
    let config_path = config.paths.config_file.clone();

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    config.validate()?;
    config.save()?;

    let catalog = Catalog::connect(&config).await?;
    catalog.init_schema().await?;
    catalog.close().await;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitInfo {
        config_path,
        db_path: config.paths.db_file,
    })
}

/// Print init result to console
pub fn print_init(info: &InitInfo) {
    println!("✓ shelfish initialized successfully");
    println!("  Config: {}", info.config_path.display());
    println!("  Database: {}", info.db_path.display());
    println!("\nNext steps:");
    println!("  1. Point the [feed] URLs at your collections");
    println!("  2. Import the feeds: shelfish sync");
    println!("  3. Keep things enriched: shelfish serve");
}
