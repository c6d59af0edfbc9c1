//! Runtime configuration for mlib-catalog
//!
//! Command-line arguments (with environment fallbacks) override the TOML
//! file, which overrides compiled defaults.

use clap::Parser;
use mlib_common::config::{database_path, resolve_root_folder, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "MLIB_ROOT_FOLDER";

pub const DEFAULT_PORT: u16 = 3004;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SLOW_REQUEST_MS: u64 = 500;

/// Command-line arguments for mlib-catalog
#[derive(Parser, Debug, Default)]
#[command(name = "mlib-catalog")]
#[command(about = "Music score catalog service")]
#[command(version)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root folder for the database and uploaded assets
    /// (falls back to MLIB_ROOT_FOLDER)
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MLIB_PORT")]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(short, long, env = "MLIB_BIND_ADDRESS")]
    pub bind: Option<String>,

    /// Bearer token for admin routes; empty disables admin auth
    #[arg(long, env = "MLIB_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub admin_token: Option<String>,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub query_timeout: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub slow_request: Duration,
    pub log_level: String,
}

impl ServiceConfig {
    /// Merge arguments over the TOML file over defaults
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Self {
        let catalog = &toml.catalog;

        let admin_token = args
            .admin_token
            .clone()
            .or_else(|| toml.admin_token.clone())
            .filter(|token| !token.trim().is_empty());

        Self {
            root_folder: resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, toml),
            bind_address: args
                .bind
                .clone()
                .or_else(|| toml.bind_address.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            admin_token,
            cache_ttl: Duration::from_secs(catalog.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            cache_sweep_interval: Duration::from_secs(
                catalog
                    .cache_sweep_interval_secs
                    .unwrap_or(DEFAULT_CACHE_SWEEP_INTERVAL_SECS)
                    .max(1),
            ),
            query_timeout: Duration::from_millis(
                catalog.query_timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
            default_page_size: catalog.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_page_size: catalog.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE),
            slow_request: Duration::from_millis(
                catalog.slow_request_ms.unwrap_or(DEFAULT_SLOW_REQUEST_MS),
            ),
            log_level: toml.logging.level.clone(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        database_path(&self.root_folder)
    }
}
