//! CLI module for the forum query cache
//!
//! Provides subcommands for inspecting and operating a cache:
//! - `key`: print the cache key of a read
//! - `normalize`: print the canonical form of a read
//! - `invalidate`: drop a namespace from the configured store
//! - `demo`: run reads through an in-process cache

pub mod demo;
pub mod inspect;
pub mod invalidate;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::cache::StoreConfig;
use crate::infrastructure::logging::init_logging;

/// Forum query cache - read-through caching for database queries
#[derive(Parser)]
#[command(name = "forum-query-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the cache key for a read
    Key(inspect::KeyArgs),

    /// Print the normalized form of a read
    Normalize(inspect::QueryArgs),

    /// Remove every cached result of a namespace
    Invalidate(invalidate::InvalidateArgs),

    /// Run simulated reads through an in-process cache
    Demo(demo::DemoArgs),
}

/// A read given on the command line as JSON documents
#[derive(Args, Clone, Debug)]
pub struct ReadArgs {
    /// Filter document, e.g. '{"status":"open"}'
    #[arg(long, default_value = "{}")]
    pub filter: String,

    /// Options document, e.g. '{"sort":"-createdAt","limit":5}'
    #[arg(long, default_value = "{}")]
    pub options: String,
}

/// Loads `.env`, the layered configuration and the `CACHE_*` shortcut, then starts logging
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().unwrap_or_default();

    if std::env::var_os("CACHE_STORE_TYPE").is_some() {
        config.cache = config.cache.with_store(StoreConfig::from_env()?);
    }

    init_logging(&config.logging);

    Ok(config)
}
