//! Invalidate command - drops a namespace from the configured store

use clap::Args;
use tracing::info;

use crate::infrastructure::services::QueryCache;

use super::load_config;

/// Arguments for the invalidate command
#[derive(Args, Clone, Debug)]
pub struct InvalidateArgs {
    /// Collection namespace to invalidate
    #[arg(long)]
    pub namespace: String,
}

/// Remove every cached result of a namespace
pub async fn run(args: InvalidateArgs) -> anyhow::Result<()> {
    let config = load_config()?;

    let cache = QueryCache::open(&config.cache)?;
    let removed = cache.invalidate_namespace(&args.namespace).await;
    cache.close().await?;

    info!(namespace = %args.namespace, removed, "Invalidation complete");
    println!("{}", removed);

    Ok(())
}
