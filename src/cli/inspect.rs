//! Key and normalize commands - offline inspection of a read

use clap::Args;

use crate::domain::cache::CacheKeyBuilder;
use crate::domain::query::{QueryNormalizer, QueryOptions, ReadDescriptor};

use super::{load_config, ReadArgs};

/// Arguments for the key command
#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    /// Collection namespace
    #[arg(long)]
    pub namespace: String,

    #[command(flatten)]
    pub read: ReadArgs,
}

/// Arguments for the normalize command
#[derive(Args, Clone, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub read: ReadArgs,
}

/// Print the cache key for a read
pub async fn run_key(args: KeyArgs) -> anyhow::Result<()> {
    load_config()?;

    let (descriptor, options) = parse_read(&args.read)?;
    let key = CacheKeyBuilder::new().derive(&args.namespace, &descriptor, &options)?;

    println!("{}", key);
    Ok(())
}

/// Print the normalized form of a read
pub async fn run_normalize(args: QueryArgs) -> anyhow::Result<()> {
    let config = load_config()?;

    let (descriptor, options) = parse_read(&args.read)?;
    let normalized =
        QueryNormalizer::with_config(config.cache.normalizer).normalize(&descriptor, &options);

    println!("{}", serde_json::to_string_pretty(&normalized)?);
    Ok(())
}

pub(crate) fn parse_read(read: &ReadArgs) -> anyhow::Result<(ReadDescriptor, QueryOptions)> {
    let descriptor = serde_json::from_str(&read.filter)
        .map_err(|e| anyhow::anyhow!("Invalid filter document: {}", e))?;
    let options = serde_json::from_str(&read.options)
        .map_err(|e| anyhow::anyhow!("Invalid options document: {}", e))?;

    Ok((descriptor, options))
}
