//! Repocache demo CLI
//!
//! Seeds an in-memory `users` table and walks through cache misses, hits,
//! id replay after an update, and a tag flush.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use repocache_domain::{ModelDefinition, Record, Value};
use repocache_persistence::{
    shared_store, CacheConfig, Direction, MemorySource, MemoryStore, Repository, SharedStore, StrategyKind,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const NAMES: [&str; 8] = ["ada", "grace", "edsger", "barbara", "donald", "frances", "ken", "margaret"];

#[derive(Parser, Debug)]
#[command(name = "repocache-demo")]
#[command(about = "Show query result caching in front of a repository")]
struct Args {
    /// Number of users to seed
    #[arg(short, long, default_value = "8")]
    users: i64,

    /// Cache strategy (id or result); defaults to REPOCACHE_STRATEGY
    #[arg(short, long)]
    strategy: Option<String>,

    /// Cache TTL in seconds; defaults to REPOCACHE_TTL_SECS
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Use the Redis store at REPOCACHE_REDIS_URL instead of memory
    #[arg(long)]
    redis: bool,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.json)?;

    let mut config = CacheConfig::from_env()?;
    if let Some(name) = &args.strategy {
        config.default_strategy = name.parse::<StrategyKind>()?;
    }
    if let Some(secs) = args.ttl_secs {
        config.default_ttl = Duration::from_secs(secs);
    }

    let store = connect_store(&config, args.redis).await?;
    let source = Arc::new(MemorySource::new());
    seed(&source, args.users).await;

    info!(
        strategy = %config.default_strategy,
        ttl_secs = config.default_ttl.as_secs(),
        users = args.users,
        "Starting repocache demo"
    );

    let mut users = Repository::new(
        "UserRepository",
        ModelDefinition::new("User", "users"),
        source.clone(),
        store,
    );
    let strategy = config.default_strategy.prefix();
    let ttl = config.default_ttl;

    // Miss, then hit
    for attempt in 1..=2 {
        let adults = users
            .with_cache(ttl, ["adults"], strategy)?
            .filter("age", ">=", 30_i64)?
            .order_by_key(Direction::Asc)
            .get()
            .await?;
        info!(
            attempt,
            rows = adults.len(),
            statements = source.execution_count().await,
            "Adults loaded"
        );
    }

    // Update a cached row; `id` replays fresh rows, `result` serves the old ones
    let renamed = Value::Int(1);
    source.update("users", "id", &renamed, "name", "ada lovelace").await;
    let first = users
        .with_cache(ttl, ["adults"], strategy)?
        .filter("age", ">=", 30_i64)?
        .order_by_key(Direction::Asc)
        .first_or_fail()
        .await?;
    info!(
        name = %first.get("name").cloned().unwrap_or_default(),
        statements = source.execution_count().await,
        "First adult after rename"
    );

    // Flush and read again
    users.with_cache(ttl, ["adults"], strategy)?.flush_cache().await?;
    let count = users
        .with_cache(ttl, ["adults"], strategy)?
        .filter("age", ">=", 30_i64)?
        .count()
        .await?;
    info!(count, statements = source.execution_count().await, "Adults counted after flush");

    // Keyset iteration
    users
        .chunk_by_id(3, |batch| {
            let ids: Vec<String> = batch
                .iter()
                .filter_map(|r| r.key("id").map(ToString::to_string))
                .collect();
            info!(ids = %ids.join(","), "Batch");
            std::future::ready(true)
        })
        .await?;

    info!(statements = source.execution_count().await, "Demo complete");
    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("repocache_demo=info,repocache_persistence=debug"))?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn connect_store(config: &CacheConfig, redis: bool) -> Result<SharedStore> {
    if redis {
        info!(url = %config.redis_url, prefix = %config.key_prefix, "Connecting to Redis");
        let store = repocache_persistence::RedisTagStore::new(config).await?;
        return Ok(shared_store(store));
    }
    Ok(shared_store(MemoryStore::new()))
}

async fn seed(source: &MemorySource, users: i64) {
    source.create_table("users").await;
    for id in 1..=users {
        let index = usize::try_from(id - 1).unwrap_or_default() % NAMES.len();
        source
            .insert(
                "users",
                Record::new()
                    .with("id", id)
                    .with("name", NAMES[index])
                    .with("age", 18 + (id * 7) % 50),
            )
            .await;
    }
}
