// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seeding from Redis and polling it for changes.
//!
//! To run this example, start a local server first:
//! ```bash
//! docker run -d -p 6379:6379 redis:7-alpine
//! cargo run --example redis_monitor
//! ```

use harvestcfg::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn set(key: &str, value: &str) -> std::result::Result<(), redis::RedisError> {
    let client = redis::Client::open(REDIS_URL)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("SET").arg(key).arg(value).query_async(&mut conn).await
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    set("example:retention", "3600").await?;

    let retention = Value::<i64>::shared(0);
    let config = Config::builder()
        .field(
            Field::builder("cache_retention", retention.clone())
                .seed("60")
                .redis("example:retention")
                .build(),
        )
        .build()?;

    let harvester = Harvester::builder(config)
        .with_redis_seed(REDIS_URL)
        .with_redis_monitor(REDIS_URL, Duration::from_millis(200))
        .with_backpressure(Backpressure::BlockFor(Duration::from_secs(1)))
        .build()
        .await?;

    let cancel = CancellationToken::new();
    harvester.harvest(cancel.clone()).await?;
    println!("cache retention after seeding: {}", retention.get());

    set("example:retention", "7200").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("cache retention after update: {}", retention.get());

    cancel.cancel();
    harvester.stopped().await;
    Ok(())
}
