// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seeding from Consul and following a key as it changes.
//!
//! This example demonstrates:
//! - Declaring fields with seed, env, flag and Consul sources
//! - Seeding them once through the harvester
//! - Watching the Consul key and seeing the field follow it
//!
//! To run this example, start a local agent first:
//! ```bash
//! docker run -d -p 8500:8500 hashicorp/consul:1.15
//! cargo run --example consul_monitor -- -loglevel=INFO
//! ```

use harvestcfg::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONSUL_ADDRESS: &str = "127.0.0.1:8500";
const BALANCE_KEY: &str = "harvester/example_03/openingbalance";

async fn put_opening_balance(balance: &str) -> std::result::Result<(), reqwest::Error> {
    reqwest::Client::new()
        .put(format!("http://{}/v1/kv/{}", CONSUL_ADDRESS, BALANCE_KEY))
        .body(balance.to_string())
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    std::env::set_var("ENV_CACHE_RETENTION_SECONDS", "86400");
    put_opening_balance("100.0").await?;

    let index_name = Value::<String>::shared(String::new());
    let cache_retention = Value::<i64>::shared(0);
    let log_level = Value::<String>::shared(String::new());
    let opening_balance = Value::<f64>::shared(0.0);

    let config = Config::builder()
        .field(Field::builder("index_name", index_name.clone()).seed("customers-v1").build())
        .field(
            Field::builder("cache_retention", cache_retention.clone())
                .seed("43200")
                .env("ENV_CACHE_RETENTION_SECONDS")
                .build(),
        )
        .field(
            Field::builder("log_level", log_level.clone())
                .seed("DEBUG")
                .flag("loglevel")
                .build(),
        )
        .field(
            Field::builder("opening_balance", opening_balance.clone())
                .seed("0.0")
                .env("ENV_CONSUL_VAR")
                .consul(BALANCE_KEY)
                .build(),
        )
        .build()?;

    let harvester = Harvester::builder(config)
        .with_consul_seed(CONSUL_ADDRESS, "", "", None)
        .with_consul_monitor(CONSUL_ADDRESS, "", "", None)
        .build()
        .await?;

    let cancel = CancellationToken::new();
    harvester.harvest(cancel.clone()).await?;

    let print = || {
        println!(
            "Config: IndexName: {}, CacheRetention: {}, LogLevel: {}, OpeningBalance: {}",
            index_name.get(),
            cache_retention.get(),
            log_level.get(),
            opening_balance.get()
        )
    };
    print();

    tokio::time::sleep(Duration::from_secs(1)).await;
    put_opening_balance("999.99").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    print();

    cancel.cancel();
    harvester.stopped().await;
    Ok(())
}
