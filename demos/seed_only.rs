// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seeding without any store.
//!
//! Values come from literal seeds, environment variables and flags only; no
//! monitor is started.
//!
//! To run this example:
//! ```bash
//! export APP_PORT=9090
//! cargo run --example seed_only -- --debug=true
//! ```

use harvestcfg::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let name = Value::<String>::shared(String::new());
    let port = Value::<u16>::shared(0);
    let debug = Value::<bool>::shared(false);

    let config = Config::builder()
        .field(Field::builder("name", name.clone()).seed("harvester-demo").build())
        .field(
            Field::builder("port", port.clone())
                .seed("8080")
                .env("APP_PORT")
                .build(),
        )
        .field(
            Field::builder("debug", debug.clone())
                .seed("false")
                .flag("debug")
                .build(),
        )
        .build()?;

    Seeder::new().seed(&config).await?;

    println!("name:  {}", name.get());
    println!("port:  {}", port.get());
    println!("debug: {}", debug.get());
    Ok(())
}
