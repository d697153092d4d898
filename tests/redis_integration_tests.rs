// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for Redis seeding and polling using Docker containers.

mod common;

#[cfg(feature = "redis")]
mod redis_tests {
    use harvestcfg::adapters::{RedisStore, RedisWatcher};
    use harvestcfg::prelude::*;
    use std::time::Duration;
    use testcontainers::{core::WaitFor, runners::AsyncRunner, GenericImage, ImageExt};
    use tokio_util::sync::CancellationToken;

    use crate::common as docker_helpers;

    /// Helper to set up a Redis container and return its URL.
    async fn setup_redis_test() -> Option<(testcontainers::ContainerAsync<GenericImage>, String)> {
        if !docker_helpers::is_docker_available() {
            docker_helpers::print_docker_unavailable_warning("Redis integration test");
            return None;
        }

        let redis_image = GenericImage::new("redis", "7-alpine")
            .with_exposed_port(6379.into())
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));

        let container = redis_image.start().await.ok()?;
        let port = container.get_host_port_ipv4(6379).await.ok()?;

        // Give Redis a moment to start up
        tokio::time::sleep(Duration::from_millis(500)).await;

        Some((container, format!("redis://127.0.0.1:{}", port)))
    }

    async fn set(url: &str, key: &str, value: &str) {
        let client = redis::Client::open(url).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redis_getter_and_multi_get() {
        let Some((_container, url)) = setup_redis_test().await else {
            return;
        };
        set(&url, "app:name", "harvest").await;

        let store = RedisStore::connect(&url).await.unwrap();
        assert_eq!(
            store.get("app:name").await.unwrap(),
            (Some("harvest".to_string()), 0)
        );
        assert_eq!(store.get("app:missing").await.unwrap(), (None, 0));

        let values = store
            .multi_get(&["app:name".to_string(), "app:missing".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("harvest".to_string()), None]);
    }

    #[tokio::test]
    async fn test_redis_watcher_emits_changes() {
        let Some((_container, url)) = setup_redis_test().await else {
            return;
        };
        set(&url, "a", "1").await;
        set(&url, "b", "2").await;

        let watcher = RedisWatcher::connect(
            &url,
            Duration::from_millis(100),
            vec!["a".to_string(), "b".to_string()],
        )
        .await
        .unwrap();
        let (changes, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), changes).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            vec![
                Change::new(Source::Redis, "a", "1", 1),
                Change::new(Source::Redis, "b", "2", 1),
            ]
        );

        set(&url, "b", "3").await;
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, vec![Change::new(Source::Redis, "b", "3", 2)]);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test]
    async fn test_binary_value_does_not_stall_polling() {
        let Some((_container, url)) = setup_redis_test().await else {
            return;
        };
        let client = redis::Client::open(url.as_str()).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::cmd("SET")
            .arg("bin")
            .arg(&[0xffu8, 0xfe][..])
            .query_async(&mut conn)
            .await
            .unwrap();
        set(&url, "text", "1").await;

        let store = RedisStore::connect(&url).await.unwrap();
        assert_eq!(
            store.get("bin").await.unwrap(),
            (Some("\u{FFFD}\u{FFFD}".to_string()), 0)
        );

        let watcher = RedisWatcher::connect(
            &url,
            Duration::from_millis(100),
            vec!["bin".to_string(), "text".to_string()],
        )
        .await
        .unwrap();
        let (changes, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), changes).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 2);

        set(&url, "text", "2").await;
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, vec![Change::new(Source::Redis, "text", "2", 2)]);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test]
    async fn test_harvester_seeds_and_polls_redis() {
        let Some((_container, url)) = setup_redis_test().await else {
            return;
        };
        set(&url, "cache:retention", "3600").await;

        let retention = Value::<i64>::shared(0);
        let config = Config::builder()
            .field(
                Field::builder("retention", retention.clone())
                    .seed("60")
                    .redis("cache:retention")
                    .build(),
            )
            .build()
            .unwrap();

        let harvester = Harvester::builder(config)
            .with_redis_seed(&url)
            .with_redis_monitor(&url, Duration::from_millis(100))
            .with_args(Vec::<String>::new())
            .build()
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        harvester.harvest(cancel.clone()).await.unwrap();
        assert_eq!(retention.get(), 3600);

        set(&url, "cache:retention", "7200").await;
        let mut updated = false;
        for _ in 0..50 {
            if retention.get() == 7200 {
                updated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(updated);

        cancel.cancel();
        harvester.stopped().await;
    }
}
