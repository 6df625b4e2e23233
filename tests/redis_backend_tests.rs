//! Integration Tests for the Redis Backend
//!
//! These need a Redis server (REDIS_HOST / REDIS_PORT, default
//! 127.0.0.1:6379) and run with `cargo test -- --ignored`. Every test
//! works in database 15 under its own key prefix.

#![cfg(feature = "redis-backend")]

use std::thread::sleep;
use std::time::Duration;

use mini_cache::backend::RedisBackend;
use mini_cache::config::{Config, RedisConfig};
use mini_cache::{Backend, Cache, MISSING, NEVER_EXPIRE};

// == Helper Functions ==

fn create_test_cache(persistent: bool) -> Cache<RedisBackend> {
    let redis = RedisConfig {
        database: 15,
        persistent,
        ..Config::from_env().redis
    };
    Cache::new(RedisBackend::connect(&redis).unwrap())
}

#[test]
#[ignore = "needs a running Redis server"]
fn test_redis_expiry_scenario() {
    let cache = create_test_cache(false);
    cache.remove("it/expiry/key_of_cache").unwrap();

    cache
        .set("it/expiry/key_of_cache", "value_of_cache", Some(1))
        .unwrap();
    assert_eq!(
        cache.get::<String>("it/expiry/key_of_cache").unwrap().as_deref(),
        Some("value_of_cache")
    );

    sleep(Duration::from_millis(1500));
    assert_eq!(cache.get::<String>("it/expiry/key_of_cache").unwrap(), None);
    assert_eq!(cache.ttl("it/expiry/key_of_cache").unwrap(), MISSING);
}

#[test]
#[ignore = "needs a running Redis server"]
fn test_redis_counter_scenario() {
    let cache = create_test_cache(true);
    cache.remove("it/counter/ctr").unwrap();

    assert_eq!(cache.increment("it/counter/ctr", 1).unwrap(), 1);
    assert_eq!(cache.ttl("it/counter/ctr").unwrap(), NEVER_EXPIRE);
    assert_eq!(cache.increment("it/counter/ctr", 1).unwrap(), 2);
    assert_eq!(cache.increment("it/counter/ctr", 3).unwrap(), 5);
    assert_eq!(cache.decrement("it/counter/ctr", 2).unwrap(), 3);
    assert!(cache.remove("it/counter/ctr").unwrap());
    assert_eq!(cache.get::<i64>("it/counter/ctr").unwrap(), None);
}

#[test]
#[ignore = "needs a running Redis server"]
fn test_redis_set_nx_and_clear() {
    let cache = create_test_cache(false);
    cache.clear("it/clear/").unwrap();

    assert!(cache.set_nx("it/clear/a", "v1").unwrap());
    assert!(!cache.set_nx("it/clear/a", "v2").unwrap());
    cache.set("it/clear/b", &2, None).unwrap();
    cache.set("it/keep", &3, None).unwrap();

    cache.clear("it/clear/").unwrap();
    assert_eq!(cache.get::<String>("it/clear/a").unwrap(), None);
    assert_eq!(cache.get::<i64>("it/clear/b").unwrap(), None);
    assert_eq!(cache.get::<i64>("it/keep").unwrap(), Some(3));
    assert!(cache.backend().remove("it/keep").unwrap());
}
