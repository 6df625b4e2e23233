//! Integration Tests for the File Backend
//!
//! Exercises the public cache API end-to-end against a temporary
//! directory, including concurrent counter updates from many threads.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, sleep};
use std::time::Duration;

use mini_cache::config::{Config, Driver};
use mini_cache::{Backend, Cache, CacheError, FileBackend, MISSING, NEVER_EXPIRE};
use tempfile::TempDir;

// == Helper Functions ==

fn create_test_cache() -> (TempDir, Cache<FileBackend>) {
    let dir = TempDir::new().unwrap();
    let cache = Cache::new(FileBackend::new(dir.path().join("cache"), "cache"));
    (dir, cache)
}

// == Expiry Scenario ==

#[test]
fn test_value_expires_after_ttl() {
    let (_dir, cache) = create_test_cache();

    cache.set("key_of_cache", "value_of_cache", Some(1)).unwrap();
    assert_eq!(
        cache.get::<String>("key_of_cache").unwrap().as_deref(),
        Some("value_of_cache")
    );
    let ttl = cache.ttl("key_of_cache").unwrap();
    assert!(ttl > 0 && ttl <= 1);

    sleep(Duration::from_millis(1500));

    assert_eq!(cache.get::<String>("key_of_cache").unwrap(), None);
    assert_eq!(cache.ttl("key_of_cache").unwrap(), MISSING);
}

#[test]
fn test_never_expiring_value() {
    let (_dir, cache) = create_test_cache();
    cache.set("pinned", "v", Some(NEVER_EXPIRE)).unwrap();
    assert_eq!(cache.ttl("pinned").unwrap(), NEVER_EXPIRE);
}

// == Counter Scenario ==

#[test]
fn test_counter_scenario() {
    let (_dir, cache) = create_test_cache();

    assert_eq!(cache.increment("ctr", 1).unwrap(), 1);
    assert_eq!(cache.ttl("ctr").unwrap(), NEVER_EXPIRE);
    assert_eq!(cache.increment("ctr", 1).unwrap(), 2);
    assert_eq!(cache.increment("ctr", 3).unwrap(), 5);
    assert!(cache.remove("ctr").unwrap());
    assert_eq!(cache.get::<i64>("ctr").unwrap(), None);
}

#[test]
fn test_counter_keeps_remaining_ttl() {
    let (_dir, cache) = create_test_cache();
    cache.set("visits", &10, Some(100)).unwrap();

    assert_eq!(cache.increment("visits", 1).unwrap(), 11);
    let ttl = cache.ttl("visits").unwrap();
    assert!(ttl > 90 && ttl <= 100, "ttl was {}", ttl);
}

#[test]
fn test_concurrent_increments_are_serialized() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path(), "cache"));
    let threads = 8;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    backend.increment("hot", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.get("hot").unwrap(), Some(b"200".to_vec()));
}

#[test]
fn test_concurrent_set_nx_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path(), "cache"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || backend.set_nx("lock", format!("{}", i).as_bytes()).unwrap())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
}

#[test]
fn test_lazy_purge_never_deletes_rewritten_records() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path(), "cache"));
    let stop = Arc::new(AtomicBool::new(false));

    // Readers keep hitting the expired state and purging it.
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    backend.get("k").unwrap();
                    backend.ttl("ctr").unwrap();
                }
            })
        })
        .collect();

    let mut lost_values = 0;
    let mut lost_counters = 0;
    for _ in 0..2000 {
        backend.set("k", b"stale", 0).unwrap();
        backend.set("k", b"live", NEVER_EXPIRE).unwrap();
        if backend.get("k").unwrap().is_none() {
            lost_values += 1;
        }

        backend.set("ctr", b"9", 0).unwrap();
        assert_eq!(backend.increment("ctr", 1).unwrap(), 1);
        if backend.get("ctr").unwrap() != Some(b"1".to_vec()) {
            lost_counters += 1;
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!((lost_values, lost_counters), (0, 0));
}

#[test]
fn test_sweep_during_writes_keeps_live_records() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path(), "cache"));
    let stop = Arc::new(AtomicBool::new(false));

    let sweeper = {
        let backend = Arc::clone(&backend);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                backend.purge_expired().unwrap();
            }
        })
    };

    let mut lost = 0;
    for i in 0..500 {
        let key = format!("batch/{}", i % 5);
        backend.set(&key, b"old", 0).unwrap();
        backend.set(&key, b"new", 60).unwrap();
        if backend.get(&key).unwrap().is_none() {
            lost += 1;
        }
    }

    stop.store(true, Ordering::Relaxed);
    sweeper.join().unwrap();
    assert_eq!(lost, 0);
}

// == Set If Absent / Remove ==

#[test]
fn test_set_nx_does_not_overwrite() {
    let (_dir, cache) = create_test_cache();
    assert!(cache.set_nx("k", "v1").unwrap());
    assert!(!cache.set_nx("k", "v2").unwrap());
    assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v1"));
}

#[test]
fn test_remove_reports_existence_once() {
    let (_dir, cache) = create_test_cache();
    cache.set("k", "v", None).unwrap();
    assert!(cache.remove("k").unwrap());
    assert!(!cache.remove("k").unwrap());
}

// == Clear ==

#[test]
fn test_clear_prefix_leaves_other_keys() {
    let (_dir, cache) = create_test_cache();
    for key in ["user/1/name", "user/1/mail", "user/2/name", "users", "post/1"] {
        cache.set(key, key, None).unwrap();
    }

    cache.clear("user/1").unwrap();
    assert_eq!(cache.get::<String>("user/1/name").unwrap(), None);
    assert_eq!(cache.get::<String>("user/1/mail").unwrap(), None);
    assert!(cache.get::<String>("user/2/name").unwrap().is_some());
    assert!(cache.get::<String>("users").unwrap().is_some());

    cache.clear("user").unwrap();
    assert_eq!(cache.get::<String>("user/2/name").unwrap(), None);
    assert_eq!(cache.get::<String>("users").unwrap(), None);
    assert!(cache.get::<String>("post/1").unwrap().is_some());
}

#[test]
fn test_clear_unknown_prefix_is_noop() {
    let (_dir, cache) = create_test_cache();
    cache.clear("nothing/here").unwrap();
}

#[test]
fn test_flush_removes_everything() {
    let (_dir, cache) = create_test_cache();
    cache.set("a", &1, None).unwrap();
    cache.set("b/c", &2, None).unwrap();

    cache.flush().unwrap();
    assert_eq!(cache.get::<i64>("a").unwrap(), None);
    assert_eq!(cache.get::<i64>("b/c").unwrap(), None);
    assert!(cache.backend().root().is_dir());
}

// == On-disk Format ==

#[test]
fn test_record_file_layout() {
    let (_dir, cache) = create_test_cache();
    cache.set("report/daily", "ok", Some(NEVER_EXPIRE)).unwrap();

    let path = cache.backend().root().join("report/daily.cache");
    let bytes = fs::read(&path).unwrap();

    assert!(bytes.starts_with(b"<?php\n//-00000000001"));
    assert!(bytes.ends_with(b"\"ok\"\n?>"));
}

#[test]
fn test_custom_extension() {
    let dir = TempDir::new().unwrap();
    let backend = FileBackend::new(dir.path(), ".txt");
    backend.set("k", b"v", 60).unwrap();

    assert!(dir.path().join("k.txt").is_file());
    assert!(!dir.path().join("k.cache").exists());
}

// == Errors ==

#[test]
fn test_keys_may_not_escape_root() {
    let (_dir, cache) = create_test_cache();
    assert!(matches!(
        cache.set("../outside", "v", None),
        Err(CacheError::InvalidArgument(_))
    ));
}

#[test]
fn test_invalid_ttl_rejected() {
    let (_dir, cache) = create_test_cache();
    assert!(matches!(
        cache.set("k", "v", Some(-5)),
        Err(CacheError::InvalidArgument(_))
    ));
}

// == Configuration ==

#[test]
fn test_config_opens_file_cache() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        driver: Driver::File,
        cache_dir: dir.path().to_path_buf(),
        file_ext: "rec".to_string(),
        ..Config::default()
    };

    let cache = config.open_cache().unwrap();
    cache.set("k", &1, None).unwrap();
    assert!(dir.path().join("k.rec").is_file());
}
