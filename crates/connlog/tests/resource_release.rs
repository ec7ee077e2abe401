//! Process-level check that dropped queries leave no open descriptors.
//!
//! Kept as the only test of this binary so no concurrent test opens or
//! closes descriptors while counting.

#![cfg(target_os = "linux")]

use alopex_connlog::{BoundedQuery, EngineConfig, QueryEngine, StatsFilter};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

fn threads() -> usize {
    std::fs::read_dir("/proc/self/task").unwrap().count()
}

/// Exited threads can linger in `/proc` for a moment after `join` returns.
fn wait_for_threads(expected: usize) -> usize {
    for _ in 0..100 {
        if threads() == expected {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    threads()
}

#[test]
fn test_dropped_queries_release_descriptors_and_threads() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conn.log");
    let content: String = (0..50_000).map(|i| format!("{} h{} db\n", i * 10, i % 17)).collect();
    std::fs::write(&path, content).unwrap();

    let engine = QueryEngine::new(
        EngineConfig::default()
            .with_workers(3)
            .with_channel_capacity(4)
            .with_poll_interval(Duration::from_millis(10)),
    );
    let fds_before = open_fds();
    let threads_before = threads();

    // Live query, cancelled after one window with data.
    let mut live = engine
        .run_live_query(&path, StatsFilter::default(), Duration::from_millis(100))
        .unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "1 a b").unwrap();
    drop(file);
    assert!(live.next().unwrap().is_ok());
    assert!(threads() > threads_before);
    drop(live);

    // Parallel query abandoned mid-stream.
    let query = BoundedQuery::new("db", 0, i64::MAX / 2);
    let mut parallel = engine.scan_parallel(&path, &query, 6).unwrap();
    for _ in 0..10 {
        assert!(parallel.next().unwrap().is_ok());
    }
    drop(parallel);

    // Sequential query abandoned mid-stream.
    let mut sequential = engine.scan(&path, &query.clone().with_presearch(true)).unwrap();
    assert!(sequential.next().unwrap().is_ok());
    drop(sequential);

    assert_eq!(open_fds(), fds_before);
    assert_eq!(wait_for_threads(threads_before), threads_before);
}
