//! Integration tests for live windowed statistics.

use alopex_connlog::{EngineConfig, QueryEngine, StatsFilter, WindowStats};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WINDOW: Duration = Duration::from_millis(300);

fn engine() -> QueryEngine {
    QueryEngine::new(
        EngineConfig::default()
            .with_workers(1)
            .with_poll_interval(Duration::from_millis(10)),
    )
}

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

fn set(hosts: &[&str]) -> BTreeSet<String> {
    hosts.iter().map(|h| h.to_string()).collect()
}

/// Returns the first window that saw any connection, within 20 windows.
fn first_busy_window(windows: &mut impl Iterator<Item = alopex_connlog::Result<WindowStats>>) -> WindowStats {
    windows
        .take(20)
        .map(|stats| stats.unwrap())
        .find(|stats| stats.top_connection_count > 0)
        .expect("no window saw the appended lines")
}

#[test]
fn test_live_window_stats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conn.log");
    // Existing content is not part of a live query.
    std::fs::write(&path, "1 old old\n1 old old\n1 old old\n1 old old\n1 old old\n").unwrap();

    let engine = engine();
    let filter = StatsFilter::new(Some("s1".to_string()), Some("t1".to_string()));
    let mut windows = engine.run_live_query(&path, filter, WINDOW).unwrap();

    append(
        &path,
        "10 s2 t1\n11 s1 t2\n12 s1 t3\n13 s1 t4\n14 s1 t1\n15 s2 t6\n16 s2 t7\nnot a line\n\n",
    );

    let stats = first_busy_window(&mut windows);
    assert_eq!(stats.top_source_hosts, set(&["s1"]));
    assert_eq!(stats.top_connection_count, 4);
    assert_eq!(stats.window_duration, WINDOW);
    assert_eq!(stats.targets_reached_by_filtered_source, Some(set(&["t1", "t2", "t3", "t4"])));
    assert_eq!(stats.sources_reaching_filtered_target, Some(set(&["s1", "s2"])));
}

#[test]
fn test_consecutive_windows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conn.log");
    let engine = engine();

    let windows: Vec<WindowStats> = engine
        .run_live_query(&path, StatsFilter::default(), WINDOW)
        .unwrap()
        .take(3)
        .map(|stats| stats.unwrap())
        .collect();

    let window_millis = WINDOW.as_millis() as i64;
    for pair in windows.windows(2) {
        assert_eq!(pair[1].window_start, pair[0].window_start + window_millis);
        assert_eq!(pair[0].window_end(), pair[1].window_start);
    }
    assert!(windows.iter().all(|w| w.top_source_hosts.is_empty()));
    assert!(windows.iter().all(|w| w.targets_reached_by_filtered_source.is_none()));
}

#[test]
fn test_live_query_creates_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("later.log");
    let engine = engine();

    let mut windows = engine
        .run_live_query(&path, StatsFilter::default(), WINDOW)
        .unwrap();
    assert!(path.exists());

    append(&path, "1 a b\n2 c b\n3 c d\n");
    let stats = first_busy_window(&mut windows);
    assert_eq!(stats.top_source_hosts, set(&["c"]));
    assert_eq!(stats.top_connection_count, 2);
}

#[test]
fn test_slow_consumer_does_not_stall_windows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conn.log");
    let engine = engine();

    let mut windows = engine
        .run_live_query(&path, StatsFilter::default(), Duration::from_millis(50))
        .unwrap();
    std::thread::sleep(Duration::from_millis(400));

    // Windows closed while nobody was reading are already queued.
    let started = Instant::now();
    for _ in 0..4 {
        windows.next().unwrap().unwrap();
    }
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[test]
fn test_drop_stops_promptly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conn.log");
    let engine = QueryEngine::new(
        EngineConfig::default()
            .with_workers(1)
            .with_poll_interval(Duration::from_secs(30)),
    );

    let windows = engine
        .run_live_query(&path, StatsFilter::default(), Duration::from_secs(3600))
        .unwrap();
    let started = Instant::now();
    drop(windows);
    assert!(started.elapsed() < Duration::from_secs(5));
}
