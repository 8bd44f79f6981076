//! Integration tests for the monitor against a real file system.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use fswatch_monitor::{
    Change, ChangeType, FilterOptions, Monitor, MonitorConfig, MonitorEvent, Subscription, Topic,
};
use tempfile::TempDir;

const DEBOUNCE: Duration = Duration::from_millis(200);
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn monitor_with(filter: FilterOptions) -> Monitor {
    Monitor::new(MonitorConfig {
        debounce: DEBOUNCE,
        filter,
        ..MonitorConfig::default()
    })
    .unwrap()
}

/// Wait for the next change event.
async fn next_change(sub: &mut Subscription) -> Change {
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, sub.recv())
            .await
            .expect("timed out waiting for change")
            .expect("event stream closed");
        if let MonitorEvent::Change(change) = event {
            return change;
        }
    }
}

/// Assert that no change arrives for a while.
async fn assert_no_change(sub: &mut Subscription, quiet: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(quiet, sub.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

fn append(path: &Path, data: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

/// Create, burst-modify, then delete a file and observe one event per phase.
#[tokio::test]
async fn test_file_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);

    let file = root.join("a.txt");
    File::create(&file).unwrap();

    let created = next_change(&mut changes).await;
    assert_eq!(created.change_type, ChangeType::Created);
    assert_eq!(created.filename, "a.txt");
    assert_eq!(created.directory, root);
    assert!(created.stats.is_some());
    assert!(created.old_stats.is_none());

    append(&file, b"one\n");
    tokio::time::sleep(Duration::from_millis(20)).await;
    append(&file, b"two\n");

    let modified = next_change(&mut changes).await;
    assert_eq!(modified.change_type, ChangeType::Modified);
    assert_eq!(modified.stats.unwrap().size, 8);
    assert_no_change(&mut changes, DEBOUNCE * 3).await;

    fs::remove_file(&file).unwrap();

    let deleted = next_change(&mut changes).await;
    assert_eq!(deleted.change_type, ChangeType::Deleted);
    assert!(deleted.stats.is_none());
    assert!(deleted.old_stats.is_some());

    let history = monitor.get_changes_for_path(&file, None);
    let types: Vec<ChangeType> = history.iter().map(|c| c.change_type).collect();
    assert_eq!(
        types,
        vec![ChangeType::Deleted, ChangeType::Modified, ChangeType::Created]
    );

    let stats = monitor.get_stats();
    assert_eq!(stats.emitted_changes(), 3);
    assert!(stats.total_changes >= 3);
    assert_eq!(stats.total_changes, stats.filtered_changes + stats.accepted_changes);

    monitor.shutdown();
}

/// Excluded extensions are counted but never emitted or recorded.
#[tokio::test]
async fn test_excluded_extension_is_filtered() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions {
        exclude_extensions: vec![".log".to_string()],
        ..FilterOptions::default()
    });
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);

    File::create(root.join("app.log")).unwrap();

    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while monitor.get_stats().filtered_changes == 0 {
        assert!(tokio::time::Instant::now() < deadline, "change never filtered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_no_change(&mut changes, DEBOUNCE * 2).await;
    assert!(monitor.get_history(None).is_empty());
    assert_eq!(monitor.get_stats().emitted_changes(), 0);

    monitor.shutdown();
}

/// Pre-existing entries are part of the baseline, not new files.
#[tokio::test]
async fn test_existing_files_are_not_created() {
    let tmp = TempDir::new().unwrap();
    let existing = tmp.path().join("existing.txt");
    fs::write(&existing, "before").unwrap();

    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);
    assert!(monitor.get_stats().tracked_files >= 1);

    append(&root.join("existing.txt"), b" after");

    let change = next_change(&mut changes).await;
    assert_eq!(change.change_type, ChangeType::Modified);
    assert_eq!(change.filename, "existing.txt");

    monitor.shutdown();
}

/// New directories are reported as such and are watched recursively.
#[tokio::test]
async fn test_new_directory_is_followed() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);

    let sub = root.join("sub");
    fs::create_dir(&sub).unwrap();

    let dir = next_change(&mut changes).await;
    assert_eq!(dir.change_type, ChangeType::DirectoryCreated);
    assert_eq!(dir.path, sub);

    File::create(sub.join("inner.txt")).unwrap();
    let inner = next_change(&mut changes).await;
    assert_eq!(inner.change_type, ChangeType::Created);
    assert_eq!(inner.directory, sub);

    monitor.shutdown();
}

/// Nothing is emitted for a root after it is unwatched.
#[tokio::test]
async fn test_unwatch_stops_changes() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut events = monitor.subscribe();

    assert!(monitor.unwatch(&root).unwrap());
    File::create(root.join("late.txt")).unwrap();

    loop {
        match tokio::time::timeout(DEBOUNCE * 3, events.recv()).await {
            Ok(Some(MonitorEvent::Change(change))) => panic!("unexpected change: {change:?}"),
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
    assert!(monitor.watched_paths().is_empty());

    monitor.shutdown();
}

/// A change still being debounced at shutdown is never emitted.
#[tokio::test]
async fn test_shutdown_drops_pending_change() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut events = monitor.subscribe();

    File::create(root.join("pending.txt")).unwrap();
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while monitor.get_stats().pending_changes == 0 {
        assert!(tokio::time::Instant::now() < deadline, "change never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    monitor.shutdown();
    monitor.shutdown();
    tokio::time::sleep(DEBOUNCE * 2).await;

    let names: Vec<&str> = std::iter::from_fn(|| events.try_recv())
        .map(|e| e.name())
        .filter(|name| *name != "watching")
        .collect();
    assert_eq!(names, vec!["shutting-down", "shutdown"]);
    assert!(monitor.get_history(None).is_empty());
}

/// Changes queued by the watcher but not yet consumed are dropped by unwatch.
#[tokio::test]
async fn test_unwatch_drops_queued_changes() {
    let tmp = TempDir::new().unwrap();
    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);

    File::create(root.join("queued.txt")).unwrap();
    // block the runtime so the notification is queued but not consumed
    std::thread::sleep(Duration::from_millis(300));
    assert!(monitor.unwatch(&root).unwrap());

    assert_no_change(&mut changes, DEBOUNCE * 3).await;
    assert!(monitor.get_history(None).is_empty());
    assert_eq!(monitor.get_stats().pending_changes, 0);

    monitor.shutdown();
}

/// A rename reports the old path deleted with its baseline and the new path
/// created, each exactly once.
#[tokio::test]
async fn test_rename_is_delete_plus_create() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("old.txt"), "payload").unwrap();

    let monitor = monitor_with(FilterOptions::default());
    let root = monitor.watch(tmp.path()).unwrap();
    let mut changes = monitor.subscribe_to(Topic::Change);

    fs::rename(root.join("old.txt"), root.join("new.txt")).unwrap();

    let mut seen = vec![next_change(&mut changes).await, next_change(&mut changes).await];
    seen.sort_by(|a, b| a.filename.cmp(&b.filename));
    assert_no_change(&mut changes, DEBOUNCE * 2).await;

    let (created, deleted) = (&seen[0], &seen[1]);
    assert_eq!(created.filename, "new.txt");
    assert_eq!(created.change_type, ChangeType::Created);
    assert_eq!(deleted.filename, "old.txt");
    assert_eq!(deleted.change_type, ChangeType::Deleted);
    assert_eq!(deleted.old_stats.map(|s| s.size), Some(7));
    assert!(deleted.stats.is_none());

    let stats = monitor.get_stats();
    assert_eq!(stats.total_changes, 2);
    assert_eq!(stats.emitted_changes(), 2);

    monitor.shutdown();
}
