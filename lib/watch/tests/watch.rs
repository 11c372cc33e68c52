use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use hostio_core::{Error, ErrorKind, Handle, Timeout, TypeBits, WaitStatus};
use hostio_watch::{Watch, WatchEvent, WatchEventKind, WatchFlags, WatchOptions};
use pretty_assertions::assert_eq;
use serial_test::serial;

const PATIENCE: Duration = Duration::from_secs(5);

/// Drain events until `done` holds for what has been collected so far.
fn collect_until(watch: &Watch, done: impl Fn(&[WatchEvent]) -> bool) -> Vec<WatchEvent> {
    let deadline = Instant::now() + PATIENCE;
    let mut events = Vec::new();
    while !done(&events) {
        let left = deadline.saturating_duration_since(Instant::now());
        assert!(!left.is_zero(), "gave up waiting, got {events:?}");
        if watch.wait(Timeout::from(left)).unwrap() == WaitStatus::Signaled {
            while let Some(event) = watch.try_next().unwrap() {
                events.push(event);
            }
        }
    }
    events
}

fn has(kind: WatchEventKind, name: impl AsRef<Path>) -> impl Fn(&[WatchEvent]) -> bool {
    let name = name.as_ref().to_path_buf();
    move |events| events.iter().any(|e| e.kind == kind && e.name == name)
}

fn wait_for_failure(watch: &Watch) -> Error {
    let deadline = Instant::now() + PATIENCE;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        assert!(!left.is_zero(), "watch never failed");
        match watch.wait(Timeout::from(left)) {
            Err(err) => return err,
            Ok(_) => while let Ok(Some(_)) = watch.try_next() {},
        }
    }
}

#[test]
#[serial]
#[tracing_test::traced_test]
fn structural_changes_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let watch = Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap();
    assert_eq!(watch.get_result(None).unwrap(), 0);

    std::fs::write(dir.path().join("a"), b"").unwrap();
    std::fs::create_dir(dir.path().join("d")).unwrap();
    std::fs::rename(dir.path().join("a"), dir.path().join("b")).unwrap();
    std::fs::remove_file(dir.path().join("b")).unwrap();

    let events = collect_until(&watch, |events| events.len() >= 4);
    assert_eq!(
        events,
        vec![
            WatchEvent::new(WatchEventKind::Add, "a"),
            WatchEvent::new(WatchEventKind::Add, "d"),
            WatchEvent::rename("a", "b"),
            WatchEvent::new(WatchEventKind::Remove, "b"),
        ]
    );
    assert!(watch.is_empty());
    assert!(logs_contain("watch opened"));
}

#[test]
#[serial]
fn content_change_is_a_modify() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f");
    std::fs::write(&path, b"before").unwrap();
    let watch = Watch::open(dir.path(), WatchFlags::empty()).unwrap();

    std::fs::write(&path, b"after, and longer").unwrap();
    let events = collect_until(&watch, has(WatchEventKind::Modify, "f"));
    assert!(events.iter().all(|e| e.name == Path::new("f")), "{events:?}");
}

#[test]
#[serial]
fn recursive_watch_follows_new_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("old")).unwrap();
    let watch = Watch::open(dir.path(), WatchFlags::RECURSIVE | WatchFlags::EVENTS_ONLY).unwrap();

    std::fs::write(dir.path().join("old/existing"), b"x").unwrap();
    collect_until(&watch, has(WatchEventKind::Add, Path::new("old").join("existing")));

    std::fs::create_dir(dir.path().join("sub")).unwrap();
    collect_until(&watch, has(WatchEventKind::Add, "sub"));
    std::fs::write(dir.path().join("sub/inner.txt"), b"x").unwrap();
    collect_until(&watch, has(WatchEventKind::Add, Path::new("sub").join("inner.txt")));
}

#[test]
#[serial]
fn non_recursive_watch_ignores_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let watch = Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap();

    std::fs::write(dir.path().join("sub/hidden"), b"x").unwrap();
    std::fs::write(dir.path().join("seen"), b"x").unwrap();
    let events = collect_until(&watch, has(WatchEventKind::Add, "seen"));
    assert_eq!(events, vec![WatchEvent::new(WatchEventKind::Add, "seen")]);
}

#[test]
#[serial]
fn get_result_is_two_phase() {
    let dir = tempfile::tempdir().unwrap();
    let watch = Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap();
    std::fs::write(dir.path().join("x.txt"), b"").unwrap();
    assert_eq!(watch.wait(Timeout::from(PATIENCE)).unwrap(), WaitStatus::Signaled);

    let size = watch.get_result(None).unwrap();
    assert_eq!(size, 8 + "x.txt".len() + 1);
    assert_eq!(watch.next_event_size().unwrap(), Some(size));
    let mut empty: [u8; 0] = [];
    assert_eq!(watch.get_result(Some(&mut empty)).unwrap(), size);

    let mut small = [0u8; 4];
    assert_eq!(
        watch.get_result(Some(&mut small)).unwrap_err().kind(),
        ErrorKind::BufferTooSmall
    );
    assert_eq!(watch.len(), 1);

    let mut buf = vec![0u8; size];
    assert_eq!(watch.get_result(Some(&mut buf)).unwrap(), size);
    assert_eq!(
        WatchEvent::decode(&buf).unwrap(),
        WatchEvent::new(WatchEventKind::Add, "x.txt")
    );
    assert_eq!(watch.get_result(None).unwrap(), 0);
    assert_eq!(watch.wait(Timeout::poll()).unwrap(), WaitStatus::TimedOut);
}

#[test]
#[serial]
fn removing_the_root_fails_the_watch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    std::fs::create_dir(&root).unwrap();
    let watch = Watch::open(&root, WatchFlags::RECURSIVE).unwrap();

    std::fs::remove_dir(&root).unwrap();
    assert_eq!(wait_for_failure(&watch).kind(), ErrorKind::PathNotFound);
    assert_eq!(watch.error(), Some(ErrorKind::PathNotFound));
    assert_eq!(watch.try_next().unwrap_err().kind(), ErrorKind::PathNotFound);
    assert_eq!(watch.get_result(None).unwrap_err().kind(), ErrorKind::PathNotFound);
    assert_eq!(
        watch.wait(Timeout::poll()).unwrap_err().kind(),
        ErrorKind::PathNotFound
    );
}

#[test]
fn opening_a_file_or_missing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, b"").unwrap();
    assert_eq!(
        Watch::open(&file, WatchFlags::empty()).unwrap_err().kind(),
        ErrorKind::PathNotFound
    );
    assert!(
        Watch::open(dir.path().join("missing"), WatchFlags::empty())
            .unwrap_err()
            .kind()
            .is_not_found()
    );
}

#[test]
#[serial]
fn polling_backend_reports_differences() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("old"), b"o").unwrap();
    let mut options = WatchOptions::new();
    options
        .flags(WatchFlags::RECURSIVE | WatchFlags::EVENTS_ONLY)
        .poll_interval(Duration::from_millis(20))
        .force_polling(true);
    let watch = Watch::with_options(dir.path(), &options).unwrap();

    std::fs::create_dir_all(dir.path().join("q/r")).unwrap();
    let events = collect_until(&watch, |events| events.len() >= 2);
    assert_eq!(
        events,
        vec![
            WatchEvent::new(WatchEventKind::Add, "q"),
            WatchEvent::new(WatchEventKind::Add, Path::new("q").join("r")),
        ]
    );

    // No native rename pairing: a rename is a remove and an add.
    std::fs::rename(dir.path().join("old"), dir.path().join("new")).unwrap();
    let events = collect_until(&watch, |events| events.len() >= 2);
    assert_eq!(
        events,
        vec![
            WatchEvent::new(WatchEventKind::Remove, "old"),
            WatchEvent::new(WatchEventKind::Add, "new"),
        ]
    );

    let removed: PathBuf = dir.path().to_path_buf();
    drop(dir);
    assert!(!removed.exists());
    assert_eq!(wait_for_failure(&watch).kind(), ErrorKind::PathNotFound);
}

#[test]
#[serial]
fn watch_handles_are_waitable() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Handle::new(Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap());
    handle.type_check(TypeBits::WATCH | TypeBits::WAITABLE).unwrap();
    assert!(handle.type_check(TypeBits::AIO_REQUEST).is_err());
    assert_eq!(handle.wait(Timeout::from_millis(10)).unwrap(), WaitStatus::TimedOut);

    std::fs::create_dir(dir.path().join("made")).unwrap();
    assert_eq!(handle.wait(Timeout::Infinite).unwrap(), WaitStatus::Signaled);
    let watch = handle.downcast_ref::<Watch>().unwrap();
    assert_eq!(
        watch.try_next().unwrap(),
        Some(WatchEvent::new(WatchEventKind::Add, "made"))
    );
    handle.close();
}

// The polling backend cannot pair moves or see every write.
#[cfg(any(target_os = "linux", target_os = "android", windows))]
mod native {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn append(path: &Path) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(b"+").unwrap();
    }

    #[test]
    #[serial]
    fn every_write_is_reported_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f");
        let g = dir.path().join("g");
        std::fs::write(&f, b"").unwrap();
        std::fs::write(&g, b"").unwrap();
        let watch = Watch::open(dir.path(), WatchFlags::empty()).unwrap();

        append(&f);
        append(&g);
        append(&f);
        let modified = |events: &[WatchEvent]| -> Vec<PathBuf> {
            let mut names: Vec<PathBuf> = events
                .iter()
                .filter(|e| e.kind == WatchEventKind::Modify)
                .map(|e| e.name.clone())
                .collect();
            names.dedup();
            names
        };
        let events = collect_until(&watch, |events| modified(events).len() >= 3);
        assert_eq!(modified(&events), ["f", "g", "f"].map(PathBuf::from));
    }

    #[test]
    #[serial]
    fn moving_out_of_the_tree_is_a_remove() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leaving"), b"x").unwrap();
        let watch = Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap();

        std::fs::rename(dir.path().join("leaving"), outside.path().join("leaving")).unwrap();
        let events = collect_until(&watch, |events| !events.is_empty());
        assert_eq!(events, vec![WatchEvent::new(WatchEventKind::Remove, "leaving")]);
    }

    #[test]
    #[serial]
    fn moving_into_the_tree_is_an_add() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("arriving"), b"x").unwrap();
        let watch = Watch::open(dir.path(), WatchFlags::EVENTS_ONLY).unwrap();

        std::fs::rename(outside.path().join("arriving"), dir.path().join("arriving")).unwrap();
        let events = collect_until(&watch, |events| !events.is_empty());
        assert_eq!(events, vec![WatchEvent::new(WatchEventKind::Add, "arriving")]);
    }

    #[test]
    #[serial]
    fn renamed_directory_reports_under_its_new_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("old")).unwrap();
        let watch =
            Watch::open(dir.path(), WatchFlags::RECURSIVE | WatchFlags::EVENTS_ONLY).unwrap();

        std::fs::rename(dir.path().join("old"), dir.path().join("new")).unwrap();
        let events = collect_until(&watch, |events| !events.is_empty());
        assert_eq!(events, vec![WatchEvent::rename("old", "new")]);

        std::fs::write(dir.path().join("new/file"), b"x").unwrap();
        let events = collect_until(&watch, |events| !events.is_empty());
        assert_eq!(
            events,
            vec![WatchEvent::new(WatchEventKind::Add, Path::new("new").join("file"))]
        );
    }
}
