use diskscope::{ScanPath, Scanner, ScannerError};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_filesystem() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    fs::write(root.join("file1.txt"), vec![0u8; 10]).unwrap();
    fs::write(root.join("file2.txt"), vec![0u8; 20]).unwrap();

    fs::create_dir(root.join("subdir")).unwrap();
    fs::write(root.join("subdir/file3.txt"), vec![0u8; 30]).unwrap();
    fs::write(root.join("subdir/large.bin"), vec![0u8; 1024]).unwrap();

    fs::create_dir(root.join("subdir/nested")).unwrap();
    fs::write(root.join("subdir/nested/deep.txt"), vec![0u8; 17]).unwrap();

    fs::create_dir(root.join("empty_dir")).unwrap();

    temp_dir
}

fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut done: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn wait_idle(scanner: &Scanner) {
    assert!(
        wait_until(Duration::from_secs(30), || !scanner.is_running()),
        "scan did not finish in time"
    );
}

fn listing(scanner: &Scanner, path: &ScanPath) -> Vec<(String, i64)> {
    let db = scanner.file_db();
    let mut out = Vec::new();
    assert!(db.process_entry(path, |view| {
        view.for_each_child(|child| {
            out.push((child.name().to_string(), child.size()));
            true
        });
    }));
    out
}

#[test]
fn unopenable_path_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("not_there");
    let result = Scanner::new(missing.to_str().unwrap());
    assert!(matches!(result, Err(ScannerError::CantOpenDir)));

    let file_path = temp_dir.path().join("plain.txt");
    fs::write(&file_path, b"data").unwrap();
    assert!(matches!(
        Scanner::new(file_path.to_str().unwrap()),
        Err(ScannerError::CantOpenDir)
    ));
}

#[test]
fn empty_subtree_scan() {
    let temp_dir = TempDir::new().unwrap();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    assert_eq!(scanner.dir_count(), 1);
    assert_eq!(scanner.file_count(), 0);
    assert_eq!(scanner.scan_progress(), 100);

    let root = scanner.root_path().unwrap();
    assert_eq!(listing(&scanner, &root), Vec::<(String, i64)>::new());

    let (used, _, _) = scanner.get_space();
    assert_eq!(used, 0);
}

#[test]
fn flat_listing_is_ordered_by_size() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a"), vec![0u8; 10]).unwrap();
    fs::write(temp_dir.path().join("b"), vec![0u8; 20]).unwrap();
    fs::write(temp_dir.path().join("c"), vec![0u8; 30]).unwrap();

    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    assert_eq!(scanner.file_count(), 3);
    let root = scanner.root_path().unwrap();
    assert_eq!(scanner.file_db().find_entry(&root).unwrap().size, 60);
    assert_eq!(
        listing(&scanner, &root),
        vec![
            ("c".to_string(), 30),
            ("b".to_string(), 20),
            ("a".to_string(), 10)
        ]
    );
}

#[test]
fn nested_tree_counts_and_sizes() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    // root, subdir, nested, empty_dir
    assert_eq!(scanner.dir_count(), 4);
    assert_eq!(scanner.file_count(), 5);

    let root = scanner.root_path().unwrap();
    assert_eq!(
        scanner.file_db().find_entry(&root).unwrap().size,
        10 + 20 + 30 + 1024 + 17
    );

    let mut nested = root.clone();
    nested.add_dir("subdir").unwrap();
    nested.add_dir("nested").unwrap();
    let info = scanner.file_db().find_entry(&nested).unwrap();
    assert_eq!(info.size, 17);
}

#[test]
fn rescan_of_unchanged_tree_is_idempotent() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    let root = scanner.root_path().unwrap();
    let dirs = scanner.dir_count();
    let files = scanner.file_count();
    let before = listing(&scanner, &root);

    scanner.rescan_path(&root).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        !scanner.is_running()
    }));

    assert_eq!(scanner.dir_count(), dirs);
    assert_eq!(scanner.file_count(), files);
    assert_eq!(listing(&scanner, &root), before);

    // rescans of paths the tree never saw are a quiet no-op
    let mut unknown = root.clone();
    unknown.add_dir("never-scanned").unwrap();
    scanner.rescan_path(&unknown).unwrap();
}

#[test]
fn watcher_refreshes_created_files() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    if scanner.watcher_limits().watched == 0 {
        // no watch backend in this environment
        return;
    }

    let files = scanner.file_count();
    fs::write(temp_dir.path().join("new.txt"), vec![0u8; 64]).unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || scanner.file_count() == files + 1),
        "created file never appeared in the database"
    );

    let mut new_path = scanner.root_path().unwrap();
    new_path.add_file("new.txt").unwrap();
    let info = scanner.file_db().find_entry(&new_path).unwrap();
    assert_eq!(info.size, 64);
}

#[test]
fn watcher_refreshes_deleted_files() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    if scanner.watcher_limits().watched == 0 {
        return;
    }

    let files = scanner.file_count();
    fs::remove_file(temp_dir.path().join("file1.txt")).unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || scanner.file_count() == files - 1),
        "deleted file never left the database"
    );
    let mut gone = scanner.root_path().unwrap();
    gone.add_file("file1.txt").unwrap();
    assert!(scanner.file_db().find_entry(&gone).is_none());
}

#[test]
fn watcher_limits_track_scanned_directories() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    let limits = scanner.watcher_limits();
    if limits.watched == 0 {
        return;
    }
    if limits.limit >= 0 {
        assert_eq!(limits.watched as u64, scanner.dir_count());
    } else {
        assert_eq!(limits.watched, 1);
    }
}

#[test]
fn pause_resume_stop_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    for d in 0..24 {
        let dir = temp_dir.path().join(format!("dir{d}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..40 {
            fs::write(dir.join(format!("file{f}")), vec![0u8; 128]).unwrap();
        }
    }

    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();

    if scanner.pause() {
        assert!(scanner.can_resume());
        assert!(!scanner.can_pause());

        // the worker parks at the pause point; the current path stays put
        std::thread::sleep(Duration::from_millis(60));
        let parked = scanner.current_scan_path().map(|p| p.get_path(true));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(
            scanner.current_scan_path().map(|p| p.get_path(true)),
            parked
        );

        assert!(scanner.resume());
        assert!(scanner.can_pause() || !scanner.is_running());
    }

    scanner.stop();
    assert!(!scanner.is_running());
    assert_eq!(scanner.scan_progress(), 100);
}

#[test]
fn scan_pass_is_logged() {
    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    let logger = scanner.logger();
    assert!(
        wait_until(Duration::from_secs(5), || logger.has_new()),
        "worker never logged a scan pass"
    );
    let history = logger.get_history();
    assert!(history.iter().any(|line| line.starts_with("[LOG]")));
}

#[test]
fn projector_tracks_live_scan_results() {
    use diskscope::{Rect, ViewProjector};

    let temp_dir = create_test_filesystem();
    let scanner = Scanner::new(temp_dir.path().to_str().unwrap()).unwrap();
    wait_idle(&scanner);

    let mut projector = ViewProjector::new();
    projector.set_file_db(scanner.file_db());
    projector.set_view_area(Rect::new(0, 0, 640, 480));
    projector.set_text_height(12);
    assert!(projector.update(false, false));

    projector.process_entry(|root| {
        assert_eq!(root.size(), 10 + 20 + 30 + 1024 + 17);
        let names: Vec<String> = root
            .children()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(names.contains(&"subdir".to_string()));
        // largest child first
        assert_eq!(names[0], "subdir");
    });

    // reading the snapshot acknowledged the changes
    assert!(!scanner.has_changes());
}
