use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use diskscope::db::{FileDB, ScannedEntry};
use diskscope::entry::EntryKind;
use diskscope::Scanner;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Create a deterministic directory structure for benchmarking
fn create_benchmark_tree(root: &PathBuf, breadth_1: usize, breadth_2: usize, files_per_dir: usize) {
    fs::create_dir_all(root).unwrap();

    for i in 0..breadth_1 {
        let dir1 = root.join(format!("dir1_{:03}", i));
        fs::create_dir_all(&dir1).unwrap();

        for j in 0..breadth_2 {
            let dir2 = dir1.join(format!("dir2_{:03}", j));
            fs::create_dir_all(&dir2).unwrap();

            for k in 0..files_per_dir {
                let file = dir2.join(format!("file_{:03}.txt", k));
                fs::write(&file, "x".repeat(100)).unwrap();
            }
        }
    }
}

fn scan_to_completion(path: &str) -> (u64, u64) {
    let scanner = Scanner::new(path).unwrap();
    while scanner.is_running() {
        std::thread::sleep(Duration::from_millis(1));
    }
    (scanner.file_count(), scanner.dir_count())
}

/// Full scan of trees of increasing size
fn bench_scan_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_tree");
    group.sample_size(10);

    for (name, breadth_1, breadth_2, files) in [
        ("small", 5, 10, 20),
        ("medium", 10, 15, 30),
    ] {
        let tree = TempDir::new().unwrap();
        create_benchmark_tree(&tree.path().to_path_buf(), breadth_1, breadth_2, files);
        let path = tree.path().to_str().unwrap().to_string();

        group.bench_with_input(BenchmarkId::new("full_scan", name), &path, |b, path| {
            b.iter(|| scan_to_completion(black_box(path)))
        });
    }

    group.finish();
}

fn listing(width: usize, round: u64) -> Vec<ScannedEntry> {
    (0..width)
        .map(|i| ScannedEntry {
            name: format!("file_{i:05}.dat"),
            kind: EntryKind::File,
            size: ((i as u64 * 7919 + round * 13) % 100_000) as i64,
        })
        .collect()
}

/// The diff-apply hot path: repeated listings of one directory with
/// changing sizes, exercising the index probes and bucket relocations.
fn bench_diff_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_apply");

    for width in [100usize, 1000, 5000] {
        group.bench_with_input(BenchmarkId::new("resize_pass", width), &width, |b, &width| {
            let db = FileDB::new();
            db.set_root("/bench").unwrap();
            let root = db.root_path().unwrap();
            db.set_children_for_path(&root, listing(width, 0), None);

            let mut round = 0u64;
            b.iter(|| {
                round += 1;
                db.set_children_for_path(&root, black_box(listing(width, round)), None)
            })
        });
    }

    group.finish();
}

/// Entry churn: the same subtree torn down and rebuilt, which is what the
/// pool's free list and name cache exist for.
fn bench_entry_churn(c: &mut Criterion) {
    c.bench_function("entry_churn_1000", |b| {
        let db = FileDB::new();
        db.set_root("/bench").unwrap();
        let root = db.root_path().unwrap();

        b.iter(|| {
            db.set_children_for_path(&root, listing(1000, 1), None);
            db.set_children_for_path(&root, Vec::new(), None);
        })
    });
}

criterion_group!(benches, bench_scan_tree, bench_diff_apply, bench_entry_churn);
criterion_main!(benches);
