use archiver::{ArchiveFormat, Options, Task};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use walkdir::WalkDir;

/// Relative path -> sha256 for every regular file under `root`.
fn manifest(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .map(Result::unwrap)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            let hash = hex::encode(Sha256::digest(fs::read(e.path()).unwrap()));
            (rel, hash)
        })
        .collect()
}

fn populate(input_dir: &Path) {
    fs::create_dir_all(input_dir.join("nested/deep")).unwrap();
    for i in 0..3 {
        let mut f = File::create(input_dir.join(format!("file{}.txt", i))).unwrap();
        write!(f, "testdata{}", i).unwrap();
    }
    fs::write(input_dir.join("nested/deep/blob.bin"), (0..70_000u32).map(|i| (i % 13) as u8).collect::<Vec<_>>()).unwrap();
    fs::write(input_dir.join("nested/empty.txt"), "").unwrap();
}

fn folder_roundtrip(format: ArchiveFormat) {
    let dir = tempdir().unwrap();
    let input_dir = dir.path().join("input");
    populate(&input_dir);

    let archive = dir.path().join(format!("input.tar.{}", format.extension()));
    Task::new(&input_dir, &archive, Options::default()).unwrap().run().unwrap();
    assert!(archive.is_file());

    let output_dir = dir.path().join("output");
    let summary = Task::new(&archive, &output_dir, Options::default())
        .unwrap()
        .run()
        .unwrap();
    assert!(summary.extracted);
    assert_eq!(summary.destination, output_dir);

    // The tar is rooted at the source directory's name.
    let restored = output_dir.join("input");
    assert!(restored.is_dir());
    assert_eq!(manifest(&restored), manifest(&input_dir));
    assert!(restored.join("nested/deep").is_dir());
}

#[test]
fn test_folder_roundtrip_bz2() {
    folder_roundtrip(ArchiveFormat::Bz2);
}

#[test]
fn test_folder_roundtrip_zstd() {
    if which::which("zstd").is_err() {
        eprintln!("zstd not installed, skipping");
        return;
    }
    folder_roundtrip(ArchiveFormat::Zstd);
}

#[test]
fn test_folder_extracts_into_existing_directory() {
    let dir = tempdir().unwrap();
    let input_dir = dir.path().join("site");
    populate(&input_dir);
    let archive = dir.path().join("site.tar.bz2");
    Task::new(&input_dir, &archive, Options::default()).unwrap().run().unwrap();

    let output_dir = dir.path().join("existing");
    fs::create_dir(&output_dir).unwrap();
    fs::write(output_dir.join("keep.txt"), "untouched").unwrap();

    Task::new(&archive, &output_dir, Options::default()).unwrap().run().unwrap();
    assert_eq!(manifest(&output_dir.join("site")), manifest(&input_dir));
    assert_eq!(fs::read_to_string(output_dir.join("keep.txt")).unwrap(), "untouched");

    // No staging files left behind.
    let names: Vec<_> = fs::read_dir(&output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.starts_with(".archiver-")), "leftovers: {names:?}");
}

#[test]
fn test_empty_folder_roundtrip() {
    let dir = tempdir().unwrap();
    let input_dir = dir.path().join("hollow");
    fs::create_dir(&input_dir).unwrap();
    let archive = dir.path().join("hollow.tar.bz2");
    Task::new(&input_dir, &archive, Options::default()).unwrap().run().unwrap();

    let output_dir = dir.path().join("out");
    let summary = Task::new(&archive, &output_dir, Options::default())
        .unwrap()
        .run()
        .unwrap();
    assert!(summary.extracted);
    assert!(output_dir.join("hollow").is_dir());
}

#[test]
fn test_folder_extracts_into_missing_nested_target() {
    let dir = tempdir().unwrap();
    let input_dir = dir.path().join("docs");
    populate(&input_dir);
    let archive = dir.path().join("docs.tar.bz2");
    Task::new(&input_dir, &archive, Options::default()).unwrap().run().unwrap();

    let output_dir = dir.path().join("out/nested/dir");
    let summary = Task::new(&archive, &output_dir, Options::default())
        .unwrap()
        .run()
        .unwrap();
    assert!(summary.extracted);
    assert_eq!(manifest(&output_dir.join("docs")), manifest(&input_dir));
}
