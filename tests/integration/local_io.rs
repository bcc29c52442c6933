use discgraft::io::ProjectDriver;
use discgraft::{uri, DataProject};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn source_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), vec![b'n'; 3000]).unwrap();
    fs::create_dir(dir.path().join("photos")).unwrap();
    fs::write(dir.path().join("photos").join("one.jpg"), vec![0u8; 2048]).unwrap();
    fs::write(dir.path().join("photos").join("two.jpg"), vec![0u8; 10]).unwrap();
    dir
}

fn dir_uri(path: &Path) -> String {
    uri::from_file_path(&fs::canonicalize(path).unwrap()).unwrap()
}

#[test]
fn driver_loads_a_local_directory() {
    let dir = source_dir();
    let mut driver = ProjectDriver::new(DataProject::default()).unwrap();
    let root = driver.project().root();
    driver
        .project_mut()
        .add_uri(&dir_uri(dir.path()), Some("backup"), root)
        .unwrap()
        .unwrap();

    assert!(driver.run_until_idle(WAIT));
    let project = driver.project();
    assert!(!project.is_loading());
    for path in ["/backup", "/backup/notes.txt", "/backup/photos/one.jpg", "/backup/photos/two.jpg"] {
        assert!(project.tree().find_path(path).is_some(), "{} missing", path);
    }
    // 2 + 1 + 1 sectors
    assert_eq!(project.sectors(), 4);
    assert_eq!(project.stats().num_file, 3);
    assert_eq!(project.stats().num_dir, 2);
    project.tree().verify().unwrap();
}

#[test]
fn driver_reports_unreadable_uris() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.iso");
    let mut driver = ProjectDriver::new(DataProject::default()).unwrap();
    let root = driver.project().root();
    driver
        .project_mut()
        .add_uri(&uri::from_file_path(&missing).unwrap(), None, root)
        .unwrap()
        .unwrap();

    assert!(driver.run_until_idle(WAIT));
    assert_eq!(driver.project().tree().visible_children(root).count(), 0);
    assert_eq!(driver.project().sectors(), 0);
}

#[test]
fn watched_directory_picks_up_new_files() {
    let dir = source_dir();
    let mut driver = ProjectDriver::new(DataProject::default())
        .unwrap()
        .with_watcher()
        .unwrap();
    let root = driver.project().root();
    driver
        .project_mut()
        .add_uri(&dir_uri(dir.path()), Some("live"), root)
        .unwrap()
        .unwrap();
    assert!(driver.run_until_idle(WAIT));
    assert!(driver
        .watcher()
        .unwrap()
        .is_watching(&dir_uri(dir.path())));

    fs::write(dir.path().join("added.txt"), vec![b'a'; 5000]).unwrap();
    let deadline = Instant::now() + WAIT;
    while driver.project().tree().find_path("/live/added.txt").is_none() {
        assert!(Instant::now() < deadline, "new file never showed up");
        driver.process_changes(Duration::from_millis(200));
    }
    // a create can be reported before the content lands
    let deadline = Instant::now() + WAIT;
    while driver.project().sectors() != 7 {
        assert!(Instant::now() < deadline, "size never settled");
        driver.process_changes(Duration::from_millis(200));
    }
    driver.project().tree().verify().unwrap();
}
