use crate::support::FakeFs;
use discgraft::project::{load_project, save_project, GraftPoint};
use discgraft::{DataProject, ExportOptions};

fn source_fs() -> FakeFs {
    FakeFs::new()
        .file("file:///tmp/a", 4096)
        .file("file:///tmp/sub/b", 2048)
        .file("file:///elsewhere/x.txt", 10)
}

/// A project mixing natural content, a renamed file, a removed file and a
/// synthetic folder holding foreign content.
fn edited_project(fs: &FakeFs) -> DataProject {
    let mut project = DataProject::default();
    let root = project.root();
    project.add_uri("file:///tmp", None, root).unwrap().unwrap();
    let extra = project.add_empty_directory("E", root).unwrap().unwrap();
    project
        .add_uri("file:///elsewhere/x.txt", None, extra)
        .unwrap()
        .unwrap();
    fs.settle(&mut project);

    let a = project.tree().find_path("/tmp/a").unwrap();
    project.rename_node(a, "c").unwrap();
    let b = project.tree().find_path("/tmp/sub/b").unwrap();
    project.remove_node(b).unwrap();
    fs.settle(&mut project);
    project
}

fn paths(project: &DataProject) -> Vec<(String, Option<String>)> {
    let root = project.root();
    let mut paths: Vec<_> = project
        .tree()
        .descendants(root)
        .into_iter()
        .skip(1)
        .map(|id| (project.tree().path(id), project.node_to_uri(id)))
        .collect();
    paths.sort();
    paths
}

#[test]
fn export_lists_grafts_and_exclusions() {
    let fs = source_fs();
    let project = edited_project(&fs);
    let contents = project.get_contents(&ExportOptions::default());

    assert_eq!(
        contents.grafts,
        vec![
            GraftPoint {
                path: "/E/".into(),
                uri: None
            },
            GraftPoint {
                path: "/E/x.txt".into(),
                uri: Some("file:///elsewhere/x.txt".into())
            },
            GraftPoint {
                path: "/tmp/".into(),
                uri: Some("file:///tmp".into())
            },
            GraftPoint {
                path: "/tmp/c".into(),
                uri: Some("file:///tmp/a".into())
            },
        ]
    );
    assert_eq!(
        contents.excluded,
        vec!["file:///tmp/a".to_string(), "file:///tmp/sub/b".to_string()]
    );
    assert!(!contents.flags.joliet_incompatible);
}

#[test]
fn exported_contents_rebuild_the_same_tree() {
    let fs = source_fs();
    let original = edited_project(&fs);
    let contents = original.get_contents(&ExportOptions::default());

    let mut reloaded = DataProject::default();
    reloaded.load_contents(&contents).unwrap();
    fs.settle(&mut reloaded);

    assert_eq!(paths(&reloaded), paths(&original));
    assert_eq!(reloaded.sectors(), original.sectors());
    assert_eq!(reloaded.get_contents(&ExportOptions::default()), contents);
    reloaded.tree().verify().unwrap();
}

#[test]
fn long_names_get_explicit_grafts() {
    let first = format!("{}1.txt", "a".repeat(70));
    let second = format!("{}2.txt", "a".repeat(70));
    let fs = FakeFs::new()
        .file(&format!("file:///long/{}", first), 1)
        .file(&format!("file:///long/{}", second), 1)
        .file("file:///long/short.txt", 1);
    let mut project = DataProject::default();
    let root = project.root();
    project.add_uri("file:///long", None, root).unwrap().unwrap();
    fs.settle(&mut project);

    assert_eq!(project.joliet().len(), 2);
    assert_eq!(project.joliet().collisions().count(), 1);
    assert!(!project.is_joliet_compliant());

    let options = ExportOptions {
        joliet_compat: true,
        ..ExportOptions::default()
    };
    let contents = project.get_contents(&options);
    assert!(contents.flags.joliet_incompatible);
    for name in [&first, &second] {
        let uri = format!("file:///long/{}", name);
        let graft = contents.graft_for_path(&format!("/long/{}", name)).unwrap();
        assert_eq!(graft.uri.as_deref(), Some(uri.as_str()));
        assert!(contents.excluded.contains(&uri));
    }
    assert!(contents.graft_for_path("/long/short.txt").is_none());

    let plain = project.get_contents(&ExportOptions {
        joliet_compat: false,
        ..ExportOptions::default()
    });
    assert_eq!(plain.grafts.len(), 1);
    assert!(plain.excluded.is_empty());
}

#[test]
fn project_file_survives_save_and_load() {
    let fs = source_fs();
    let project = edited_project(&fs);
    let contents = project.get_contents(&project.export_options());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("projects").join("backup.json");
    save_project(&path, &contents).unwrap();
    let file = load_project(&path).unwrap();
    assert_eq!(file.contents, contents);

    let mut reloaded = DataProject::default();
    reloaded.load_contents(&file.contents).unwrap();
    fs.settle(&mut reloaded);
    assert_eq!(paths(&reloaded), paths(&project));
}
