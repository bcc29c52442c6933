use crate::support::FakeFs;
use discgraft::project::IoRequest;
use discgraft::{DataProject, NodeId};

fn names(project: &DataProject, dir: NodeId) -> Vec<String> {
    project
        .tree()
        .visible_children(dir)
        .map(|c| project.tree()[c].name().to_string())
        .collect()
}

#[test]
fn folder_of_foreign_files_then_rename_round_trip() {
    let fs = FakeFs::new()
        .file("file:///home/u/docs/a.txt", 100)
        .file("file:///home/u/docs/b.txt", 5000)
        .file("file:///music/song.ogg", 4096);
    let mut project = DataProject::default();
    let root = project.root();

    let docs = project
        .add_uri("file:///home/u/docs", None, root)
        .unwrap()
        .unwrap();
    let folder = project
        .add_empty_directory("Extra", root)
        .unwrap()
        .unwrap();
    project
        .add_uri("file:///music/song.ogg", None, folder)
        .unwrap()
        .unwrap();
    fs.settle(&mut project);

    assert_eq!(names(&project, root), vec!["docs", "Extra"]);
    assert_eq!(names(&project, docs), vec!["a.txt", "b.txt"]);
    // 1 + 3 sectors of docs, 2 of the song
    assert_eq!(project.sectors(), 6);
    assert_eq!(project.stats().num_file, 3);
    assert_eq!(project.stats().num_dir, 2);

    let a = project.tree().find_path("/docs/a.txt").unwrap();
    assert!(!project.uri_is_graft_needed("file:///home/u/docs/a.txt"));

    project.rename_node(a, "renamed.txt").unwrap();
    assert!(project.uri_is_graft_needed("file:///home/u/docs/a.txt"));
    let exported = project.get_contents(&project.export_options());
    assert!(exported
        .excluded
        .iter()
        .any(|uri| uri == "file:///home/u/docs/a.txt"));
    assert_eq!(
        project.node_to_uri(a).as_deref(),
        Some("file:///home/u/docs/a.txt")
    );

    project.rename_node(a, "a.txt").unwrap();
    assert!(!project.uri_is_graft_needed("file:///home/u/docs/a.txt"));
    let exported = project.get_contents(&project.export_options());
    assert!(exported.excluded.is_empty());
    assert!(!project.tree()[a].is_grafted());
    project.tree().verify().unwrap();
}

#[test]
fn deep_counter_flips_once_per_branch() {
    let mut project = DataProject::default();
    let mut parent = project.root();
    for depth in 1..=4 {
        parent = project
            .add_empty_directory(&format!("d{}", depth), parent)
            .unwrap()
            .unwrap();
        assert_eq!(project.stats().num_deep, 0);
    }

    let deep = project
        .add_empty_directory("d5", parent)
        .unwrap()
        .unwrap();
    assert!(project.tree()[deep].is_deep());
    assert_eq!(project.stats().num_deep, 1);

    let below = project
        .add_empty_directory("d6", deep)
        .unwrap()
        .unwrap();
    assert!(!project.tree()[below].is_deep());
    project
        .add_uri("file:///x/deeper.txt", None, below)
        .unwrap()
        .unwrap();
    assert_eq!(project.stats().num_deep, 1);

    project.remove_node(deep).unwrap();
    assert_eq!(project.stats().num_deep, 0);
    project.tree().verify().unwrap();
}

#[test]
fn removed_directory_cancels_its_loads() {
    let mut project = DataProject::default();
    let root = project.root();
    let node = project
        .add_uri("file:///srv/share", None, root)
        .unwrap()
        .unwrap();
    let requests = project.take_requests();
    assert!(matches!(requests.as_slice(), [IoRequest::Info { .. }]));

    project.remove_node(node).unwrap();
    let requests = project.take_requests();
    assert!(requests.contains(&IoRequest::Cancel { node }));
    assert!(project.tree().get(node).is_none());
    assert_eq!(project.sectors(), 0);
}
