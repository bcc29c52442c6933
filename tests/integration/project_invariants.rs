//! Random edit sequences keep the tree bookkeeping exact.

use crate::support::FakeFs;
use discgraft::{DataProject, NodeId, TreeStats};
use proptest::prelude::*;

const NAMES: &[&str] = &["a", "b", "docs", "x.txt", "Music"];
const URIS: &[&str] = &[
    "file:///src",
    "file:///src/a",
    "file:///src/x.txt",
    "file:///src/docs",
    "file:///other/b",
];

fn source_fs() -> FakeFs {
    FakeFs::new()
        .file("file:///src/a/inner.bin", 3000)
        .file("file:///src/a/deeper/leaf", 10)
        .file("file:///src/x.txt", 9000)
        .file("file:///src/docs/readme", 100)
        .dir("file:///src/docs/empty")
        .file("file:///other/b", 2048)
}

#[derive(Debug, Clone)]
enum Edit {
    AddFolder { name: usize, parent: usize },
    AddUri { uri: usize, parent: usize },
    Move { node: usize, parent: usize },
    Rename { node: usize, name: usize },
    Remove { node: usize },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..NAMES.len(), any::<usize>()).prop_map(|(name, parent)| Edit::AddFolder { name, parent }),
        (0..URIS.len(), any::<usize>()).prop_map(|(uri, parent)| Edit::AddUri { uri, parent }),
        (any::<usize>(), any::<usize>()).prop_map(|(node, parent)| Edit::Move { node, parent }),
        (any::<usize>(), 0..NAMES.len()).prop_map(|(node, name)| Edit::Rename { node, name }),
        any::<usize>().prop_map(|node| Edit::Remove { node }),
    ]
}

fn editable_nodes(project: &DataProject) -> Vec<NodeId> {
    let tree = project.tree();
    tree.descendants(tree.root())
        .into_iter()
        .skip(1)
        .filter(|id| !tree[*id].is_virtual() && !tree[*id].is_imported())
        .collect()
}

fn directories(project: &DataProject) -> Vec<NodeId> {
    let mut dirs = vec![project.root()];
    dirs.extend(
        editable_nodes(project)
            .into_iter()
            .filter(|id| project.tree()[*id].is_directory()),
    );
    dirs
}

fn pick(nodes: &[NodeId], index: usize) -> Option<NodeId> {
    match nodes.len() {
        0 => None,
        len => Some(nodes[index % len]),
    }
}

/// Apply one edit. Refusals are part of the game and are ignored.
fn apply(project: &mut DataProject, edit: &Edit) {
    let nodes = editable_nodes(project);
    let dirs = directories(project);
    match *edit {
        Edit::AddFolder { name, parent } => {
            if let Some(parent) = pick(&dirs, parent) {
                let _ = project.add_empty_directory(NAMES[name], parent);
            }
        }
        Edit::AddUri { uri, parent } => {
            if let Some(parent) = pick(&dirs, parent) {
                let _ = project.add_uri(URIS[uri], None, parent);
            }
        }
        Edit::Move { node, parent } => {
            if let (Some(node), Some(parent)) = (pick(&nodes, node), pick(&dirs, parent)) {
                let _ = project.move_node(node, parent);
            }
        }
        Edit::Rename { node, name } => {
            if let Some(node) = pick(&nodes, node) {
                let _ = project.rename_node(node, NAMES[name]);
            }
        }
        Edit::Remove { node } => {
            if let Some(node) = pick(&nodes, node) {
                let _ = project.remove_node(node);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stats_and_sectors_stay_consistent(edits in prop::collection::vec(edit(), 1..24)) {
        let fs = source_fs();
        let mut project = DataProject::default();
        for edit in &edits {
            apply(&mut project, edit);
            fs.settle(&mut project);
            let tree = project.tree();
            prop_assert_eq!(tree.recount(), tree.stats(), "after {:?}", edit);
            if let Err(problem) = tree.verify() {
                prop_assert!(false, "after {:?}: {}", edit, problem);
            }
            prop_assert!(!project.is_loading());
        }
    }

    #[test]
    fn removing_everything_empties_the_project(edits in prop::collection::vec(edit(), 1..16)) {
        let fs = source_fs();
        let mut project = DataProject::default();
        for edit in &edits {
            apply(&mut project, edit);
        }
        fs.settle(&mut project);
        let root = project.root();
        let tops: Vec<NodeId> = project.tree().visible_children(root).collect();
        for top in tops {
            project.remove_node(top).unwrap();
        }
        prop_assert_eq!(project.sectors(), 0);
        prop_assert_eq!(project.stats(), TreeStats::default());
        prop_assert!(project.get_contents(&project.export_options()).grafts.is_empty());
    }
}
