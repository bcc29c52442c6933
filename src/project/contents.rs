//! Export and import of graft points
//!
//! [`Contents`] is what an image writer needs to reproduce the tree: one
//! graft per explicitly placed node and the URIs to skip while recursing
//! into grafted directories. It is also the persisted form of a project.

use super::events::IoRequest;
use super::ops::validate_name;
use super::DataProject;
use crate::config::ProjectConfig;
use crate::error::ProjectError;
use crate::tree::{FileNode, NodeKind};
use crate::types::{NodeId, NEW_FOLDER};
use crate::uri;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current version of the project file format.
pub const PROJECT_FILE_VERSION: u32 = 1;

/// One (tree path, source URI) pair. Folders with no backing content have
/// no URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraftPoint {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Properties of the exported content that decide the image profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    pub has_symlinks: bool,
    pub joliet_incompatible: bool,
    pub has_deep: bool,
    pub has_2gib: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contents {
    pub grafts: Vec<GraftPoint>,
    pub excluded: Vec<String>,
    #[serde(default)]
    pub flags: ContentFlags,
}

impl Contents {
    pub fn is_empty(&self) -> bool {
        self.grafts.is_empty()
    }

    pub fn graft_for_path(&self, path: &str) -> Option<&GraftPoint> {
        self.grafts
            .iter()
            .find(|g| g.path.trim_end_matches('/') == path.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Emit a graft for every node whose name Joliet would truncate
    pub joliet_compat: bool,
    /// Directory paths end with `/`
    pub append_slash: bool,
    /// Export only hidden nodes instead of only visible ones
    pub hidden_only: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ProjectConfig::default())
    }
}

impl From<&ProjectConfig> for ExportOptions {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            joliet_compat: config.joliet,
            append_slash: config.append_slash,
            hidden_only: false,
        }
    }
}

/// On-disk project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    /// RFC 3339 creation time
    pub created: String,
    pub contents: Contents,
}

impl ProjectFile {
    pub fn new(contents: Contents) -> Self {
        Self {
            version: PROJECT_FILE_VERSION,
            created: Utc::now().to_rfc3339(),
            contents,
        }
    }
}

/// Where a project called `name` is saved by default.
pub fn default_project_path(name: &str) -> Result<PathBuf, ProjectError> {
    validate_name(name)?;
    Ok(crate::config::paths::xdg_root::projects_dir()?.join(format!("{}.json", name)))
}

/// Write `contents` as a JSON project file.
pub fn save_project(path: &Path, contents: &Contents) -> Result<(), ProjectError> {
    let file = ProjectFile::new(contents.clone());
    let json = serde_json::to_string_pretty(&file)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, json)?;
    info!(path = %path.display(), grafts = contents.grafts.len(), "project saved");
    Ok(())
}

pub fn load_project(path: &Path) -> Result<ProjectFile, ProjectError> {
    let json = std::fs::read_to_string(path)?;
    let file: ProjectFile = serde_json::from_str(&json)?;
    if file.version > PROJECT_FILE_VERSION {
        return Err(ProjectError::UnsupportedVersion(file.version));
    }
    debug!(path = %path.display(), version = file.version, "project loaded");
    Ok(file)
}

fn graft_path(project: &DataProject, node: NodeId, options: &ExportOptions) -> String {
    let mut path = project.tree.path(node);
    if options.append_slash && project.tree[node].is_directory() {
        path.push('/');
    }
    path
}

impl DataProject {
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::from(&self.config)
    }

    /// Graft points and exclusions for the whole tree.
    pub fn get_contents(&self, options: &ExportOptions) -> Contents {
        self.collect_contents(options, |_| true)
    }

    /// Whether a node or one of its ancestors is hidden.
    fn in_hidden_branch(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.tree[id];
            if n.is_hidden() {
                return true;
            }
            current = n.parent();
        }
        false
    }

    fn hidden_mismatch(&self, node: NodeId, options: &ExportOptions) -> bool {
        self.in_hidden_branch(node) != options.hidden_only
    }

    /// Export restricted to nodes whose top-level ancestor passes `include`.
    pub(crate) fn collect_contents(
        &self,
        options: &ExportOptions,
        include: impl Fn(NodeId) -> bool,
    ) -> Contents {
        let root = self.tree.root();
        let top_level = |node: NodeId| {
            let mut current = node;
            while let Some(parent) = self.tree[current].parent() {
                if parent == root {
                    return Some(current);
                }
                current = parent;
            }
            None
        };
        let included = |node: NodeId| top_level(node).is_some_and(&include);

        let mut grafts = Vec::new();
        let mut excluded = Vec::new();
        for row in self.uri_nodes() {
            if row.is_exclusion() {
                excluded.push(row.uri().to_string());
                continue;
            }
            let is_new_folder = row.uri() == NEW_FOLDER;
            let mut emitted = 0;
            let mut hidden = 0;
            for node in row.nodes() {
                let n = &self.tree[*node];
                if n.is_imported() || n.parent().is_none() || !included(*node) {
                    continue;
                }
                if self.hidden_mismatch(*node, options) {
                    hidden += 1;
                    continue;
                }
                grafts.push(GraftPoint {
                    path: graft_path(self, *node, options),
                    uri: (!is_new_folder).then(|| row.uri().to_string()),
                });
                emitted += 1;
            }
            if is_new_folder {
                continue;
            }
            let hidden_away = emitted == 0 && hidden > 0 && !options.hidden_only;
            if hidden_away || (emitted > 0 && self.natural_slot_missing(row.uri())) {
                excluded.push(row.uri().to_string());
            }
        }

        let mut joliet_incompatible = false;
        for node in self.joliet.nodes() {
            if !self.tree.contains(node) || !included(node) || self.hidden_mismatch(node, options)
            {
                continue;
            }
            joliet_incompatible = true;
            if !options.joliet_compat || self.tree[node].is_grafted() {
                continue;
            }
            // the natural copy would come back under its truncated name
            if let Some(node_uri) = self.node_to_uri(node) {
                grafts.push(GraftPoint {
                    path: graft_path(self, node, options),
                    uri: Some(node_uri.clone()),
                });
                excluded.push(node_uri);
            }
        }

        let mut flags = ContentFlags {
            joliet_incompatible,
            ..ContentFlags::default()
        };
        for top in self.tree[root].children().iter().copied().filter(|c| include(*c)) {
            for id in self.tree.descendants(top) {
                let n = &self.tree[id];
                if n.is_virtual() || self.hidden_mismatch(id, options) {
                    continue;
                }
                flags.has_symlinks |= n.is_symlink();
                flags.has_deep |= n.is_deep();
                flags.has_2gib |= n.is_2gib();
            }
        }

        grafts.sort();
        grafts.dedup();
        excluded.sort();
        excluded.dedup();
        debug!(
            grafts = grafts.len(),
            excluded = excluded.len(),
            "contents collected"
        );
        Contents {
            grafts,
            excluded,
            flags,
        }
    }

    /// Rebuild nodes from exported graft points. Intermediate folders are
    /// created as needed; grafted nodes load asynchronously.
    pub fn load_contents(&mut self, contents: &Contents) -> Result<(), ProjectError> {
        let mut grafts = contents.grafts.clone();
        grafts.sort_by(|a, b| a.path.trim_end_matches('/').cmp(b.path.trim_end_matches('/')));
        let mut graft_uris = HashSet::new();
        for graft in &grafts {
            if let Some(graft_uri) = &graft.uri {
                graft_uris.insert(uri::canonicalize(graft_uri)?);
            }
        }

        for graft in &grafts {
            self.load_graft(graft)?;
        }
        for excluded in &contents.excluded {
            let excluded = uri::canonicalize(excluded)?;
            if graft_uris.contains(&excluded) {
                continue;
            }
            self.ensure_exclusion(&excluded);
        }
        info!(
            grafts = grafts.len(),
            excluded = contents.excluded.len(),
            "contents loaded"
        );
        self.emit_size_changed();
        Ok(())
    }

    fn load_graft(&mut self, graft: &GraftPoint) -> Result<(), ProjectError> {
        let components: Vec<&str> = graft.path.split('/').filter(|c| !c.is_empty()).collect();
        let Some((last, intermediate)) = components.split_last() else {
            return Err(ProjectError::InvalidPath(graft.path.clone()));
        };
        let mut parent = self.tree.root();
        for name in intermediate {
            validate_name(name)?;
            parent = self.intermediate_directory(parent, name, &graft.path)?;
        }
        validate_name(last)?;

        let existing = self.tree.find_child(parent, last);
        let Some(graft_uri) = &graft.uri else {
            match existing {
                Some(sentinel) if self.tree[sentinel].is_virtual() => {
                    self.realize_sentinel(sentinel);
                }
                Some(_) => {}
                None => {
                    self.synthetic_folder(parent, last);
                }
            }
            return Ok(());
        };

        let graft_uri = uri::canonicalize(graft_uri)?;
        let orphans = match existing {
            Some(sentinel) if self.tree[sentinel].is_virtual() => self.take_virtual(sentinel),
            Some(_) => {
                warn!(path = %graft.path, uri = %graft_uri, "path already taken, graft skipped");
                return Ok(());
            }
            None => Vec::new(),
        };
        let node = self.tree.alloc(FileNode::loading(last));
        if graft.path.ends_with('/') || !orphans.is_empty() {
            self.tree.assume_kind(node, NodeKind::Directory);
        }
        self.tree.insert(parent, node, self.sort.as_deref());
        self.joliet_add(node);
        self.graft_node(node, &graft_uri);
        self.adopt(node, orphans);
        self.check_graft(&graft_uri);
        self.request(IoRequest::Info {
            node,
            uri: graft_uri.clone(),
        });
        self.emit_added(node, Some(&graft_uri));
        Ok(())
    }

    /// Folder on the way to a graft path. Under content that will be listed
    /// it is a sentinel the listing absorbs; elsewhere a synthetic folder.
    fn intermediate_directory(
        &mut self,
        parent: NodeId,
        name: &str,
        path: &str,
    ) -> Result<NodeId, ProjectError> {
        if let Some(existing) = self.tree.find_child(parent, name) {
            let n = &self.tree[existing];
            if n.is_directory() {
                return Ok(existing);
            }
            if n.is_loading() && !n.is_imported() {
                self.tree.assume_kind(existing, NodeKind::Directory);
                return Ok(existing);
            }
            return Err(ProjectError::NotADirectory(path.to_string()));
        }
        let p = &self.tree[parent];
        let listed_later = p.is_virtual() || (!p.is_fake() && self.node_to_uri(parent).is_some());
        if listed_later {
            let sentinel = self.tree.alloc(FileNode::virtual_directory(name));
            self.tree.insert(parent, sentinel, self.sort.as_deref());
            return Ok(sentinel);
        }
        Ok(self.synthetic_folder(parent, name))
    }

    fn synthetic_folder(&mut self, parent: NodeId, name: &str) -> NodeId {
        let node = self.tree.alloc(FileNode::fake(name));
        self.tree.insert(parent, node, self.sort.as_deref());
        self.graft_node(node, NEW_FOLDER);
        self.joliet_add(node);
        self.emit_added(node, None);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::test_support::settle;

    #[test]
    fn test_export_synthetic_folder_and_graft() {
        let mut project = DataProject::default();
        let root = project.root();
        let a = project.add_empty_directory("A", root).unwrap().unwrap();
        project.add_uri("file:///tmp/x.txt", None, a).unwrap();
        settle(&mut project, &[("file:///tmp/x.txt", 10)], &[]);

        let contents = project.get_contents(&project.export_options());
        assert_eq!(
            contents.grafts,
            vec![
                GraftPoint {
                    path: "/A/".into(),
                    uri: None
                },
                GraftPoint {
                    path: "/A/x.txt".into(),
                    uri: Some("file:///tmp/x.txt".into())
                },
            ]
        );
        assert!(contents.excluded.is_empty());
        assert_eq!(contents.flags, ContentFlags::default());
    }

    #[test]
    fn test_renamed_natural_node_exports_exclusion() {
        let mut project = DataProject::default();
        let root = project.root();
        let tmp = project.add_uri("file:///tmp", None, root).unwrap().unwrap();
        settle(&mut project, &[("file:///tmp/x.txt", 10)], &["file:///tmp"]);
        let x = project.tree().find_child(tmp, "x.txt").unwrap();
        project.rename_node(x, "y.txt").unwrap();

        let contents = project.get_contents(&ExportOptions::default());
        assert!(contents.grafts.contains(&GraftPoint {
            path: "/tmp/y.txt".into(),
            uri: Some("file:///tmp/x.txt".into())
        }));
        assert_eq!(contents.excluded, vec!["file:///tmp/x.txt".to_string()]);
    }

    #[test]
    fn test_hidden_nodes_are_exported_separately() {
        let mut project = DataProject::default();
        let root = project.root();
        project.add_uri("file:///shown", None, root).unwrap();
        project.add_hidden_uri("file:///secret", None, root).unwrap();
        settle(
            &mut project,
            &[("file:///shown", 1), ("file:///secret", 1)],
            &[],
        );

        let visible = project.get_contents(&ExportOptions::default());
        assert_eq!(visible.grafts.len(), 1);
        assert_eq!(visible.grafts[0].path, "/shown");
        assert_eq!(visible.excluded, vec!["file:///secret".to_string()]);

        let hidden = project.get_contents(&ExportOptions {
            hidden_only: true,
            ..ExportOptions::default()
        });
        assert_eq!(hidden.grafts.len(), 1);
        assert_eq!(hidden.grafts[0].path, "/secret");
        assert!(hidden.excluded.is_empty());
    }

    #[test]
    fn test_load_contents_rebuilds_paths() {
        let contents = Contents {
            grafts: vec![
                GraftPoint {
                    path: "/music/best/".into(),
                    uri: Some("file:///srv/best".into()),
                },
                GraftPoint {
                    path: "/music/".into(),
                    uri: None,
                },
                GraftPoint {
                    path: "/docs/a.txt".into(),
                    uri: Some("file:///home/a.txt".into()),
                },
            ],
            excluded: vec!["file:///srv/best/skip.ogg".into()],
            flags: ContentFlags::default(),
        };
        let mut project = DataProject::default();
        project.load_contents(&contents).unwrap();

        let tree = project.tree();
        let music = tree.find_path("/music").unwrap();
        let best = tree.find_path("/music/best").unwrap();
        let docs = tree.find_path("/docs").unwrap();
        assert!(tree[music].is_fake());
        assert!(tree[docs].is_fake());
        assert_eq!(tree[docs].graft_uri(), Some(NEW_FOLDER));
        assert!(tree[best].is_directory());
        assert_eq!(tree[best].graft_uri(), Some("file:///srv/best"));
        assert!(project.is_excluded("file:///srv/best/skip.ogg"));
        assert_eq!(project.take_requests().len(), 2);
    }

    #[test]
    fn test_load_contents_rejects_empty_path() {
        let contents = Contents {
            grafts: vec![GraftPoint {
                path: "/".into(),
                uri: None,
            }],
            ..Contents::default()
        };
        let mut project = DataProject::default();
        assert!(matches!(
            project.load_contents(&contents),
            Err(ProjectError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_project_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("project.json");
        let contents = Contents {
            grafts: vec![GraftPoint {
                path: "/a".into(),
                uri: Some("file:///a".into()),
            }],
            excluded: vec!["file:///b".into()],
            flags: ContentFlags {
                has_symlinks: true,
                ..ContentFlags::default()
            },
        };
        save_project(&path, &contents).unwrap();
        let file = load_project(&path).unwrap();
        assert_eq!(file.version, PROJECT_FILE_VERSION);
        assert_eq!(file.contents, contents);
        assert!(chrono::DateTime::parse_from_rfc3339(&file.created).is_ok());
    }

    #[test]
    fn test_newer_project_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "created": "2024-01-01T00:00:00Z", "contents": {"grafts": [], "excluded": []}}"#,
        )
        .unwrap();
        assert!(matches!(
            load_project(&path),
            Err(ProjectError::UnsupportedVersion(99))
        ));
    }
}
