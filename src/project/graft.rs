//! Graft resolution
//!
//! A node needs a graft exactly when the image writer could not reach it by
//! following its parent's URI and appending its name. These helpers map nodes
//! to URIs and back, and keep the URI table consistent with that rule.

use super::{DataProject, UriNode};
use crate::types::{NodeId, NEW_FOLDER};
use crate::uri;
use std::sync::Arc;
use tracing::debug;

impl DataProject {
    /// URI a node resolves to: its own graft, or the nearest grafted
    /// ancestor's URI with the intervening names appended.
    ///
    /// `None` for the root, synthetic folders, imported content and anything
    /// below them.
    pub fn node_to_uri(&self, node: NodeId) -> Option<String> {
        let mut names: Vec<&str> = Vec::new();
        let mut current = node;
        loop {
            let n = self.tree.get(current)?;
            if n.is_root() || n.is_imported() {
                return None;
            }
            if let Some(graft_uri) = n.graft_uri() {
                if graft_uri == NEW_FOLDER {
                    return None;
                }
                let mut resolved = graft_uri.to_string();
                for name in names.iter().rev() {
                    resolved = uri::join(&resolved, name).ok()?;
                }
                return Some(resolved);
            }
            if n.is_fake() && !n.is_virtual() {
                return None;
            }
            names.push(n.name());
            current = n.parent()?;
        }
    }

    /// Every node that currently represents `uri`: nodes grafted to it plus
    /// nodes found by walking down from grafted ancestors by name.
    pub fn uri_to_nodes(&self, uri: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        if uri == NEW_FOLDER {
            return found;
        }
        let mut ancestor = Some(uri.to_string());
        while let Some(current) = ancestor {
            if let Some(row) = self.grafts.get(current.as_str()) {
                for graft_node in &row.nodes {
                    if let Some(node) = self.walk_down(*graft_node, &current, uri) {
                        if !found.contains(&node) {
                            found.push(node);
                        }
                    }
                }
            }
            ancestor = uri::parent(&current);
        }
        found
    }

    fn walk_down(&self, start: NodeId, start_uri: &str, target: &str) -> Option<NodeId> {
        let mut node = start;
        let mut node_uri = start_uri.to_string();
        while node_uri != target {
            let (next, next_uri) = self.tree[node].children().iter().find_map(|child| {
                let c = &self.tree[*child];
                if c.is_grafted() || c.is_imported() {
                    return None;
                }
                let child_uri = uri::join(&node_uri, c.name()).ok()?;
                (child_uri == target || uri::is_descendant(target, &child_uri))
                    .then_some((*child, child_uri))
            })?;
            node = next;
            node_uri = next_uri;
        }
        Some(node)
    }

    /// Add `node` to the row for `uri`, creating the row if needed.
    ///
    /// A new row also takes in every other node that already represents the
    /// URI naturally, so that all representatives share the row.
    pub(crate) fn graft_node(&mut self, node: NodeId, uri: &str) {
        if self.tree[node].graft_uri() == Some(uri) {
            return;
        }
        if let Some(old) = self.tree[node].graft_uri().map(Arc::<str>::from) {
            self.detach_from_row(node, &old);
            self.drop_row_if_unused(&old);
        }
        let natural = if self.grafts.contains_key(uri) || uri == NEW_FOLDER {
            Vec::new()
        } else {
            self.uri_to_nodes(uri)
        };
        let key: Arc<str> = match self.grafts.get_key_value(uri) {
            Some((key, _)) => key.clone(),
            None => Arc::from(uri),
        };
        let row = self
            .grafts
            .entry(key.clone())
            .or_insert_with(|| UriNode::new(key.clone()));
        row.nodes.push(node);
        self.tree.set_graft(node, key.clone());
        for other in natural {
            if other != node && !self.tree[other].is_grafted() {
                if let Some(row) = self.grafts.get_mut(uri) {
                    row.nodes.push(other);
                }
                self.tree.set_graft(other, key.clone());
            }
        }
        debug!(node = %node, uri = %uri, "graft");
    }

    /// Remove `node` from the row for `uri` without touching the node.
    pub(crate) fn detach_from_row(&mut self, node: NodeId, uri: &str) {
        if let Some(row) = self.grafts.get_mut(uri) {
            row.nodes.retain(|n| *n != node);
        }
    }

    /// Forget rows that carry no meaning once their nodes are gone.
    fn drop_row_if_unused(&mut self, uri: &str) {
        if uri == NEW_FOLDER && self.grafts.get(uri).is_some_and(|r| r.nodes.is_empty()) {
            self.grafts.remove(uri);
        }
    }

    /// Ungraft one node, leaving the row behind.
    pub(crate) fn ungraft_node(&mut self, node: NodeId) -> Option<Arc<str>> {
        let uri = self.tree.clear_graft(node)?;
        self.detach_from_row(node, &uri);
        self.drop_row_if_unused(&uri);
        debug!(node = %node, uri = %uri, "ungraft");
        Some(uri)
    }

    /// Whether the row for `uri` must stay.
    ///
    /// Exclusion rows always stay. A row with nodes can go when every node in
    /// it sits under a distinct node representing the parent URI, under the
    /// URI's own name, and every parent representative has one of them.
    /// Without a row nothing needs a graft.
    pub fn uri_is_graft_needed(&self, uri: &str) -> bool {
        if uri == NEW_FOLDER {
            return true;
        }
        let Some(row) = self.grafts.get(uri) else {
            return false;
        };
        if row.nodes.is_empty() {
            return true;
        }
        let Some(parent_uri) = uri::parent(uri) else {
            return true;
        };
        let parents = self.uri_to_nodes(&parent_uri);
        if parents.is_empty() || parents.len() != row.nodes.len() {
            return true;
        }
        let mut seen = Vec::with_capacity(parents.len());
        for node in &row.nodes {
            let n = &self.tree[*node];
            let Some(parent) = n.parent() else {
                return true;
            };
            if !parents.contains(&parent) || seen.contains(&parent) {
                return true;
            }
            seen.push(parent);
            match uri::join(&parent_uri, n.name()) {
                Ok(natural) if natural == uri => {}
                _ => return true,
            }
        }
        false
    }

    /// Re-evaluate the row for `uri` and drop it when no graft is needed.
    pub(crate) fn check_graft(&mut self, uri: &str) {
        if self.uri_is_graft_needed(uri) {
            return;
        }
        if let Some(row) = self.grafts.remove(uri) {
            for node in row.nodes {
                self.tree.clear_graft(node);
            }
            debug!(uri = %uri, "graft no longer needed");
        }
    }

    /// Make sure `uri` has a row. When the row is new, natural
    /// representatives are removed from the tree so the URI is excluded.
    pub(crate) fn ensure_exclusion(&mut self, uri: &str) {
        if self.grafts.contains_key(uri) {
            return;
        }
        let natural: Vec<NodeId> = self
            .uri_to_nodes(uri)
            .into_iter()
            .filter(|n| !self.tree[*n].is_grafted())
            .collect();
        let key: Arc<str> = Arc::from(uri);
        self.grafts.insert(key.clone(), UriNode::new(key));
        for node in natural {
            if self.tree.contains(node) {
                self.remove_subtree(node, true);
            }
        }
        debug!(uri = %uri, "excluded");
    }

    /// Whether the natural parent of `uri` is represented in the tree.
    pub(crate) fn has_natural_parent(&self, uri: &str) -> bool {
        uri::parent(uri).is_some_and(|parent| !self.uri_to_nodes(&parent).is_empty())
    }

    /// Whether some node representing the natural parent of `uri` lacks a
    /// child at the natural name resolving to `uri`.
    pub(crate) fn natural_slot_missing(&self, uri: &str) -> bool {
        let (Some(parent), Some(name)) = (uri::parent(uri), uri::basename(uri)) else {
            return false;
        };
        self.uri_to_nodes(&parent).into_iter().any(|p| {
            match self.tree.find_child(p, &name) {
                Some(child) => self.node_to_uri(child).as_deref() != Some(uri),
                None => true,
            }
        })
    }

    /// Row handling after `uri` lost some of its nodes.
    pub(crate) fn settle_row(&mut self, uri: &str, keep_exclusion: bool) {
        if uri == NEW_FOLDER {
            self.drop_row_if_unused(uri);
            return;
        }
        let Some(row) = self.grafts.get(uri) else {
            return;
        };
        if !row.nodes.is_empty() {
            self.check_graft(uri);
            return;
        }
        if keep_exclusion && self.has_natural_parent(uri) {
            return;
        }
        self.grafts.remove(uri);
        debug!(uri = %uri, "uri removed");
        self.emit_uri_removed(uri);
    }
}

#[cfg(test)]
mod tests {
    use crate::project::test_support::settle;
    use crate::project::DataProject;
    use crate::types::NEW_FOLDER;

    #[test]
    fn test_synthetic_folder_and_foreign_file() {
        let mut project = DataProject::default();
        let root = project.root();
        let a = project.add_empty_directory("A", root).unwrap().unwrap();
        let x = project
            .add_uri("file:///tmp/x.txt", None, a)
            .unwrap()
            .unwrap();
        settle(&mut project, &[("file:///tmp/x.txt", 4096)], &["file:///tmp"]);

        assert_eq!(project.tree()[a].graft_uri(), Some(NEW_FOLDER));
        assert_eq!(project.tree()[x].graft_uri(), Some("file:///tmp/x.txt"));
        assert!(project.uri_is_graft_needed("file:///tmp/x.txt"));
        assert_eq!(project.node_to_uri(x).as_deref(), Some("file:///tmp/x.txt"));
        assert_eq!(project.node_to_uri(a), None);
        assert_eq!(project.uri_to_nodes("file:///tmp/x.txt"), vec![x]);
        assert_eq!(project.tree()[a].sectors(), 0);
        assert_eq!(project.sectors(), 2);
    }

    #[test]
    fn test_rename_away_and_back_toggles_graft() {
        let mut project = DataProject::default();
        let root = project.root();
        let tmp = project.add_uri("file:///tmp", None, root).unwrap().unwrap();
        settle(
            &mut project,
            &[("file:///tmp/x.txt", 2048)],
            &["file:///tmp"],
        );
        let x = project.tree().find_child(tmp, "x.txt").unwrap();
        assert!(!project.tree()[x].is_grafted());
        assert!(!project.uri_is_graft_needed("file:///tmp/x.txt"));

        assert!(project.rename_node(x, "y.txt").unwrap());
        assert!(project.uri_is_graft_needed("file:///tmp/x.txt"));
        assert_eq!(project.tree()[x].graft_uri(), Some("file:///tmp/x.txt"));

        assert!(project.rename_node(x, "x.txt").unwrap());
        assert!(!project.uri_is_graft_needed("file:///tmp/x.txt"));
        assert!(!project.tree()[x].is_grafted());
        assert!(project.uri_node("file:///tmp/x.txt").is_none());
        assert_eq!(project.tree()[tmp].sectors(), 1);
        project.tree().verify().unwrap();
    }

    #[test]
    fn test_node_to_uri_round_trips_through_uri_to_nodes() {
        let mut project = DataProject::default();
        let root = project.root();
        project.add_uri("file:///src", None, root).unwrap();
        settle(
            &mut project,
            &[("file:///src/a/b.rs", 10), ("file:///src/c.rs", 1)],
            &["file:///src", "file:///src/a"],
        );
        for id in project.tree().descendants(root).into_iter().skip(1) {
            let uri = project.node_to_uri(id).unwrap();
            assert!(project.uri_to_nodes(&uri).contains(&id), "{}", uri);
        }
    }
}
