//! Results coming back from the fetch and watch collaborators.

use super::events::{FetchError, FileInfo, ImportedEntry, IoRequest, ListingEntry, MonitorEvent};
use super::ops::single_move_order;
use super::{DataProject, UriNode};
use crate::tree::{FileNode, InfoUpdate, LoadState, NodeKind};
use crate::types::{sectors_for_bytes, NodeId, NEW_FOLDER, TWO_GIB_SECTORS};
use crate::uri;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl DataProject {
    /// Metadata for a node waiting on an `Info` request. Results for nodes
    /// that are gone or no longer waiting are ignored.
    pub fn on_info_result(&mut self, node: NodeId, uri: &str, result: Result<FileInfo, FetchError>) {
        let Some(n) = self.tree.get(node) else {
            debug!(node = %node, uri = %uri, "info for a removed node");
            return;
        };
        if !n.is_loading() && !n.is_reloading() {
            return;
        }
        match result {
            Ok(info) => {
                self.apply_info(node, uri, info);
            }
            Err(err) => self.handle_unreadable(node, uri, &err),
        }
        self.emit_size_changed();
    }

    /// Children of a directory waiting on a `Listing` request.
    pub fn on_listing_result(
        &mut self,
        node: NodeId,
        uri: &str,
        result: Result<Vec<ListingEntry>, FetchError>,
    ) {
        let Some(n) = self.tree.get(node) else {
            debug!(node = %node, uri = %uri, "listing for a removed node");
            return;
        };
        if !n.is_exploring() {
            return;
        }
        self.tree.set_exploring(node, false);
        match result {
            Err(err) => {
                warn!(uri = %uri, error = %err, "directory listing failed");
                self.emit_unreadable(uri, &err.to_string());
                self.make_placeholder(node, uri);
            }
            Ok(entries) => {
                debug!(uri = %uri, count = entries.len(), "listing");
                for entry in entries {
                    if !self.tree.contains(node) || !self.tree[node].is_directory() {
                        break;
                    }
                    self.add_listed_child(node, uri, entry.name.as_str(), entry.info);
                }
                if self.tree.contains(node) {
                    self.realize_sentinels(node);
                }
            }
        }
        self.emit_size_changed();
    }

    /// Contents of an imported directory asked for by `explore_imported`.
    pub fn on_imported_listing(
        &mut self,
        node: NodeId,
        result: Result<Vec<ImportedEntry>, FetchError>,
    ) {
        let Some(n) = self.tree.get(node) else {
            return;
        };
        if !n.is_exploring() {
            return;
        }
        let path = self.tree.path(node);
        match result {
            Err(err) => {
                self.tree.set_exploring(node, false);
                warn!(path = %path, error = %err, "imported directory unreadable");
                self.emit_unreadable(&path, &err.to_string());
            }
            Ok(entries) => {
                for entry in entries {
                    if let Err(err) = self.add_imported(node, entry) {
                        warn!(path = %path, error = %err, "imported entry skipped");
                    }
                }
                self.tree.mark_explored(node);
                self.emit_changed(node);
                self.emit_size_changed();
            }
        }
    }

    /// Translate a live filesystem change into tree edits.
    pub fn on_monitor_event(&mut self, event: MonitorEvent) {
        debug!(?event, "monitor event");
        match event {
            MonitorEvent::Created { uri } => {
                if let Ok(uri) = uri::canonicalize(&uri) {
                    self.monitor_created(&uri);
                }
            }
            MonitorEvent::Deleted { uri } => {
                if let Ok(uri) = uri::canonicalize(&uri) {
                    self.monitor_deleted(&uri);
                }
            }
            MonitorEvent::Changed { uri } => {
                if let Ok(uri) = uri::canonicalize(&uri) {
                    self.monitor_changed(&uri);
                }
            }
            MonitorEvent::Renamed { from, to } => {
                if let (Ok(from), Ok(to)) = (uri::canonicalize(&from), uri::canonicalize(&to)) {
                    self.monitor_renamed(&from, &to, true);
                }
            }
            MonitorEvent::Moved { from, to } => {
                if let (Ok(from), Ok(to)) = (uri::canonicalize(&from), uri::canonicalize(&to)) {
                    self.monitor_renamed(&from, &to, false);
                }
            }
        }
        self.emit_size_changed();
    }

    /// Returns whether the node is still in the tree afterwards.
    fn apply_info(&mut self, node: NodeId, uri: &str, info: FileInfo) -> bool {
        let first_load = self.tree[node].is_loading();
        let name = self.tree[node].name().to_string();
        let mut kind: NodeKind = info.kind.into();
        let mut is_symlink = false;
        let mut target_uri = None;
        if let Some(target) = &info.symlink_target {
            match self.config.follow_symlinks {
                true => match resolve_symlink(uri, target) {
                    Some(resolved) => target_uri = Some(resolved),
                    None => is_symlink = true,
                },
                false => is_symlink = true,
            }
        }
        if is_symlink {
            kind = NodeKind::File;
        }
        let sectors = match kind {
            NodeKind::File if !is_symlink => sectors_for_bytes(info.size),
            _ => 0,
        };

        if first_load {
            if let Some(parent) = self.tree[node].parent() {
                if !self.depth_allowed(parent, kind, &name) {
                    info!(uri = %uri, "deep content declined");
                    self.remove_subtree(node, true);
                    return false;
                }
            }
        }
        if sectors > TWO_GIB_SECTORS
            && !self.tree[node].is_2gib()
            && !self.policy.oversize_file(&name)
        {
            info!(uri = %uri, sectors, "oversize file declined");
            self.remove_subtree(node, true);
            return false;
        }

        if let Some(target) = &target_uri {
            self.substitute_symlink(node, uri, target);
        }
        if kind == NodeKind::File {
            for child in self.tree[node].children().to_vec() {
                self.remove_subtree(child, false);
            }
        }
        let delta = self.tree.set_from_info(
            node,
            &InfoUpdate {
                kind,
                sectors,
                is_symlink,
                symlink_target: info.symlink_target.clone(),
            },
        );
        debug!(uri = %uri, ?kind, sectors, delta, "info applied");

        let content_uri = target_uri.as_deref().unwrap_or(uri).to_string();
        if kind == NodeKind::Directory && first_load {
            self.tree.set_exploring(node, true);
            self.request(IoRequest::Listing {
                node,
                uri: content_uri.clone(),
            });
        }
        self.watch(node, &content_uri);
        self.emit_changed(node);
        true
    }

    fn watch(&mut self, node: NodeId, uri: &str) {
        let n = &self.tree[node];
        if n.monitored.is_some() || !(n.is_directory() || n.is_grafted()) {
            return;
        }
        self.tree.set_monitored(node, Some(Arc::from(uri)));
        self.request(IoRequest::Watch {
            node,
            uri: uri.to_string(),
        });
    }

    fn unwatch(&mut self, node: NodeId) {
        if let Some(watched) = self.tree[node].monitored.clone() {
            self.tree.set_monitored(node, None);
            self.request(IoRequest::Unwatch {
                uri: watched.to_string(),
            });
        }
    }

    /// The node now stands for the symlink target. The link itself stays
    /// out of its natural location.
    fn substitute_symlink(&mut self, node: NodeId, link: &str, target: &str) {
        let was_grafted_to_link = self.tree[node].graft_uri() == Some(link);
        self.graft_node(node, target);
        if was_grafted_to_link {
            self.settle_row(link, true);
        }
        if !self.grafts.contains_key(link) && self.has_natural_parent(link) {
            let key: Arc<str> = Arc::from(link);
            self.grafts.insert(key.clone(), UriNode::new(key));
        }
        debug!(link = %link, target = %target, "symlink followed");
    }

    fn handle_unreadable(&mut self, node: NodeId, uri: &str, err: &FetchError) {
        warn!(uri = %uri, error = %err, "unreadable");
        self.emit_unreadable(uri, &err.to_string());
        if !self.tree.contains(node) {
            return;
        }
        if self.tree[node].is_directory() {
            self.make_placeholder(node, uri);
            return;
        }
        let parent = self.tree[node].parent();
        let name = self.tree[node].name().to_string();
        self.remove_subtree(node, true);
        if let Some(parent) = parent {
            self.restore_shadowed(parent, &name);
        }
    }

    /// Keep an unreadable directory's place as an empty folder. Content that
    /// came from it goes; content the user placed inside stays.
    fn make_placeholder(&mut self, node: NodeId, uri: &str) {
        for child in self.tree[node].children().to_vec() {
            let c = &self.tree[child];
            if c.is_virtual() {
                self.realize_sentinel(child);
            } else if !c.is_grafted() {
                self.remove_subtree(child, false);
            }
        }
        if self.tree[node].graft_uri() == Some(uri) {
            self.ungraft_node(node);
            self.settle_row(uri, true);
        } else if !self.grafts.contains_key(uri) && self.has_natural_parent(uri) {
            let key: Arc<str> = Arc::from(uri);
            self.grafts.insert(key.clone(), UriNode::new(key));
        }
        self.unwatch(node);
        self.tree.make_fake(node);
        self.tree.set_exploring(node, false);
        self.graft_node(node, NEW_FOLDER);
        let grafted: Vec<String> = self.tree[node]
            .children()
            .iter()
            .filter_map(|c| self.tree[*c].graft_uri().map(str::to_string))
            .collect();
        for child_uri in grafted {
            self.check_graft(&child_uri);
        }
        info!(uri = %uri, path = %self.tree.path(node), "kept as empty folder");
        self.emit_changed(node);
    }

    /// Loading node at a natural location, absorbing a sentinel of the same
    /// name.
    pub(crate) fn place_natural(&mut self, parent: NodeId, name: &str, uri: &str) -> NodeId {
        let orphans = match self.tree.find_child(parent, name) {
            Some(sentinel) if self.tree[sentinel].is_virtual() => self.take_virtual(sentinel),
            _ => Vec::new(),
        };
        let child = self.tree.alloc(FileNode::loading(name));
        if !orphans.is_empty() {
            self.tree.assume_kind(child, NodeKind::Directory);
        }
        self.tree.insert(parent, child, self.sort.as_deref());
        self.joliet_add(child);
        self.adopt(child, orphans);
        self.emit_added(child, Some(uri));
        child
    }

    fn add_listed_child(&mut self, dir: NodeId, dir_uri: &str, name: &str, info: FileInfo) {
        let child_uri = match uri::join(dir_uri, name) {
            Ok(child_uri) => child_uri,
            Err(err) => {
                warn!(uri = %dir_uri, name = %name, error = %err, "listing entry skipped");
                return;
            }
        };
        let existing = self.tree.find_child(dir, name);
        if self.grafts.contains_key(child_uri.as_str()) {
            let pending = existing.filter(|e| {
                let n = &self.tree[*e];
                n.graft_uri() == Some(child_uri.as_str()) && n.is_loading()
            });
            if let Some(pending) = pending {
                self.apply_info(pending, &child_uri, info);
            }
            return;
        }
        if let Some(existing) = existing.filter(|e| !self.tree[*e].is_virtual()) {
            if self.node_to_uri(existing).as_deref() == Some(child_uri.as_str()) {
                let n = &self.tree[existing];
                if n.is_loading() || n.is_reloading() {
                    self.apply_info(existing, &child_uri, info);
                }
            } else {
                self.exclude_natural_slot(&child_uri);
            }
            return;
        }
        let child = self.place_natural(dir, name, &child_uri);
        self.apply_info(child, &child_uri, info);
    }

    /// Sentinels still waiting after their parent was listed have no
    /// natural counterpart; they become plain folders.
    fn realize_sentinels(&mut self, dir: NodeId) {
        let sentinels: Vec<NodeId> = self.tree[dir]
            .children()
            .iter()
            .copied()
            .filter(|c| self.tree[*c].is_virtual())
            .collect();
        for sentinel in sentinels {
            self.realize_sentinel(sentinel);
        }
    }

    /// Turn a sentinel into a synthetic folder. Children that resolved
    /// through it are grafted to their own URIs first so they keep their
    /// source.
    pub(crate) fn realize_sentinel(&mut self, sentinel: NodeId) {
        for child in self.tree[sentinel].children().to_vec() {
            let c = &self.tree[child];
            if c.is_virtual() {
                self.realize_sentinel(child);
            } else if !c.is_grafted() {
                if let Some(child_uri) = self.node_to_uri(child) {
                    self.graft_node(child, &child_uri);
                }
            }
        }
        self.tree.make_real(sentinel);
        self.graft_node(sentinel, NEW_FOLDER);
        self.joliet_add(sentinel);
        debug!(path = %self.tree.path(sentinel), "sentinel kept as folder");
        self.emit_added(sentinel, None);
    }

    fn monitor_created(&mut self, uri: &str) {
        if self.grafts.contains_key(uri) {
            return;
        }
        let (Some(parent_uri), Some(name)) = (uri::parent(uri), uri::basename(uri)) else {
            return;
        };
        for parent in self.uri_to_nodes(&parent_uri) {
            let p = &self.tree[parent];
            if !p.is_directory() || p.is_loading() || p.is_exploring() || p.is_fake() {
                continue;
            }
            match self.tree.find_child(parent, &name) {
                Some(existing) if !self.tree[existing].is_virtual() => {
                    if self.node_to_uri(existing).as_deref() != Some(uri) {
                        self.exclude_natural_slot(uri);
                    }
                }
                _ => {
                    self.add_natural_child(parent, &name, uri);
                }
            }
        }
    }

    fn monitor_deleted(&mut self, uri: &str) {
        let mut victims = self.uri_to_nodes(uri);
        let keys: Vec<Arc<str>> = self
            .grafts
            .keys()
            .filter(|k| k.as_ref() == uri || uri::is_descendant(k, uri))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(row) = self.grafts.get(key) {
                victims.extend(row.nodes.iter().copied());
            }
        }
        for victim in victims {
            if !self.tree.contains(victim) || self.tree[victim].is_root() {
                continue;
            }
            let parent = self.tree[victim].parent();
            let name = self.tree[victim].name().to_string();
            self.remove_subtree(victim, false);
            if let Some(parent) = parent {
                self.restore_shadowed(parent, &name);
            }
        }
        for key in keys {
            if self.grafts.remove(&key).is_some() {
                self.emit_uri_removed(&key);
            }
        }
        info!(uri = %uri, "deleted on disk");
    }

    fn monitor_changed(&mut self, uri: &str) {
        for node in self.uri_to_nodes(uri) {
            if !self.tree[node].is_loading() {
                self.tree.set_state(node, LoadState::Reloading);
                self.request(IoRequest::Info {
                    node,
                    uri: uri.to_string(),
                });
            }
        }
    }

    fn monitor_renamed(&mut self, from: &str, to: &str, same_directory: bool) {
        let natural: Vec<NodeId> = self
            .uri_to_nodes(from)
            .into_iter()
            .filter(|n| !self.tree[*n].is_grafted())
            .collect();

        // explicit grafts follow the content
        let keys: Vec<Arc<str>> = self
            .grafts
            .keys()
            .filter(|k| k.as_ref() == from || uri::is_descendant(k, from))
            .cloned()
            .collect();
        for key in keys {
            let (Some(new_uri), Some(row)) = (uri::rebase(&key, from, to), self.grafts.remove(&key))
            else {
                continue;
            };
            let new_key: Arc<str> = match self.grafts.get_key_value(new_uri.as_str()) {
                Some((existing, _)) => existing.clone(),
                None => Arc::from(new_uri.as_str()),
            };
            for node in &row.nodes {
                self.tree.set_graft(*node, new_key.clone());
            }
            self.grafts
                .entry(new_key.clone())
                .or_insert_with(|| UriNode::new(new_key.clone()))
                .nodes
                .extend(row.nodes);
            debug!(from = %key, to = %new_key, "graft follows rename");
        }

        if same_directory {
            if let Some(new_name) = uri::basename(to) {
                for node in natural {
                    if self.tree.contains(node) {
                        self.follow_rename(node, &new_name, to);
                    }
                }
            }
        } else {
            for node in natural {
                if !self.tree.contains(node) {
                    continue;
                }
                let parent = self.tree[node].parent();
                let name = self.tree[node].name().to_string();
                self.remove_subtree(node, false);
                if let Some(parent) = parent {
                    self.restore_shadowed(parent, &name);
                }
            }
            self.monitor_created(to);
        }
        self.rebase_watches(from, to);
        self.check_graft_below(to);
    }

    /// A natural node whose source was renamed takes the new name, unless
    /// that name is taken, in which case it keeps its name and gets grafted.
    fn follow_rename(&mut self, node: NodeId, new_name: &str, to: &str) {
        let Some(parent) = self.tree[node].parent() else {
            return;
        };
        let orphans = match self.tree.find_child(parent, new_name) {
            Some(sentinel) if self.tree[sentinel].is_virtual() => self.take_virtual(sentinel),
            Some(other) if other != node => {
                self.graft_node(node, to);
                self.emit_changed(node);
                return;
            }
            _ => Vec::new(),
        };
        let old_name = self.tree[node].name().to_string();
        self.joliet_remove(node);
        self.tree.rename(node, new_name);
        self.joliet_add(node);
        self.adopt(node, orphans);
        if let Some((old, new)) = self.tree.reposition(node, self.sort.as_deref()) {
            let order = single_move_order(self.tree[parent].children().len(), old, new);
            self.emit_reordered(parent, &order);
        }
        self.restore_shadowed(parent, &old_name);
        self.emit_changed(node);
    }

    fn rebase_watches(&mut self, from: &str, to: &str) {
        let root = self.tree.root();
        for node in self.tree.descendants(root) {
            let Some(watched) = self.tree[node].monitored.clone() else {
                continue;
            };
            if let Some(rebased) = uri::rebase(&watched, from, to) {
                self.tree.set_monitored(node, Some(Arc::from(rebased.as_str())));
                self.request(IoRequest::Unwatch {
                    uri: watched.to_string(),
                });
                self.request(IoRequest::Watch { node, uri: rebased });
            }
        }
    }

    /// Re-check rows at or below `uri`.
    fn check_graft_below(&mut self, uri: &str) {
        let keys: Vec<String> = self
            .grafts
            .keys()
            .filter(|k| k.as_ref() == uri || uri::is_descendant(k, uri))
            .map(|k| k.to_string())
            .collect();
        for key in keys {
            self.check_graft(&key);
        }
    }
}

/// URI a symlink at `link` points to. `None` when the target cannot be
/// expressed or loops back onto the link's own ancestry.
fn resolve_symlink(link: &str, target: &str) -> Option<String> {
    let resolved = if target.contains("://") {
        uri::canonicalize(target).ok()?
    } else if target.starts_with('/') {
        uri::from_file_path(Path::new(target)).ok()?
    } else {
        let mut current = uri::parent(link)?;
        for segment in target.split('/') {
            match segment {
                "" | "." => {}
                ".." => current = uri::parent(&current)?,
                name => current = uri::join(&current, name).ok()?,
            }
        }
        current
    };
    if resolved == link || uri::is_descendant(link, &resolved) {
        return None;
    }
    Some(resolved)
}
