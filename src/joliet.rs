//! Joliet name tracking
//!
//! Joliet stores at most 64 characters per name. Nodes with longer names are
//! kept in a side table keyed by parent and truncated name, so the export can
//! force an explicit graft for each of them and the image writer can give
//! every one a distinct name.

use crate::types::{NodeId, JOLIET_NAME_MAX};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Longest extension (without the dot) preserved by truncation.
const EXTENSION_MAX: usize = 4;

/// Whether `name` fits in a Joliet directory record.
pub fn is_joliet_compatible(name: &str) -> bool {
    name.len() <= JOLIET_NAME_MAX
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut index = index;
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Name a Joliet encoder would keep: the first bytes of `name` up to the
/// limit, with a short extension carried over.
pub fn joliet_name(name: &str) -> String {
    let name: String = name.nfc().collect();
    if name.len() <= JOLIET_NAME_MAX {
        return name;
    }
    let extension = name
        .rfind('.')
        .filter(|dot| *dot > 0)
        .map(|dot| &name[dot..])
        .filter(|ext| ext.len() > 1 && ext.len() <= EXTENSION_MAX + 1);
    match extension {
        Some(ext) => {
            let cut = floor_char_boundary(&name, JOLIET_NAME_MAX - ext.len());
            format!("{}{}", &name[..cut], ext)
        }
        None => {
            let cut = floor_char_boundary(&name, JOLIET_NAME_MAX);
            name[..cut].to_string()
        }
    }
}

/// Parent identity plus truncated name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JolietKey {
    pub parent: NodeId,
    pub name: String,
}

impl JolietKey {
    pub fn new(parent: NodeId, name: &str) -> Self {
        Self {
            parent,
            name: joliet_name(name),
        }
    }
}

/// Joliet-incompatible nodes grouped by colliding key.
#[derive(Debug, Default)]
pub struct JolietTable {
    entries: HashMap<JolietKey, Vec<NodeId>>,
}

impl JolietTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` if its name is too long. Returns whether it was added.
    pub fn add(&mut self, parent: NodeId, name: &str, node: NodeId) -> bool {
        if is_joliet_compatible(name) {
            return false;
        }
        let nodes = self.entries.entry(JolietKey::new(parent, name)).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
        true
    }

    /// Forget `node` under the key derived from `parent` and `name`.
    pub fn remove(&mut self, parent: NodeId, name: &str, node: NodeId) -> bool {
        if is_joliet_compatible(name) {
            return false;
        }
        let key = JolietKey::new(parent, name);
        let Some(nodes) = self.entries.get_mut(&key) else {
            return false;
        };
        let before = nodes.len();
        nodes.retain(|n| *n != node);
        let removed = nodes.len() != before;
        if nodes.is_empty() {
            self.entries.remove(&key);
        }
        removed
    }

    /// Forget every entry for nodes under `parent`.
    pub fn remove_parent(&mut self, parent: NodeId) {
        self.entries.retain(|key, _| key.parent != parent);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.values().any(|nodes| nodes.contains(&node))
    }

    pub fn get(&self, key: &JolietKey) -> Option<&[NodeId]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    /// Every tracked node
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.values().flatten().copied()
    }

    /// Keys shared by more than one node
    pub fn collisions(&self) -> impl Iterator<Item = (&JolietKey, &[NodeId])> {
        self.entries
            .iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(key, nodes)| (key, nodes.as_slice()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
