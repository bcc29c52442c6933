//! Aggregate statistics kept by the tree root.

use super::node::FileNode;
use serde::{Deserialize, Serialize};

/// Counters for the whole tree. Virtual nodes and the root are never counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub num_dir: u32,
    pub num_file: u32,
    pub num_sym: u32,
    pub num_2gib: u32,
    pub num_deep: u32,
}

impl TreeStats {
    pub(crate) fn add(&mut self, node: &FileNode) {
        if node.is_virtual || node.is_root {
            return;
        }
        if node.is_directory() {
            self.num_dir += 1;
        } else if node.is_symlink {
            self.num_sym += 1;
        } else {
            self.num_file += 1;
        }
        if node.is_2gib {
            self.num_2gib += 1;
        }
        if node.is_deep {
            self.num_deep += 1;
        }
    }

    pub(crate) fn remove(&mut self, node: &FileNode) {
        if node.is_virtual || node.is_root {
            return;
        }
        if node.is_directory() {
            self.num_dir -= 1;
        } else if node.is_symlink {
            self.num_sym -= 1;
        } else {
            self.num_file -= 1;
        }
        if node.is_2gib {
            self.num_2gib -= 1;
        }
        if node.is_deep {
            self.num_deep -= 1;
        }
    }
}
