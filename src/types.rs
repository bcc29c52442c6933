//! Core types for the disc project tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one data sector on an optical disc, in bytes.
pub const SECTOR_SIZE: u64 = 2048;

/// Sector count above which a single file needs ISO9660 level 3.
pub const TWO_GIB_SECTORS: u64 = 1_048_576;

/// Maximum Joliet name length, in bytes.
pub const JOLIET_NAME_MAX: usize = 64;

/// Directories at or below this depth (root children are depth 1) are deep.
pub const DEEP_DIRECTORY_DEPTH: usize = 5;

/// Files at or below this depth are deep.
pub const DEEP_FILE_DEPTH: usize = 6;

/// Graft URI recorded for directories created by the user with no backing.
pub const NEW_FOLDER: &str = "NewFolder";

/// Number of sectors needed to store `bytes`.
pub fn sectors_for_bytes(bytes: u64) -> u64 {
    bytes.div_ceil(SECTOR_SIZE)
}

/// NodeId: generation-checked handle of a node in the project tree.
///
/// A handle stays valid until its node is destroyed. After that it never
/// resolves again, even when the arena slot is recycled, so asynchronous
/// callers can keep handles across fetch round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}
