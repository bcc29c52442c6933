//! Multi-disc spanning
//!
//! Top-level children are handed out to discs first fit, in sibling order.
//! Each candidate disc is checked with its real data size plus an estimate
//! of the ISO9660 (and Joliet) structures the writer will add.

use super::contents::{Contents, ExportOptions};
use super::DataProject;
use crate::error::ProjectError;
use crate::types::{NodeId, JOLIET_NAME_MAX, SECTOR_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Sectors before the first volume descriptor
const SYSTEM_AREA_SECTORS: u64 = 16;
/// Fixed part of a directory record
const RECORD_BASE: u64 = 33;
/// "." and ".." records that open every directory
const DOT_RECORDS: u64 = 68;
/// Longest identifier that keeps an ISO9660 record under 255 bytes
const ISO_NAME_MAX: u64 = 222;

/// Answer of [`DataProject::span_possible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanStatus {
    /// Everything has been assigned to a disc
    Complete,
    /// Some remaining item fits on an empty disc
    Possible,
    /// Items remain but none fits on its own
    TooLarge,
}

fn even(len: u64) -> u64 {
    len + (len & 1)
}

/// Directory-record and path-table space of one image.
#[derive(Debug, Clone, Default)]
struct ImageOverhead {
    directory_sectors: u64,
    path_table_bytes: u64,
    joliet_directory_sectors: u64,
    joliet_path_table_bytes: u64,
}

impl ImageOverhead {
    /// Records never straddle a sector boundary.
    fn records_to_sectors(records: impl Iterator<Item = u64>) -> u64 {
        let mut sectors = 1;
        let mut used = DOT_RECORDS;
        for record in records {
            if used + record > SECTOR_SIZE {
                sectors += 1;
                used = 0;
            }
            used += record;
        }
        sectors
    }

    fn iso_record(name: &str, is_file: bool) -> u64 {
        let len = (name.len() as u64).min(ISO_NAME_MAX) + if is_file { 2 } else { 0 };
        even(RECORD_BASE + len)
    }

    fn joliet_record(name: &str, is_file: bool) -> u64 {
        let chars = (name.chars().count() as u64).min(JOLIET_NAME_MAX as u64);
        even(RECORD_BASE + 2 * chars + if is_file { 4 } else { 0 })
    }

    /// Account for one directory called `name` holding `children`
    /// (name, is_file).
    fn add_directory(&mut self, name: &str, children: &[(String, bool)]) {
        let iso_name = if name.is_empty() { 1 } else { name.len() as u64 };
        let joliet_name = if name.is_empty() {
            1
        } else {
            2 * (name.chars().count() as u64).min(JOLIET_NAME_MAX as u64)
        };
        self.directory_sectors += Self::records_to_sectors(
            children
                .iter()
                .map(|(child, is_file)| Self::iso_record(child, *is_file)),
        );
        self.joliet_directory_sectors += Self::records_to_sectors(
            children
                .iter()
                .map(|(child, is_file)| Self::joliet_record(child, *is_file)),
        );
        self.path_table_bytes += even(8 + iso_name.min(ISO_NAME_MAX));
        self.joliet_path_table_bytes += even(8 + joliet_name);
    }

    fn sectors(&self, joliet: bool, end_pad: u64) -> u64 {
        let path_tables = |bytes: u64| 2 * bytes.div_ceil(SECTOR_SIZE);
        let mut total = SYSTEM_AREA_SECTORS
            + 2
            + self.directory_sectors
            + path_tables(self.path_table_bytes);
        if joliet {
            total += 1 + self.joliet_directory_sectors + path_tables(self.joliet_path_table_bytes);
        }
        total + end_pad
    }
}

impl DataProject {
    /// Data sectors of the whole project.
    pub fn sectors(&self) -> u64 {
        self.tree.total_sectors(self.tree.root())
    }

    /// Estimated image size in sectors, file system structures included.
    pub fn image_size(&self, joliet: bool) -> u64 {
        self.sectors() + self.image_overhead(&self.top_level_items(), joliet)
    }

    fn image_overhead(&self, tops: &[NodeId], joliet: bool) -> u64 {
        let mut overhead = ImageOverhead::default();
        let entry = |id: NodeId| {
            let n = &self.tree[id];
            (n.name().to_string(), !n.is_directory())
        };
        let root_entries: Vec<(String, bool)> = tops.iter().map(|t| entry(*t)).collect();
        overhead.add_directory("", &root_entries);
        for top in tops {
            for id in self.tree.descendants(*top) {
                let n = &self.tree[id];
                if !n.is_directory() || n.is_virtual() {
                    continue;
                }
                let children: Vec<(String, bool)> =
                    self.tree.visible_children(id).map(entry).collect();
                overhead.add_directory(n.name(), &children);
            }
        }
        overhead.sectors(joliet, self.config.span_end_pad)
    }

    fn top_level_items(&self) -> Vec<NodeId> {
        self.tree
            .visible_children(self.tree.root())
            .filter(|c| !self.tree[*c].is_imported())
            .collect()
    }

    /// Root children still waiting for a disc, in sibling order.
    fn span_candidates(&self, spanned: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut items = self.top_level_items();
        items.retain(|c| !spanned.contains(c));
        items
    }

    /// First-fit selection of the next disc out of `remaining`.
    fn select_disc(&self, remaining: &[NodeId], max_sectors: u64, joliet: bool) -> Vec<NodeId> {
        let mut chosen = Vec::new();
        let mut data = 0;
        for candidate in remaining {
            let size = self.tree.total_sectors(*candidate);
            chosen.push(*candidate);
            if data + size + self.image_overhead(&chosen, joliet) <= max_sectors {
                data += size;
            } else {
                chosen.pop();
            }
        }
        chosen
    }

    /// Assign the next disc's worth of top-level content and export it.
    ///
    /// Fails with [`ProjectError::NothingToSpan`] when no remaining item fits
    /// in `max_sectors`.
    pub fn span(
        &mut self,
        max_sectors: u64,
        options: &ExportOptions,
    ) -> Result<Contents, ProjectError> {
        let remaining = self.span_candidates(&self.spanned);
        let chosen = self.select_disc(&remaining, max_sectors, options.joliet_compat);
        if chosen.is_empty() {
            return Err(ProjectError::NothingToSpan(max_sectors));
        }
        self.spanned.extend(chosen.iter().copied());
        self.last_span = chosen.clone();
        let contents = self.collect_contents(options, |top| chosen.contains(&top));
        info!(
            items = chosen.len(),
            remaining = remaining.len() - chosen.len(),
            max_sectors,
            "disc spanned"
        );
        Ok(contents)
    }

    /// Put the content of the last disc back into the pool so the next
    /// [`span`](Self::span) call selects it again.
    pub fn span_again(&mut self) {
        for node in self.last_span.drain(..) {
            self.spanned.remove(&node);
        }
        debug!("last span released");
    }

    /// Forget every assignment.
    pub fn span_stop(&mut self) {
        self.spanned.clear();
        self.last_span.clear();
        debug!("spanning stopped");
    }

    pub fn span_possible(&self, max_sectors: u64) -> SpanStatus {
        let remaining = self.span_candidates(&self.spanned);
        if remaining.is_empty() {
            return SpanStatus::Complete;
        }
        let fits = remaining.iter().any(|c| {
            self.tree.total_sectors(*c) + self.image_overhead(&[*c], self.config.joliet)
                <= max_sectors
        });
        if fits {
            SpanStatus::Possible
        } else {
            SpanStatus::TooLarge
        }
    }

    /// Number of discs the remaining content needs, `None` when some item
    /// can never fit.
    pub fn span_count(&self, max_sectors: u64) -> Option<usize> {
        let mut spanned = self.spanned.clone();
        let mut discs = 0;
        loop {
            let remaining = self.span_candidates(&spanned);
            if remaining.is_empty() {
                return Some(discs);
            }
            let chosen = self.select_disc(&remaining, max_sectors, self.config.joliet);
            if chosen.is_empty() {
                return None;
            }
            spanned.extend(chosen);
            discs += 1;
        }
    }

    /// Whether a top-level node is already assigned to a disc.
    pub fn is_spanned(&self, node: NodeId) -> bool {
        self.spanned.contains(&node)
    }
}
