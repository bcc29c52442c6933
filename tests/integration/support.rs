//! In-memory collaborator answering project requests.

use discgraft::project::{FetchError, FileInfo, IoRequest, ListingEntry};
use discgraft::{uri, DataProject};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone)]
pub struct FakeFs {
    files: BTreeMap<String, u64>,
    dirs: BTreeSet<String>,
}

impl FakeFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and every missing parent directory.
    pub fn file(mut self, file_uri: &str, bytes: u64) -> Self {
        self.add_parents(file_uri);
        self.files.insert(file_uri.to_string(), bytes);
        self
    }

    pub fn dir(mut self, dir_uri: &str) -> Self {
        self.add_parents(dir_uri);
        self.dirs.insert(dir_uri.to_string());
        self
    }

    fn add_parents(&mut self, child: &str) {
        let mut current = uri::parent(child);
        while let Some(parent) = current {
            if uri::parent(&parent).is_none() {
                break;
            }
            current = uri::parent(&parent);
            self.dirs.insert(parent);
        }
    }

    pub fn info(&self, target: &str) -> Result<FileInfo, FetchError> {
        if self.dirs.contains(target) {
            Ok(FileInfo::directory())
        } else if let Some(bytes) = self.files.get(target) {
            Ok(FileInfo::file(*bytes))
        } else {
            Err(FetchError::NotFound)
        }
    }

    pub fn listing(&self, dir: &str) -> Result<Vec<ListingEntry>, FetchError> {
        if !self.dirs.contains(dir) {
            return Err(FetchError::NotFound);
        }
        let children = self.dirs.iter().chain(self.files.keys());
        let mut entries: Vec<ListingEntry> = children
            .filter(|child| uri::parent(child).as_deref() == Some(dir))
            .filter_map(|child| {
                Some(ListingEntry {
                    name: uri::basename(child)?,
                    info: self.info(child).ok()?,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Answer requests until the project stops asking.
    pub fn settle(&self, project: &mut DataProject) {
        loop {
            let requests = project.take_requests();
            if requests.is_empty() {
                return;
            }
            for request in requests {
                match request {
                    IoRequest::Info { node, uri } => {
                        let result = self.info(&uri);
                        project.on_info_result(node, &uri, result);
                    }
                    IoRequest::Listing { node, uri } => {
                        let result = self.listing(&uri);
                        project.on_listing_result(node, &uri, result);
                    }
                    _ => {}
                }
            }
        }
    }
}
