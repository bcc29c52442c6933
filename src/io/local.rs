//! Metadata and directory listings for local files.

use crate::error::ProjectError;
use crate::project::{FetchError, FileInfo, FileKind, IoRequest, ListingEntry};
use crate::types::NodeId;
use crate::uri;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Answer to an `Info` or `Listing` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoResult {
    Info {
        node: NodeId,
        uri: String,
        result: Result<FileInfo, FetchError>,
    },
    Listing {
        node: NodeId,
        uri: String,
        result: Result<Vec<ListingEntry>, FetchError>,
    },
}

impl IoResult {
    pub fn node(&self) -> NodeId {
        match self {
            IoResult::Info { node, .. } | IoResult::Listing { node, .. } => *node,
        }
    }
}

fn kind_of(metadata: &Metadata) -> FileKind {
    if metadata.is_dir() {
        FileKind::Directory
    } else {
        FileKind::Regular
    }
}

fn path_info(path: &Path) -> Result<FileInfo, FetchError> {
    let metadata = std::fs::symlink_metadata(path)?;
    if !metadata.file_type().is_symlink() {
        return Ok(match kind_of(&metadata) {
            FileKind::Directory => FileInfo::directory(),
            FileKind::Regular => FileInfo::file(metadata.len()),
        });
    }
    // dangling links keep their raw target
    let target = dunce::canonicalize(path).or_else(|_| std::fs::read_link(path))?;
    let target = target.to_string_lossy().into_owned();
    Ok(match std::fs::metadata(path) {
        Ok(resolved) => FileInfo::symlink(&target, kind_of(&resolved), resolved.len()),
        Err(_) => FileInfo::symlink(&target, FileKind::Regular, 0),
    })
}

/// Type, size and symlink target of a `file://` URI.
pub fn fetch_info(uri: &str) -> Result<FileInfo, FetchError> {
    let path = uri::to_file_path(uri).map_err(|_| FetchError::Unsupported)?;
    path_info(&path)
}

/// Children of a `file://` directory, sorted by name. Entries that vanish
/// or cannot be read while listing are skipped.
pub fn fetch_listing(uri: &str) -> Result<Vec<ListingEntry>, FetchError> {
    let path = uri::to_file_path(uri).map_err(|_| FetchError::Unsupported)?;
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match path_info(&entry.path()) {
            Ok(info) => entries.push(ListingEntry { name, info }),
            Err(err) => warn!(path = %entry.path().display(), error = %err, "entry skipped"),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Runs fetches on a blocking pool and hands results back in order of
/// completion.
pub struct LocalFetcher {
    runtime: Runtime,
    tx: mpsc::UnboundedSender<IoResult>,
    rx: mpsc::UnboundedReceiver<IoResult>,
    cancelled: Arc<Mutex<HashSet<NodeId>>>,
    in_flight: HashMap<NodeId, usize>,
    outstanding: usize,
}

impl LocalFetcher {
    pub fn new() -> Result<Self, ProjectError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("discgraft-io")
            .enable_time()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            tx,
            rx,
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            in_flight: HashMap::new(),
            outstanding: 0,
        })
    }

    /// Start work for a request. Returns `false` for requests this fetcher
    /// does not handle.
    pub fn submit(&mut self, request: &IoRequest) -> bool {
        let (node, uri, listing) = match request {
            IoRequest::Info { node, uri } => (*node, uri.clone(), false),
            IoRequest::Listing { node, uri } => (*node, uri.clone(), true),
            IoRequest::Cancel { node } => {
                self.cancel(*node);
                return true;
            }
            _ => return false,
        };
        let pending = self.in_flight.entry(node).or_default();
        if *pending == 0 {
            self.cancelled.lock().remove(&node);
        }
        *pending += 1;
        let tx = self.tx.clone();
        let cancelled = Arc::clone(&self.cancelled);
        self.outstanding += 1;
        self.runtime.spawn_blocking(move || {
            let result = if cancelled.lock().contains(&node) {
                let reason = FetchError::Other("cancelled".to_string());
                match listing {
                    true => IoResult::Listing { node, uri, result: Err(reason) },
                    false => IoResult::Info { node, uri, result: Err(reason) },
                }
            } else if listing {
                let result = fetch_listing(&uri);
                IoResult::Listing { node, uri, result }
            } else {
                let result = fetch_info(&uri);
                IoResult::Info { node, uri, result }
            };
            if tx.send(result).is_err() {
                debug!(node = %node, "fetch result dropped, receiver gone");
            }
        });
        true
    }

    /// Results for `node` that have not been delivered yet are dropped.
    /// The mark lives until the last of them comes back.
    pub fn cancel(&mut self, node: NodeId) {
        if self.in_flight.contains_key(&node) {
            self.cancelled.lock().insert(node);
        }
    }

    /// Number of submitted requests whose result has not been received.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    fn accept(&mut self, result: IoResult) -> Option<IoResult> {
        self.outstanding = self.outstanding.saturating_sub(1);
        let node = result.node();
        let pending = self.in_flight.remove(&node).unwrap_or_default();
        let last = pending <= 1;
        if !last {
            self.in_flight.insert(node, pending - 1);
        }
        let mut cancelled = self.cancelled.lock();
        let discard = if last {
            cancelled.remove(&node)
        } else {
            cancelled.contains(&node)
        };
        drop(cancelled);
        if discard {
            debug!(node = %result.node(), "cancelled result discarded");
            return None;
        }
        Some(result)
    }

    /// Next finished result without waiting.
    pub fn try_recv(&mut self) -> Option<IoResult> {
        loop {
            let result = self.rx.try_recv().ok()?;
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
    }

    /// Wait up to `timeout` for the next finished result.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<IoResult> {
        loop {
            let rx = &mut self.rx;
            let received = self
                .runtime
                .block_on(async { tokio::time::timeout(timeout, rx.recv()).await });
            let result = received.ok().flatten()?;
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn file_uri(path: &Path) -> String {
        uri::from_file_path(path).unwrap()
    }

    #[test]
    fn test_fetch_info_for_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, vec![0u8; 5000]).unwrap();

        assert_eq!(fetch_info(&file_uri(&file)).unwrap(), FileInfo::file(5000));
        assert_eq!(
            fetch_info(&file_uri(dir.path())).unwrap(),
            FileInfo::directory()
        );
        assert_eq!(
            fetch_info(&file_uri(&dir.path().join("missing"))),
            Err(FetchError::NotFound)
        );
        assert_eq!(
            fetch_info("https://example.com/file"),
            Err(FetchError::Unsupported)
        );
    }

    #[test]
    fn test_fetch_listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = fetch_listing(&file_uri(dir.path())).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[2].info, FileInfo::directory());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_reports_canonical_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        fs::write(&target, vec![1u8; 10]).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("target.txt", &link).unwrap();

        let info = fetch_info(&file_uri(&link)).unwrap();
        assert_eq!(info.kind, FileKind::Regular);
        assert_eq!(info.size, 10);
        let expected = dunce::canonicalize(&target).unwrap();
        assert_eq!(info.symlink_target.as_deref(), expected.to_str());

        std::os::unix::fs::symlink("nowhere", dir.path().join("dangling")).unwrap();
        let info = fetch_info(&file_uri(&dir.path().join("dangling"))).unwrap();
        assert_eq!(info.symlink_target.as_deref(), Some("nowhere"));
    }

    #[test]
    fn test_fetcher_delivers_results() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"hello").unwrap();
        let mut fetcher = LocalFetcher::new().unwrap();
        let node = NodeId {
            index: 1,
            generation: 0,
        };
        assert!(fetcher.submit(&IoRequest::Info {
            node,
            uri: file_uri(&file),
        }));
        assert!(!fetcher.submit(&IoRequest::Unwatch { uri: file_uri(&file) }));
        assert_eq!(fetcher.outstanding(), 1);

        let result = fetcher.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            result,
            IoResult::Info {
                node,
                uri: file_uri(&file),
                result: Ok(FileInfo::file(5)),
            }
        );
        assert_eq!(fetcher.outstanding(), 0);
        assert!(fetcher.try_recv().is_none());
    }

    #[test]
    fn test_cancel_without_pending_work_leaves_no_mark() {
        let mut fetcher = LocalFetcher::new().unwrap();
        let node = NodeId {
            index: 3,
            generation: 1,
        };
        assert!(fetcher.submit(&IoRequest::Cancel { node }));
        assert!(fetcher.cancelled.lock().is_empty());
        assert!(fetcher.in_flight.is_empty());
    }

    #[test]
    fn test_cancelled_fetch_is_discarded_and_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"hello").unwrap();
        let mut fetcher = LocalFetcher::new().unwrap();
        let node = NodeId {
            index: 2,
            generation: 0,
        };
        let request = IoRequest::Info {
            node,
            uri: file_uri(&file),
        };
        fetcher.submit(&request);
        fetcher.submit(&request);
        fetcher.cancel(node);

        assert!(fetcher.recv_timeout(Duration::from_millis(500)).is_none());
        assert_eq!(fetcher.outstanding(), 0);
        assert!(fetcher.cancelled.lock().is_empty());
        assert!(fetcher.in_flight.is_empty());

        fetcher.submit(&request);
        assert!(fetcher.recv_timeout(Duration::from_secs(5)).is_some());
    }
}
