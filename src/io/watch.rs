//! Filesystem watches through `notify`.

use crate::error::ProjectError;
use crate::project::MonitorEvent;
use crate::uri;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, warn};

fn watch_error(action: &str, path: &Path, err: notify::Error) -> ProjectError {
    ProjectError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to {} {}: {}", action, path.display(), err),
    ))
}

fn to_uri(path: &Path) -> Option<String> {
    match uri::from_file_path(path) {
        Ok(uri) => Some(uri),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "event path skipped");
            None
        }
    }
}

/// Translate one `notify` event. Paths that cannot be expressed as URIs
/// are dropped.
pub fn convert_event(event: &Event) -> Vec<MonitorEvent> {
    let uris = || event.paths.iter().filter_map(|p| to_uri(p));
    match event.kind {
        EventKind::Create(_) => uris().map(|uri| MonitorEvent::Created { uri }).collect(),
        EventKind::Remove(_) => uris().map(|uri| MonitorEvent::Deleted { uri }).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let (Some(from), Some(to)) = (to_uri(&event.paths[0]), to_uri(&event.paths[1])) else {
                return Vec::new();
            };
            if uri::parent(&from) == uri::parent(&to) {
                vec![MonitorEvent::Renamed { from, to }]
            } else {
                vec![MonitorEvent::Moved { from, to }]
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            uris().map(|uri| MonitorEvent::Deleted { uri }).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            uris().map(|uri| MonitorEvent::Created { uri }).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|p| {
                let uri = to_uri(p)?;
                Some(match p.exists() {
                    true => MonitorEvent::Created { uri },
                    false => MonitorEvent::Deleted { uri },
                })
            })
            .collect(),
        EventKind::Modify(_) => uris().map(|uri| MonitorEvent::Changed { uri }).collect(),
        _ => Vec::new(),
    }
}

/// Reference-counted, non-recursive watches keyed by local path.
pub struct FsWatcher {
    watcher: Mutex<RecommendedWatcher>,
    rx: Mutex<mpsc::Receiver<notify::Result<Event>>>,
    watched: Mutex<HashMap<PathBuf, usize>>,
}

impl FsWatcher {
    pub fn new() -> Result<Self, ProjectError> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| watch_error("create watcher for", Path::new("."), e))?;
        Ok(Self {
            watcher: Mutex::new(watcher),
            rx: Mutex::new(rx),
            watched: Mutex::new(HashMap::new()),
        })
    }

    pub fn watch(&self, uri: &str) -> Result<(), ProjectError> {
        let path = uri::to_file_path(uri)?;
        let mut watched = self.watched.lock();
        if let Some(count) = watched.get_mut(&path) {
            *count += 1;
            return Ok(());
        }
        self.watcher
            .lock()
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error("watch", &path, e))?;
        debug!(path = %path.display(), "watching");
        watched.insert(path, 1);
        Ok(())
    }

    pub fn unwatch(&self, uri: &str) -> Result<(), ProjectError> {
        let path = uri::to_file_path(uri)?;
        let mut watched = self.watched.lock();
        let Some(count) = watched.get_mut(&path) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }
        watched.remove(&path);
        match self.watcher.lock().unwatch(&path) {
            Ok(()) => debug!(path = %path.display(), "unwatched"),
            // the path may already be gone
            Err(e) => debug!(path = %path.display(), error = %e, "unwatch failed"),
        }
        Ok(())
    }

    pub fn is_watching(&self, uri: &str) -> bool {
        uri::to_file_path(uri).is_ok_and(|path| self.watched.lock().contains_key(&path))
    }

    pub fn watch_count(&self) -> usize {
        self.watched.lock().len()
    }

    /// Events already delivered by `notify`.
    pub fn try_events(&self) -> Vec<MonitorEvent> {
        let rx = self.rx.lock();
        let mut events = Vec::new();
        while let Ok(res) = rx.try_recv() {
            Self::collect(res, &mut events);
        }
        events
    }

    /// Wait up to `timeout` for at least one event, then drain the rest.
    pub fn wait_events(&self, timeout: Duration) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        {
            let rx = self.rx.lock();
            match rx.recv_timeout(timeout) {
                Ok(res) => Self::collect(res, &mut events),
                Err(mpsc::RecvTimeoutError::Timeout) => return events,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    return events;
                }
            }
        }
        events.extend(self.try_events());
        events
    }

    fn collect(res: notify::Result<Event>, events: &mut Vec<MonitorEvent>) {
        match res {
            Ok(event) => events.extend(convert_event(&event)),
            Err(e) => warn!("Watch error: {}", e),
        }
    }
}
