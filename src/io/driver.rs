//! Control loop tying a project to its local collaborators.

use super::local::{IoResult, LocalFetcher};
use super::watch::FsWatcher;
use crate::error::ProjectError;
use crate::project::{DataProject, FetchError, IoRequest};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Owns a project and runs its requests against the local filesystem.
///
/// Everything that touches the project happens on the caller's thread;
/// only the fetches themselves run on the worker pool.
pub struct ProjectDriver {
    project: DataProject,
    fetcher: LocalFetcher,
    watcher: Option<FsWatcher>,
}

impl ProjectDriver {
    pub fn new(project: DataProject) -> Result<Self, ProjectError> {
        Ok(Self {
            project,
            fetcher: LocalFetcher::new()?,
            watcher: None,
        })
    }

    /// Also follow live changes of watched content.
    pub fn with_watcher(mut self) -> Result<Self, ProjectError> {
        self.watcher = Some(FsWatcher::new()?);
        Ok(self)
    }

    pub fn project(&self) -> &DataProject {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut DataProject {
        &mut self.project
    }

    pub fn into_project(self) -> DataProject {
        self.project
    }

    pub fn watcher(&self) -> Option<&FsWatcher> {
        self.watcher.as_ref()
    }

    /// Whether nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.fetcher.outstanding() == 0 && !self.project.has_pending_requests()
    }

    fn dispatch(&mut self) {
        for request in self.project.take_requests() {
            match &request {
                IoRequest::Info { .. } | IoRequest::Listing { .. } | IoRequest::Cancel { .. } => {
                    self.fetcher.submit(&request);
                }
                IoRequest::Watch { uri, .. } => match &self.watcher {
                    Some(watcher) => {
                        if let Err(err) = watcher.watch(uri) {
                            warn!(uri = %uri, error = %err, "watch failed");
                        }
                    }
                    None => debug!(uri = %uri, "no watcher, watch ignored"),
                },
                IoRequest::Unwatch { uri } => {
                    if let Some(watcher) = &self.watcher {
                        if let Err(err) = watcher.unwatch(uri) {
                            warn!(uri = %uri, error = %err, "unwatch failed");
                        }
                    }
                }
                IoRequest::ExploreImported { node, path } => {
                    debug!(path = %path, "no session reader for imported content");
                    self.project
                        .on_imported_listing(*node, Err(FetchError::Unsupported));
                }
            }
        }
    }

    fn apply(&mut self, result: IoResult) {
        match result {
            IoResult::Info { node, uri, result } => self.project.on_info_result(node, &uri, result),
            IoResult::Listing { node, uri, result } => {
                self.project.on_listing_result(node, &uri, result)
            }
        }
    }

    fn apply_monitor_events(&mut self) -> usize {
        let Some(watcher) = &self.watcher else {
            return 0;
        };
        let events = watcher.try_events();
        let count = events.len();
        for event in events {
            self.project.on_monitor_event(event);
        }
        count
    }

    /// Hand out queued requests and apply whatever has come back, without
    /// waiting. Returns the number of results and events applied.
    pub fn pump(&mut self) -> usize {
        self.dispatch();
        let mut applied = 0;
        while let Some(result) = self.fetcher.try_recv() {
            self.apply(result);
            applied += 1;
        }
        applied += self.apply_monitor_events();
        self.dispatch();
        applied
    }

    /// Run until no request is queued or in flight. Returns `false` when
    /// `timeout` ran out first.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.dispatch();
            self.apply_monitor_events();
            if self.is_idle() {
                info!(
                    sectors = self.project.sectors(),
                    nodes = self.project.tree().len() - 1,
                    "project idle"
                );
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(outstanding = self.fetcher.outstanding(), "timed out waiting for fetches");
                return false;
            }
            if let Some(result) = self.fetcher.recv_timeout(deadline - now) {
                self.apply(result);
            }
        }
    }

    /// Wait up to `timeout` for filesystem events, apply them and settle
    /// the follow-up fetches. Returns the number of events applied.
    pub fn process_changes(&mut self, timeout: Duration) -> usize {
        let Some(watcher) = &self.watcher else {
            return 0;
        };
        let events = watcher.wait_events(timeout);
        let count = events.len();
        for event in events {
            self.project.on_monitor_event(event);
        }
        self.run_until_idle(timeout);
        count
    }
}
