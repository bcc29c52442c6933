//! Local collaborators
//!
//! The project itself never touches the filesystem. These adapters answer its
//! requests for `file://` URIs: [`LocalFetcher`] reads metadata and listings
//! on a worker pool, [`FsWatcher`] turns `notify` events into
//! [`MonitorEvent`](crate::project::MonitorEvent)s, and [`ProjectDriver`]
//! moves requests and results between them and the project.

mod driver;
mod local;
mod watch;

pub use driver::ProjectDriver;
pub use local::{fetch_info, fetch_listing, IoResult, LocalFetcher};
pub use watch::{convert_event, FsWatcher};
