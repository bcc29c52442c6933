//! URI helpers
//!
//! All URIs stored by the project are canonical `url::Url` serializations
//! without a trailing slash (except for a bare root such as `file:///`).
//! Path segments are percent-encoded by `url`; names inside the tree are kept
//! decoded.

use crate::error::ProjectError;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use url::Url;

fn parse(uri: &str) -> Result<Url, ProjectError> {
    let url = Url::parse(uri).map_err(|e| ProjectError::invalid_uri(uri, e))?;
    if url.cannot_be_a_base() {
        return Err(ProjectError::invalid_uri(uri, "URI has no hierarchical path"));
    }
    Ok(url)
}

/// Parse and normalize a URI into the form used as a table key.
pub fn canonicalize(uri: &str) -> Result<String, ProjectError> {
    let mut url = parse(uri)?;
    if url.path() != "/" {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
        }
    }
    Ok(url.into())
}

/// URI of the child called `name` inside `parent`.
pub fn join(parent: &str, name: &str) -> Result<String, ProjectError> {
    let mut url = parse(parent)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ProjectError::invalid_uri(parent, "URI has no hierarchical path"))?;
        segments.pop_if_empty().push(name);
    }
    Ok(url.into())
}

/// URI of the directory containing `uri`, or `None` for a root URI.
pub fn parent(uri: &str) -> Option<String> {
    let mut url = parse(uri).ok()?;
    if url.path() == "/" || url.path().is_empty() {
        return None;
    }
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty().pop();
    }
    Some(url.into())
}

/// Decoded last path segment of `uri`.
pub fn basename(uri: &str) -> Option<String> {
    let url = parse(uri).ok()?;
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode_str(last).decode_utf8_lossy().into_owned())
}

/// Whether `uri` lies strictly below `ancestor`.
pub fn is_descendant(uri: &str, ancestor: &str) -> bool {
    match uri.strip_prefix(ancestor) {
        Some(rest) => {
            if ancestor.ends_with('/') {
                !rest.is_empty()
            } else {
                rest.starts_with('/') && rest.len() > 1
            }
        }
        None => false,
    }
}

/// Rebase `uri` from under `from` to under `to`.
pub fn rebase(uri: &str, from: &str, to: &str) -> Option<String> {
    if uri == from {
        return Some(to.to_string());
    }
    if !is_descendant(uri, from) {
        return None;
    }
    let rest = uri[from.len()..].trim_start_matches('/');
    Some(format!("{}/{}", to.trim_end_matches('/'), rest))
}

/// Local path of a `file://` URI.
pub fn to_file_path(uri: &str) -> Result<PathBuf, ProjectError> {
    let url = parse(uri)?;
    if url.scheme() != "file" {
        return Err(ProjectError::invalid_uri(uri, "not a local file URI"));
    }
    url.to_file_path()
        .map_err(|_| ProjectError::invalid_uri(uri, "cannot convert to a local path"))
}

/// Canonical `file://` URI for a local absolute path.
pub fn from_file_path(path: &Path) -> Result<String, ProjectError> {
    let url = Url::from_file_path(path).map_err(|_| {
        ProjectError::invalid_uri(&path.display().to_string(), "path must be absolute")
    })?;
    canonicalize(url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_trailing_slash() {
        assert_eq!(canonicalize("file:///tmp/").unwrap(), "file:///tmp");
        assert_eq!(canonicalize("file:///").unwrap(), "file:///");
        assert_eq!(canonicalize("file:///tmp/a b").unwrap(), "file:///tmp/a%20b");
        assert!(canonicalize("NewFolder").is_err());
    }

    #[test]
    fn test_join_escapes_names() {
        assert_eq!(join("file:///tmp", "x.txt").unwrap(), "file:///tmp/x.txt");
        assert_eq!(join("file:///", "tmp").unwrap(), "file:///tmp");
        assert_eq!(join("file:///tmp", "a b").unwrap(), "file:///tmp/a%20b");
        assert_eq!(join("file:///tmp", "a/b").unwrap(), "file:///tmp/a%2Fb");
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent("file:///tmp/x.txt").as_deref(), Some("file:///tmp"));
        assert_eq!(parent("file:///tmp").as_deref(), Some("file:///"));
        assert_eq!(parent("file:///"), None);
        assert_eq!(basename("file:///tmp/a%20b").as_deref(), Some("a b"));
        assert_eq!(basename("file:///"), None);
    }

    #[test]
    fn test_join_parent_roundtrip() {
        let child = join("file:///srv/music", "track 01.flac").unwrap();
        assert_eq!(parent(&child).as_deref(), Some("file:///srv/music"));
        assert_eq!(basename(&child).as_deref(), Some("track 01.flac"));
    }

    #[test]
    fn test_is_descendant_and_rebase() {
        assert!(is_descendant("file:///tmp/a/b", "file:///tmp"));
        assert!(is_descendant("file:///tmp", "file:///"));
        assert!(!is_descendant("file:///tmpx", "file:///tmp"));
        assert!(!is_descendant("file:///tmp", "file:///tmp"));
        assert_eq!(
            rebase("file:///tmp/a/b", "file:///tmp/a", "file:///srv/c").as_deref(),
            Some("file:///srv/c/b")
        );
        assert_eq!(rebase("file:///other", "file:///tmp", "file:///srv"), None);
    }
}
