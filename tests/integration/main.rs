//! Integration tests for discgraft

mod export_import;
mod local_io;
mod project_invariants;
mod scenarios;
mod support;
