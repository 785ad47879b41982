//! Provenance verification for npm packages.
//!
//! `tbv` checks that a published package version can be reproduced from the
//! source repository and commit it declares. It is used by the `tbv` CLI
//! binary and can be driven programmatically with custom executors, HTTP
//! clients, and observers.
//!
//! # Modules
//!
//! - [`archive`] - Archive digests, decompression, and content manifests
//! - [`builder`] - Packing a checkout with an install-and-retry fallback
//! - [`checkout`] - Shallow checkouts into temporary directories
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Settings from TOML files and the environment
//! - [`deadline`] - Run-wide deadline and cancellation
//! - [`engine`] - Step tracker, observers, and run reports
//! - [`error`] - Semantic error types
//! - [`exec`] - External command execution
//! - [`git`] - The git operations the pipelines need
//! - [`local_test`] - Local working tree versus remote commit
//! - [`logging`] - Stderr subscriber setup for the binary
//! - [`output`] - Human and JSON rendering of reports
//! - [`package_spec`] - `name[@version]` arguments
//! - [`progress`] - Step statuses and the progress table
//! - [`registry`] - Registry metadata and version resolution
//! - [`verify`] - Registry package versus declared source

pub mod archive;
pub mod builder;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod exec;
pub mod git;
pub mod logging;
pub mod output;
pub mod package_spec;
pub mod progress;
pub mod registry;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
