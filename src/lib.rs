//! Snapshot and metrics formatting shared by the CLI and tests

pub mod format;
