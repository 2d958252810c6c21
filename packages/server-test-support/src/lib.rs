//! Shared helpers for hokm-server test binaries.

pub mod logging;
