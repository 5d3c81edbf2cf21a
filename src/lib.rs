//! Playlist export worker.
//!
//! Re-exports the crates a host needs to embed the export service instead
//! of running the `export-worker` binary.

pub use core_export as export;
pub use core_runtime as runtime;
pub use core_service::{ExportService, Result, ServiceError};
