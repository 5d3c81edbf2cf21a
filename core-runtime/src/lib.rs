//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the export worker:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other workspace crate builds on these utilities. They establish the
//! logging conventions and event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, ExportEvent, WorkerEvent};
