//! Core types for caravan.
//!
//! This crate provides the fundamental data structures shared by the
//! file-operation engine: location references, entry metadata, the error
//! taxonomy and engine configuration.

mod config;
mod error;
mod location;
mod metadata;

pub use config::{ConfigError, ConflictPolicy, EngineConfig, EngineConfigBuilder};
pub use error::{ErrorKind, FsError, PlanError, RedoError, UndoError};
pub use location::{FileRef, LOCAL_SCHEME, TRASH_SCHEME};
pub use metadata::{DIRECTORY_WEIGHT, EntryKind, Metadata};
