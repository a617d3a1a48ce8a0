//! Shared building blocks for stowage.
//!
//! This crate provides:
//! - Column and table metadata with validation (`meta`)
//! - Type mapping lookup keyed by a stable type identifier (`type_mapping`)
//! - Schedulers that move blocking store calls off async tasks (`scheduler`)
//! - Logging initialization (`logging`)
//!
//! Nothing here talks to a database. Store backends such as
//! `stowage-sqlite` build on these pieces.

mod error;
pub mod logging;
pub mod meta;
pub mod scheduler;
pub mod type_mapping;

pub use error::{SchedulerError, ValidationError, ValidationResult};
pub use logging::{init_logging, init_with_config, level_name, parse_level, LogConfig};
pub use meta::{ColumnMeta, ColumnType, StorageClass, TableMeta};
pub use scheduler::Scheduler;
pub use type_mapping::{ErasedMapping, MappingAdapter, TypeKey, TypeMappingFinder};
