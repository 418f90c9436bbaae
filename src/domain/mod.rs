//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the signal hypothesis key (`LimitPoint`)
//! - quantile and method enums (`Quantile`, `Method`)
//! - limit outputs (`LimitRecord`, `StoredRecord`)
//! - run configuration (`LimitConfig`, `ToolConfig`)

pub mod types;

pub use types::*;
