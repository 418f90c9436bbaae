//! Input/output helpers.
//!
//! - tool result tables and their file naming (`artifact`)
//! - the appendable per-model result store (`store`)
//! - cross-section tables (`xsec`)
//! - read-only datacard scans (`datacard`)
//! - the per-point invocation log (`runlog`)
//! - JSON export of summaries (`export`)

pub mod artifact;
pub mod datacard;
pub mod export;
pub mod runlog;
pub mod store;
pub mod xsec;

pub use artifact::*;
pub use datacard::*;
pub use export::*;
pub use runlog::*;
pub use store::*;
pub use xsec::*;
