//! `hep-limits` library crate.
//!
//! The binary (`compute-limit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning the binary
//! - the escalation policy can be driven by other front-ends (batch dispatchers)

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod escalation;
pub mod extract;
pub mod io;
pub mod method;
pub mod report;
pub mod worker;
