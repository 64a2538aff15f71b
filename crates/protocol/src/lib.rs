//! Data types exchanged between the session core and its host.
//!
//! These types describe what the host hands to the session core when it
//! materializes a debug session, and what the core hands back when it asks the
//! host to start one.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization and small accessors
//! - **Host-shaped**: Field names follow the host's launch configuration schema
//! - **Stable**: Changes only when the host contract changes

pub mod session;
pub mod types;

pub use session::*;
pub use types::*;
