//! Source provider abstractions and implementations.
//!
//! This module contains:
//! - The `SourceProvider` trait that every data origin implements
//! - `ProviderOutcome`, the never-failing result of one attempt
//! - Concrete providers: plugin bridge, aggregation API, wiki, mock fallback
//!   and an always-failing stub for capabilities missing at runtime
//!
//! # Priorities
//!
//! Lower values are tried first. The bundled providers default to
//! plugin (0) < aggregation (10) < wiki (20) < fallback (100).

mod http;
mod traits;

pub mod aggregation;
pub mod fallback;
pub mod plugin;
pub mod unavailable;
pub mod wiki;

pub use traits::{ProviderOutcome, SourceProvider};

/// User agent sent by the REST providers unless one is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("groupscape-resolution/", env!("CARGO_PKG_VERSION"));
