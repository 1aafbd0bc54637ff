//! Resolution models
//!
//! This module contains the core data types for resolution:
//! - `types` - Source identifiers and well-known domain keys
//! - `descriptor` - What is being resolved (RequestDescriptor, TimeRange)
//! - `record` - Provider payloads and the provenance-tagged ResolvedRecord

mod descriptor;
mod record;
mod types;

pub use descriptor::{RequestDescriptor, TimeRange};
pub use record::{identity_of, Payload, ProviderResult, ResolvedField, ResolvedItem, ResolvedRecord};
pub use types::{domains, sources, SourceId};
