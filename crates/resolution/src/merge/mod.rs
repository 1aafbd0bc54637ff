//! Pluggable per-domain merge and completeness rules.
//!
//! The engine walks providers; these rules decide what each provider's data
//! adds to the record and when the walk can stop. New domains supply their own
//! implementations without touching the chain-walking logic.

mod completeness;
mod strategy;

pub use completeness::{Completeness, NonEmptyItems, RequiredFields, WalkAll};
pub use strategy::{DedupByIdentity, FillMissing, MergeStrategy};
