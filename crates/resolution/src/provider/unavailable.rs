//! Always-failing stand-in for a capability missing at runtime.
//!
//! Registering the stub instead of omitting the provider keeps the chain's
//! shape (and its diagnostics) identical whether or not the capability exists.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::ProviderError;
use crate::models::RequestDescriptor;

use super::{ProviderOutcome, SourceProvider};

pub struct UnavailableProvider {
    id: &'static str,
    priority: i32,
}

impl UnavailableProvider {
    pub fn new(id: &'static str, priority: i32) -> Self {
        Self { id, priority }
    }
}

#[async_trait]
impl SourceProvider for UnavailableProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn attempt(&self, _descriptor: &RequestDescriptor, _deadline: Instant) -> ProviderOutcome {
        ProviderOutcome::Failure(ProviderError::Unavailable {
            provider: self.id.to_string(),
        })
    }
}
