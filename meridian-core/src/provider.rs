//! Provider - Traits abstracting the cloud side of provisioning
//!
//! A [`ZoneSource`] answers which availability zones may be used, and a
//! [`Provider`] turns declared resources into real ones. Both are async and
//! involve side effects; the planner never calls them itself.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of the zones a plan may spread across
pub trait ZoneSource: Send + Sync {
    /// Names of the zones currently available, in the order they should be used
    fn available_zones(&self) -> BoxFuture<'_, ProviderResult<Vec<String>>>;
}

/// Fixed zone list, for callers that already know their zones
#[derive(Debug, Clone, Default)]
pub struct StaticZones(pub Vec<String>);

impl ZoneSource for StaticZones {
    fn available_zones(&self) -> BoxFuture<'_, ProviderResult<Vec<String>>> {
        let zones = self.0.clone();
        Box::pin(async move { Ok(zones) })
    }
}

/// Main Provider trait
///
/// Each cloud provider implements this trait.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    /// Create a resource whose references have already been resolved
    ///
    /// Returns State with identifier set to the cloud ID (e.g., vpc-xxx)
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }
}
