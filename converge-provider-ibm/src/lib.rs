//! Converge IBM Cloud Provider
//!
//! Resource adapters for IBM Cloud that wait for every mutation to settle.
//!
//! ## Module Structure
//!
//! - `client` - Abstract cloud API client and its errors
//! - `resources` - Per-resource-type wait profiles
//! - `status` - Mapping raw statuses onto wait labels
//! - `probe` - Status probe built on the client
//! - `config` - Provider-level wait settings
//! - `provider` - IbmProvider implementation

pub mod client;
pub mod config;
pub mod probe;
pub mod provider;
pub mod resources;
pub mod status;

#[cfg(test)]
mod fake;

// Re-export main types
pub use client::{ClientError, ClientResult, CloudClient};
pub use config::{ConfigError, WaitSettings};
pub use probe::ResourceProbe;
pub use provider::IbmProvider;
pub use resources::{Phase, PhaseProfile, WaitProfile};

use converge_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use converge_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl<C: CloudClient + 'static> Provider for IbmProvider<C> {
    fn name(&self) -> &'static str {
        "ibm"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(id, &identifier, &from, to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
