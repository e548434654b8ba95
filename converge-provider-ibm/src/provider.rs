//! IBM Cloud Provider implementation
//!
//! Every mutating call is followed by a wait: the provider builds a
//! [`ResourceProbe`] and a fresh poll configuration from the resource type's
//! wait profile and polls until the resource settles.

use std::collections::HashMap;
use std::sync::Arc;

use converge_core::poll::{PollSpec, Poller};
use converge_core::provider::{ProviderError, ProviderResult};
use converge_core::resource::{Resource, ResourceId, State, Value};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::client::CloudClient;
use crate::config::{ConfigError, WAIT_TIME_ATTRIBUTE, WaitSettings, wait_time_from_attributes};
use crate::probe::ResourceProbe;
use crate::resources::{self, Phase, PhaseProfile, WaitProfile};

/// IBM Cloud Provider
pub struct IbmProvider<C> {
    client: Arc<C>,
    settings: WaitSettings,
    cancel: Option<CancellationToken>,
}

impl<C: CloudClient + 'static> IbmProvider<C> {
    pub fn new(client: C) -> Self {
        Self::with_client(Arc::new(client))
    }

    pub fn with_client(client: Arc<C>) -> Self {
        Self {
            client,
            settings: WaitSettings::default(),
            cancel: None,
        }
    }

    pub fn with_settings(mut self, settings: WaitSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Abort in-flight waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn profile(&self, id: &ResourceId) -> ProviderResult<&'static WaitProfile> {
        resources::profile(&id.resource_type).ok_or_else(|| {
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    /// Poll configuration for one phase, after settings and attribute overrides
    pub fn wait_spec(
        &self,
        phase: &PhaseProfile,
        attributes: Option<&HashMap<String, Value>>,
    ) -> Result<PollSpec, ConfigError> {
        let mut spec = self.settings.apply(phase.poll_spec());
        if let Some(attributes) = attributes
            && let Some(timeout) = wait_time_from_attributes(attributes)?
        {
            spec = spec.with_timeout(timeout);
        }
        Ok(spec)
    }

    /// Wait for `identifier` to settle after a `phase` call
    ///
    /// Returns the last body seen, or `None` when the phase has no wait or the
    /// resource ended up absent.
    async fn wait_for(
        &self,
        id: &ResourceId,
        profile: &'static WaitProfile,
        phase: Phase,
        identifier: &str,
        attributes: Option<&HashMap<String, Value>>,
    ) -> ProviderResult<Option<JsonValue>> {
        let Some(phase_profile) = profile.phase(phase) else {
            return Ok(None);
        };

        let spec = self.wait_spec(phase_profile, attributes).map_err(|e| {
            ProviderError::new(e.to_string())
                .for_resource(id.clone())
                .with_cause(e)
        })?;
        let probe = ResourceProbe::new(
            self.client.clone(),
            profile.collection,
            identifier,
            phase_profile.clone(),
        );

        let mut poller = Poller::new(spec);
        if let Some(token) = &self.cancel {
            poller = poller.with_cancellation(token.clone());
        }

        log::debug!("waiting for {} ({}) after {}", id, identifier, phase);
        let converged = poller.poll(probe).await.map_err(|e| {
            ProviderError::new(format!(
                "Error waiting for {} ({}) to {}: {}",
                id.resource_type, identifier, phase, e
            ))
            .for_resource(id.clone())
            .with_cause(e)
        })?;

        if phase_profile.is_failed(&converged.label) {
            return Err(ProviderError::new(format!(
                "{} ({}) {} failed with state '{}'",
                id.resource_type, identifier, phase, converged.label
            ))
            .for_resource(id.clone()));
        }

        log::debug!(
            "{} ({}) reached '{}' after {} attempts",
            id,
            identifier,
            converged.label,
            converged.attempts
        );
        Ok(converged.value)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let profile = self.profile(id)?;

        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match self.client.get(profile.collection, identifier).await {
            Ok(Some(body)) => Ok(state_from_body(id.clone(), identifier, &body)),
            Ok(None) => Ok(State::not_found(id.clone())),
            Err(e) if e.is_not_found() => Ok(State::not_found(id.clone())),
            Err(e) => Err(ProviderError::new(format!("Failed to get resource: {}", e))
                .for_resource(id.clone())
                .with_cause(e)),
        }
    }

    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let profile = self.profile(&resource.id)?;

        let response = self
            .client
            .create(profile.collection, desired_body(&resource.attributes))
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create resource: {}", e))
                    .for_resource(resource.id.clone())
                    .with_cause(e)
            })?;

        let identifier = response
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new("No identifier returned").for_resource(resource.id.clone())
            })?;

        let settled = self
            .wait_for(
                &resource.id,
                profile,
                Phase::Create,
                &identifier,
                Some(&resource.attributes),
            )
            .await?;

        match settled {
            Some(body) => Ok(state_from_body(resource.id, &identifier, &body)),
            None => self.read_resource(&resource.id, Some(&identifier)).await,
        }
    }

    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let profile = self.profile(&id)?;

        let patch = patch_body(&from.attributes, &to.attributes);
        if patch.as_object().is_some_and(|p| p.is_empty()) {
            return self.read_resource(&id, Some(identifier)).await;
        }

        self.client
            .update(profile.collection, identifier, patch)
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to update resource: {}", e))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        let settled = self
            .wait_for(&id, profile, Phase::Update, identifier, Some(&to.attributes))
            .await?;

        match settled {
            Some(body) => Ok(state_from_body(id, identifier, &body)),
            None => self.read_resource(&id, Some(identifier)).await,
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let profile = self.profile(id)?;

        match self.client.delete(profile.collection, identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                log::debug!("{} ({}) is already gone", id, identifier);
                return Ok(());
            }
            Err(e) => {
                return Err(
                    ProviderError::new(format!("Failed to delete resource: {}", e))
                        .for_resource(id.clone())
                        .with_cause(e),
                );
            }
        }

        self.wait_for(id, profile, Phase::Delete, identifier, None)
            .await
            .map(|_| ())
    }
}

/// Request body for a create call; the wait timeout is not sent to the API
fn desired_body(attributes: &HashMap<String, Value>) -> JsonValue {
    let body: serde_json::Map<String, JsonValue> = attributes
        .iter()
        .filter(|(name, _)| name.as_str() != WAIT_TIME_ATTRIBUTE)
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();
    JsonValue::Object(body)
}

/// Merge patch containing the attributes that changed
fn patch_body(from: &HashMap<String, Value>, to: &HashMap<String, Value>) -> JsonValue {
    let patch: serde_json::Map<String, JsonValue> = to
        .iter()
        .filter(|(name, _)| name.as_str() != WAIT_TIME_ATTRIBUTE)
        .filter(|(name, value)| from.get(name.as_str()) != Some(*value))
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();
    JsonValue::Object(patch)
}

fn state_from_body(id: ResourceId, identifier: &str, body: &JsonValue) -> State {
    let attributes = body
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(name, _)| name.as_str() != "id")
                .filter_map(|(name, value)| json_to_value(value).map(|v| (name.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    State::existing(id, attributes).with_identifier(identifier)
}

fn json_to_value(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        // Value has no float; keep non-integers exactly as the API wrote them
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::String(n.to_string()),
        }),
        JsonValue::Array(items) => Some(Value::List(
            items.iter().filter_map(json_to_value).collect(),
        )),
        JsonValue::Object(object) => Some(Value::Map(
            object
                .iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        JsonValue::Null => None,
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::String(s) => JsonValue::from(s.as_str()),
        Value::Int(i) => JsonValue::from(*i),
        Value::Bool(b) => JsonValue::from(*b),
        Value::List(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}
