//! Status probe for one remote resource

use std::sync::Arc;

use converge_core::poll::{Observation, Probe, ProbeResult};
use converge_core::provider::BoxFuture;
use serde_json::Value as JsonValue;

use crate::client::CloudClient;
use crate::resources::PhaseProfile;
use crate::status::{self, ABSENT_LABEL, RETRY_LABEL};

/// Fetches one resource and labels it according to a phase profile
pub struct ResourceProbe<C> {
    client: Arc<C>,
    collection: &'static str,
    identifier: String,
    phase: PhaseProfile,
}

impl<C: CloudClient> ResourceProbe<C> {
    pub fn new(
        client: Arc<C>,
        collection: &'static str,
        identifier: impl Into<String>,
        phase: PhaseProfile,
    ) -> Self {
        Self {
            client,
            collection,
            identifier: identifier.into(),
            phase,
        }
    }

    async fn observe(&self) -> ProbeResult<JsonValue> {
        match self.client.get(self.collection, &self.identifier).await {
            Ok(Some(body)) => {
                let raw = status::raw_status(&self.phase, &body).ok_or_else(|| {
                    format!(
                        "{}/{} has no status at '{}'",
                        self.collection, self.identifier, self.phase.status_field
                    )
                })?;
                let label = status::classify(&self.phase, raw);
                Ok(Observation::present(label, body))
            }
            Ok(None) => Ok(Observation::absent(ABSENT_LABEL)),
            Err(e) if e.is_not_found() => Ok(Observation::absent(ABSENT_LABEL)),
            Err(e) if e.is_retryable() && self.phase.retries() => {
                log::debug!(
                    "retrying status of {}/{}: {}",
                    self.collection,
                    self.identifier,
                    e
                );
                Ok(Observation::absent(RETRY_LABEL).with_detail(e.to_string()))
            }
            Err(e) => Err(Box::new(e)),
        }
    }
}

impl<C: CloudClient> Probe for ResourceProbe<C> {
    type Value = JsonValue;

    fn probe(&mut self) -> BoxFuture<'_, ProbeResult<JsonValue>> {
        Box::pin(self.observe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::fake::{FakeClient, body};
    use crate::resources::{Phase, profile};

    fn phase(resource_type: &str, phase: Phase) -> PhaseProfile {
        profile(resource_type)
            .unwrap()
            .phase(phase)
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn present_resource_is_labelled_by_status() {
        let client = Arc::new(FakeClient::new());
        client.script("vpc-1", vec![Ok(Some(body("vpc-1", "pending")))]);
        let mut probe =
            ResourceProbe::new(client, "/v1/vpcs", "vpc-1", phase("is_vpc", Phase::Create));

        let observation = probe.probe().await.unwrap();
        assert_eq!(observation.label, "pending");
        assert_eq!(observation.value.unwrap()["id"], "vpc-1");
    }

    #[tokio::test]
    async fn missing_resource_is_absent() {
        let client = Arc::new(FakeClient::new());
        client.script(
            "subnet-1",
            vec![Err(ClientError::api(404, "not_found", "Subnet not found"))],
        );
        let mut probe = ResourceProbe::new(
            client,
            "/v1/subnets",
            "subnet-1",
            phase("is_subnet", Phase::Delete),
        );

        let observation = probe.probe().await.unwrap();
        assert!(observation.is_absent());
        assert_eq!(observation.label, ABSENT_LABEL);
    }

    #[tokio::test]
    async fn retryable_error_becomes_retry_label() {
        let client = Arc::new(FakeClient::new());
        client.script(
            "subnet-1",
            vec![Err(ClientError::api(503, "unavailable", "try again"))],
        );
        let mut probe = ResourceProbe::new(
            client,
            "/v1/subnets",
            "subnet-1",
            phase("is_subnet", Phase::Create),
        );

        let observation = probe.probe().await.unwrap();
        assert!(observation.is_absent());
        assert_eq!(observation.label, RETRY_LABEL);
        assert_eq!(
            observation.detail.as_deref(),
            Some("API error 503 (unavailable): try again")
        );
    }

    #[tokio::test]
    async fn retryable_error_propagates_without_retry_label() {
        let client = Arc::new(FakeClient::new());
        client.script("vpc-1", vec![Err(ClientError::transport("connection reset"))]);
        let mut probe =
            ResourceProbe::new(client, "/v1/vpcs", "vpc-1", phase("is_vpc", Phase::Create));

        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "Transport error: connection reset");
    }

    #[tokio::test]
    async fn body_without_status_is_an_error() {
        let client = Arc::new(FakeClient::new());
        client.script("vpc-1", vec![Ok(Some(serde_json::json!({"id": "vpc-1"})))]);
        let mut probe =
            ResourceProbe::new(client, "/v1/vpcs", "vpc-1", phase("is_vpc", Phase::Create));

        let err = probe.probe().await.unwrap_err();
        assert!(err.to_string().contains("no status at '/status'"));
    }
}
