//! Mapping raw API statuses onto wait labels

use serde_json::Value as JsonValue;

use crate::resources::PhaseProfile;

/// Label of a probe whose status request failed with a retryable error
pub const RETRY_LABEL: &str = "retry";

/// Label of a probe that found no resource
pub const ABSENT_LABEL: &str = "deleted";

/// Classify a raw status for `phase`
///
/// Statuses the phase lists are kept as they are. Anything else becomes the
/// phase's fallback label, or stays raw (and unclassified) without one.
pub fn classify(phase: &PhaseProfile, raw: &str) -> String {
    if phase.pending.contains(&raw) || phase.target.contains(&raw) {
        return raw.to_string();
    }
    match phase.fallback {
        Some(fallback) => fallback.to_string(),
        None => raw.to_string(),
    }
}

/// Extract the raw status of a resource body
pub fn raw_status<'a>(phase: &PhaseProfile, body: &'a JsonValue) -> Option<&'a str> {
    body.pointer(phase.status_field).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Phase, profile};
    use serde_json::json;

    #[test]
    fn listed_statuses_are_kept() {
        let vpc = profile("is_vpc").unwrap().phase(Phase::Create).unwrap();
        assert_eq!(classify(vpc, "pending"), "pending");
        assert_eq!(classify(vpc, "failed"), "failed");
    }

    #[test]
    fn unlisted_status_without_fallback_stays_raw() {
        let vpc = profile("is_vpc").unwrap().phase(Phase::Create).unwrap();
        assert_eq!(classify(vpc, "suspended"), "suspended");
    }

    #[test]
    fn unlisted_status_uses_fallback() {
        let cluster = profile("container_cluster")
            .unwrap()
            .phase(Phase::Create)
            .unwrap();
        assert_eq!(classify(cluster, "deploying"), "provisioning");
        assert_eq!(classify(cluster, "pending"), "provisioning");
        assert_eq!(classify(cluster, "normal"), "normal");
    }

    #[test]
    fn nested_status_field() {
        let vpc_cluster = profile("container_vpc_cluster")
            .unwrap()
            .phase(Phase::Create)
            .unwrap();
        let body = json!({"id": "c-1", "lifecycle": {"master_status": "Ready"}});
        assert_eq!(raw_status(vpc_cluster, &body), Some("Ready"));
        assert_eq!(raw_status(vpc_cluster, &json!({"id": "c-1"})), None);
    }
}
