//! Wait profiles for IBM Cloud resource types
//!
//! Each resource type has an optional profile per mutating phase: which
//! status field to read, which labels mean "still working" and which mean
//! "settled", and how long to wait. Labels are the raw statuses reported by
//! the API plus two synthetic ones produced by the probe:
//!
//! - [`RETRY_LABEL`]: the status request failed with a retryable error
//! - [`ABSENT_LABEL`]: the resource no longer exists

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use converge_core::poll::{
    DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_NOT_FOUND_CHECKS, PollSpec,
};
use converge_core::provider::ResourceType;

pub use crate::status::{ABSENT_LABEL, RETRY_LABEL};

/// Mutating operation a profile applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Update,
    Delete,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Create, Phase::Update, Phase::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Update => "update",
            Phase::Delete => "delete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Phase::Create),
            "update" => Ok(Phase::Update),
            "delete" => Ok(Phase::Delete),
            other => Err(format!(
                "Unknown phase '{}', expected create, update or delete",
                other
            )),
        }
    }
}

/// How to wait for one phase of one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseProfile {
    /// JSON pointer to the status inside the API representation
    pub status_field: &'static str,
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
    /// Target labels that mean the operation failed remotely
    pub failed: &'static [&'static str],
    /// Label used for raw statuses listed in neither `pending` nor `target`
    pub fallback: Option<&'static str>,
    pub delay: Duration,
    pub min_interval: Duration,
    /// Fixed interval between probes; `None` backs off exponentially
    pub poll_interval: Option<Duration>,
    /// Default timeout, overridden by `wait_time_minutes`
    pub timeout: Duration,
    pub continuous_target_occurrence: u32,
    pub not_found_checks: u32,
}

const fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

const PHASE: PhaseProfile = PhaseProfile {
    status_field: "/status",
    pending: &[],
    target: &[],
    failed: &[],
    fallback: None,
    delay: Duration::from_secs(10),
    min_interval: Duration::from_secs(10),
    poll_interval: None,
    timeout: minutes(10),
    continuous_target_occurrence: 1,
    not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
};

impl PhaseProfile {
    /// Build a fresh poll configuration from this profile
    pub fn poll_spec(&self) -> PollSpec {
        let spec = PollSpec::new(
            self.pending.iter().copied(),
            self.target.iter().copied(),
            self.timeout,
        )
        .with_delay(self.delay)
        .with_min_poll_interval(self.min_interval)
        .with_continuous_target_occurrence(self.continuous_target_occurrence)
        .with_not_found_checks(self.not_found_checks);

        match self.poll_interval {
            Some(interval) => spec.with_poll_interval(interval),
            None => spec.with_backoff(DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX),
        }
    }

    pub fn is_failed(&self, label: &str) -> bool {
        self.failed.contains(&label)
    }

    /// Whether transient client errors are folded into the `retry` label
    pub fn retries(&self) -> bool {
        self.pending.contains(&RETRY_LABEL)
    }
}

/// Wait profiles for one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct WaitProfile {
    pub resource_type: &'static str,
    /// Collection path handed to the cloud client
    pub collection: &'static str,
    pub create: Option<PhaseProfile>,
    pub update: Option<PhaseProfile>,
    pub delete: Option<PhaseProfile>,
}

impl WaitProfile {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseProfile> {
        match phase {
            Phase::Create => self.create.as_ref(),
            Phase::Update => self.update.as_ref(),
            Phase::Delete => self.delete.as_ref(),
        }
    }
}

impl ResourceType for &'static WaitProfile {
    fn name(&self) -> &'static str {
        self.resource_type
    }
}

// =============================================================================
// VPC Infrastructure
// =============================================================================

const VPC_DELETE: PhaseProfile = PhaseProfile {
    pending: &[RETRY_LABEL, "deleting"],
    target: &[ABSENT_LABEL],
    ..PHASE
};

static PROFILES: &[WaitProfile] = &[
    WaitProfile {
        resource_type: "is_vpc",
        collection: "/v1/vpcs",
        create: Some(PhaseProfile {
            pending: &["pending"],
            target: &["available", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        update: None,
        delete: Some(PhaseProfile {
            target: &[ABSENT_LABEL, "failed"],
            failed: &["failed"],
            ..VPC_DELETE
        }),
    },
    WaitProfile {
        resource_type: "is_subnet",
        collection: "/v1/subnets",
        create: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending"],
            target: &["available", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        update: None,
        delete: Some(VPC_DELETE),
    },
    WaitProfile {
        resource_type: "is_volume",
        collection: "/v1/volumes",
        create: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending"],
            target: &["available", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        update: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending", "updating"],
            target: &["available", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        delete: Some(VPC_DELETE),
    },
    WaitProfile {
        resource_type: "is_public_gateway",
        collection: "/v1/public_gateways",
        create: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending"],
            target: &["available", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        update: None,
        delete: Some(VPC_DELETE),
    },
    WaitProfile {
        resource_type: "is_vpn_gateway",
        collection: "/v1/vpn_gateways",
        create: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending"],
            target: &["available", "running", "failed"],
            failed: &["failed"],
            ..PHASE
        }),
        update: None,
        delete: Some(VPC_DELETE),
    },
    WaitProfile {
        resource_type: "is_floating_ip",
        collection: "/v1/floating_ips",
        create: Some(PhaseProfile {
            pending: &["pending"],
            target: &["available"],
            ..PHASE
        }),
        update: None,
        delete: Some(PhaseProfile {
            pending: &["pending", "deleting"],
            target: &[ABSENT_LABEL],
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "is_lb",
        collection: "/v1/load_balancers",
        create: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[
                RETRY_LABEL,
                "create_pending",
                "update_pending",
                "maintenance_pending",
            ],
            target: &["active", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[RETRY_LABEL, "update_pending", "maintenance_pending"],
            target: &["active", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        // An empty target: the wait ends as soon as the load balancer is gone
        delete: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[RETRY_LABEL, "delete_pending"],
            target: &[],
            timeout: minutes(30),
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "is_lb_listener",
        collection: "/v1/load_balancer_listeners",
        create: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[
                RETRY_LABEL,
                "provisioning",
                "create_pending",
                "update_pending",
                "maintenance_pending",
            ],
            target: &["active"],
            ..PHASE
        }),
        update: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[RETRY_LABEL, "update_pending", "maintenance_pending"],
            target: &["active"],
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            status_field: "/provisioning_status",
            pending: &[RETRY_LABEL, "deleting", "delete_pending"],
            target: &[ABSENT_LABEL],
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "is_instance",
        collection: "/v1/instances",
        create: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending", "starting"],
            target: &["running", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "pending", "starting", "stopping", "restarting"],
            target: &["running", "stopped", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "deleting", "stopping"],
            target: &[ABSENT_LABEL],
            timeout: minutes(30),
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "is_bare_metal_server",
        collection: "/v1/bare_metal_servers",
        create: Some(PhaseProfile {
            pending: &["pending", "starting"],
            target: &["running", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        // Power-state changes
        update: Some(PhaseProfile {
            pending: &["pending", "starting", "stopping", "restarting"],
            target: &["running", "stopped", "failed"],
            failed: &["failed"],
            timeout: minutes(30),
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            timeout: minutes(30),
            ..VPC_DELETE
        }),
    },
    // =========================================================================
    // Kubernetes Service
    // =========================================================================
    WaitProfile {
        resource_type: "container_cluster",
        collection: "/v1/clusters",
        create: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "provisioning"],
            target: &["normal"],
            fallback: Some("provisioning"),
            timeout: minutes(90),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "updating"],
            target: &["normal"],
            fallback: Some("updating"),
            timeout: minutes(90),
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            status_field: "/state",
            pending: &["deleting"],
            target: &[ABSENT_LABEL],
            fallback: Some("deleting"),
            delay: Duration::from_secs(60),
            poll_interval: Some(Duration::from_secs(60)),
            timeout: minutes(90),
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "container_worker",
        collection: "/v1/workers",
        create: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "provisioning"],
            target: &["normal"],
            fallback: Some("provisioning"),
            timeout: minutes(90),
            ..PHASE
        }),
        update: None,
        delete: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "deleting"],
            target: &[ABSENT_LABEL],
            fallback: Some("deleting"),
            timeout: minutes(90),
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "container_vpc_cluster",
        collection: "/v2/vpc/clusters",
        // The master flaps between states while it settles
        create: Some(PhaseProfile {
            status_field: "/lifecycle/master_status",
            pending: &[RETRY_LABEL, "Deploy requested", "Deploy in progress"],
            target: &["Ready"],
            min_interval: Duration::from_secs(5),
            continuous_target_occurrence: 5,
            timeout: minutes(90),
            ..PHASE
        }),
        update: None,
        delete: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "deleting"],
            target: &[ABSENT_LABEL],
            fallback: Some("deleting"),
            min_interval: Duration::from_secs(5),
            poll_interval: Some(Duration::from_secs(5)),
            timeout: minutes(90),
            ..PHASE
        }),
    },
    // =========================================================================
    // Power Systems
    // =========================================================================
    WaitProfile {
        resource_type: "pi_instance",
        collection: "/pcloud/v1/pvm-instances",
        create: Some(PhaseProfile {
            pending: &["PENDING", "BUILD", "WARNING"],
            target: &["ACTIVE", "OK", "ERROR"],
            failed: &["ERROR"],
            delay: Duration::from_secs(30),
            timeout: minutes(120),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            pending: &["RESIZE", "VERIFY_RESIZE"],
            target: &["ACTIVE", "SHUTOFF", "OK"],
            min_interval: minutes(5),
            timeout: minutes(60),
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            pending: &[RETRY_LABEL, "DELETING"],
            target: &[ABSENT_LABEL],
            ..PHASE
        }),
    },
    // =========================================================================
    // Resource Controller
    // =========================================================================
    WaitProfile {
        resource_type: "database",
        collection: "/v2/resource_instances",
        create: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive", "provisioning"],
            target: &["active", "failed"],
            failed: &["failed"],
            timeout: minutes(60),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive"],
            target: &["active", "failed"],
            failed: &["failed"],
            timeout: minutes(60),
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive", "active"],
            target: &["removed", "pending_reclamation", ABSENT_LABEL],
            timeout: minutes(30),
            ..PHASE
        }),
    },
    WaitProfile {
        resource_type: "resource_instance",
        collection: "/v2/resource_instances",
        create: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive", "provisioning"],
            target: &["active"],
            timeout: minutes(10),
            ..PHASE
        }),
        update: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive"],
            target: &["active"],
            ..PHASE
        }),
        delete: Some(PhaseProfile {
            status_field: "/state",
            pending: &[RETRY_LABEL, "in progress", "inactive", "active"],
            target: &["removed", "pending_reclamation", ABSENT_LABEL],
            ..PHASE
        }),
    },
];

/// All known wait profiles, in display order
pub fn profiles() -> &'static [WaitProfile] {
    PROFILES
}

/// Look up the wait profile of a resource type
pub fn profile(resource_type: &str) -> Option<&'static WaitProfile> {
    PROFILES.iter().find(|p| p.resource_type == resource_type)
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    PROFILES
        .iter()
        .map(|p| Box::new(p) as Box<dyn ResourceType>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resource_types_are_unique() {
        let mut seen = HashSet::new();
        for profile in profiles() {
            assert!(
                seen.insert(profile.resource_type),
                "duplicate profile for {}",
                profile.resource_type
            );
        }
        assert_eq!(resource_types().len(), profiles().len());
    }

    #[test]
    fn every_phase_builds_a_valid_spec() {
        for profile in profiles() {
            for phase in Phase::ALL {
                if let Some(p) = profile.phase(phase) {
                    let spec = p.poll_spec();
                    assert!(
                        spec.validate().is_ok(),
                        "{} {}: {:?}",
                        profile.resource_type,
                        phase,
                        spec.validate()
                    );
                }
            }
        }
    }

    #[test]
    fn failed_labels_are_targets() {
        for profile in profiles() {
            for phase in Phase::ALL {
                if let Some(p) = profile.phase(phase) {
                    for label in p.failed {
                        assert!(
                            p.target.contains(label),
                            "{} {}: failed label '{}' is not a target",
                            profile.resource_type,
                            phase,
                            label
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn fallback_labels_are_pending() {
        for profile in profiles() {
            for phase in Phase::ALL {
                if let Some(p) = profile.phase(phase)
                    && let Some(fallback) = p.fallback
                {
                    assert!(p.pending.contains(&fallback));
                }
            }
        }
    }

    #[test]
    fn every_status_field_is_a_json_pointer() {
        for profile in profiles() {
            for phase in Phase::ALL {
                if let Some(p) = profile.phase(phase) {
                    assert!(p.status_field.starts_with('/'));
                }
            }
        }
    }

    #[test]
    fn lookup() {
        let cluster = profile("container_cluster").unwrap();
        let create = cluster.phase(Phase::Create).unwrap();
        assert_eq!(create.timeout, Duration::from_secs(90 * 60));
        assert_eq!(create.fallback, Some("provisioning"));
        assert!(cluster.phase(Phase::Delete).unwrap().poll_interval.is_some());

        assert!(profile("is_vpc").unwrap().phase(Phase::Update).is_none());
        assert!(profile("aws_vpc").is_none());
    }

    #[test]
    fn vpc_cluster_requires_stable_master() {
        let spec = profile("container_vpc_cluster")
            .unwrap()
            .phase(Phase::Create)
            .unwrap()
            .poll_spec();
        assert_eq!(spec.continuous_target_occurrence, 5);
        assert_eq!(spec.min_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn lb_delete_has_empty_target() {
        let delete = profile("is_lb").unwrap().phase(Phase::Delete).unwrap();
        assert!(delete.target.is_empty());
        assert!(delete.retries());
    }

    #[test]
    fn phase_parsing() {
        assert_eq!("create".parse::<Phase>(), Ok(Phase::Create));
        assert_eq!("delete".parse::<Phase>(), Ok(Phase::Delete));
        assert!("destroy".parse::<Phase>().is_err());
        assert_eq!(Phase::Update.to_string(), "update");
    }
}
