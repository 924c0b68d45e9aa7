//! Connection-admission policy.
//!
//! Evaluated once per connection, before any Call is processed. The decision
//! function is pure and synchronous: the caller resolves node, feature, and
//! charger state through the async collaborators first and passes the
//! resolved values in, which keeps the policy unit-testable without storage.

use voltmesh_core::Result;

use crate::handlers::{ChargerRepository, NodeDirectory};

/// Node-level kill switch for all charge-point sessions.
pub const FEATURE_CHARGE_POINTS: &str = "charge-points";
/// Gates creation of chargers not seen before.
pub const FEATURE_CHARGER_CREATION: &str = "charger-creation";

pub const REASON_NODE_MISSING: &str = "node-missing";
pub const REASON_NODE_FEATURE_DISABLED: &str = "node-feature-disabled";
pub const REASON_CREATION_DISABLED_KNOWN: &str = "creation-disabled-known";
pub const REASON_CREATION_DISABLED_UNKNOWN: &str = "creation-disabled-unknown";

/// Already-resolved state the policy evaluates over.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionInput {
    /// Whether a local node record resolved at all.
    pub node_present: bool,
    /// Node-level "charge-points" feature flag.
    pub charge_points_enabled: bool,
    /// "charger-creation" flag; `None` falls back to the node-level flag.
    pub charger_creation: Option<bool>,
    /// Whether the charger already has a record.
    pub charger_known: bool,
}

/// Outcome of admission. The reason is a diagnostic code for logs and
/// telemetry only; it is never transmitted to the charge point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<&'static str>,
}

impl AdmissionDecision {
    fn allow(reason: Option<&'static str>) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate the admission rules in order; the first matching rule wins.
pub fn decide(input: AdmissionInput) -> AdmissionDecision {
    // Fail-open when no node record resolves: a misconfigured node must never
    // block every charge point. Deliberate; see DESIGN.md.
    if !input.node_present {
        return AdmissionDecision::allow(Some(REASON_NODE_MISSING));
    }

    // Hard kill switch, independent of charger identity.
    if !input.charge_points_enabled {
        return AdmissionDecision::deny(REASON_NODE_FEATURE_DISABLED);
    }

    let creation_enabled = input
        .charger_creation
        .unwrap_or(input.charge_points_enabled);
    if !creation_enabled {
        // Existing chargers keep working even while new-charger creation is
        // frozen; unknown ones are turned away.
        if input.charger_known {
            return AdmissionDecision::allow(Some(REASON_CREATION_DISABLED_KNOWN));
        }
        return AdmissionDecision::deny(REASON_CREATION_DISABLED_UNKNOWN);
    }

    AdmissionDecision::allow(None)
}

/// Resolve the collaborator state for one charger and evaluate the policy.
/// This is the only impure step; [`decide`] itself stays synchronous.
pub async fn resolve_and_decide(
    nodes: &dyn NodeDirectory,
    chargers: &dyn ChargerRepository,
    charger_id: &str,
) -> Result<AdmissionDecision> {
    let node_present = nodes.local_node().await?.is_some();
    let charge_points_enabled = nodes
        .feature_enabled(FEATURE_CHARGE_POINTS)
        .await?
        .unwrap_or(true);
    let charger_creation = nodes.feature_enabled(FEATURE_CHARGER_CREATION).await?;
    let charger_known = chargers.find(charger_id).await?.is_some();

    Ok(decide(AdmissionInput {
        node_present,
        charge_points_enabled,
        charger_creation,
        charger_known,
    }))
}
