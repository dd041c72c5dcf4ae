use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fieldline_core::errors::RegistryError;
use fieldline_core::{Quote, RequestAttributes, ServiceType, UrgencyLevel};

/// The closed set of capabilities the reasoning loop may invoke. No dynamic
/// registration: every kind is declared here and validated at startup.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Analysis,
    Availability,
    Pricing,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [Self::Analysis, Self::Availability, Self::Pricing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Availability => "availability",
            Self::Pricing => "pricing",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared latency expectation, used for logging and timeout tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatencyClass {
    /// In-process, deterministic; completes in microseconds.
    Fast,
    /// Involves an out-of-process backend; bounded only by the call timeout.
    Backend,
}

/// Argument contract: one tagged variant per capability.
#[derive(Clone, Debug, PartialEq)]
pub enum CapabilityCall {
    Analyze { text: String, prior: Option<RequestAttributes> },
    CheckAvailability { service_types: BTreeSet<ServiceType>, urgency: UrgencyLevel },
    Price { service_types: BTreeSet<ServiceType>, urgency: UrgencyLevel },
}

impl CapabilityCall {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Analyze { .. } => CapabilityKind::Analysis,
            Self::CheckAvailability { .. } => CapabilityKind::Availability,
            Self::Price { .. } => CapabilityKind::Pricing,
        }
    }
}

/// Result contract, mirroring `CapabilityCall`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CapabilityOutput {
    Analysis(AnalysisResult),
    Availability(AvailabilityReport),
    Pricing(Quote),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub attributes: RequestAttributes,
    /// True when the deterministic keyword path produced the attributes,
    /// whether because the backend is unconfigured or because it failed.
    pub used_fallback: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub starts_at: DateTime<Utc>,
    pub technician: String,
    pub emergency_dispatch: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub slots: Vec<Slot>,
    pub earliest: Option<DateTime<Utc>>,
}

/// Failure of a single capability call. Recorded as an observation by the
/// reasoning loop; never propagated past it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityFailure {
    #[error("capability `{kind}` received a `{got}` call")]
    ContractMismatch { kind: &'static str, got: &'static str },
    #[error("capability call failed: {reason}")]
    Failed { reason: String },
    #[error("capability call timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },
}

impl CapabilityFailure {
    pub fn contract_mismatch(kind: CapabilityKind, got: CapabilityKind) -> Self {
        Self::ContractMismatch { kind: kind.as_str(), got: got.as_str() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> CapabilityKind;
    fn latency_class(&self) -> LatencyClass;
    async fn invoke(&self, call: CapabilityCall) -> Result<CapabilityOutput, CapabilityFailure>;
}

/// Read-only capability set, validated once at construction: every kind
/// present exactly once.
pub struct CapabilityRegistry {
    capabilities: BTreeMap<CapabilityKind, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn from_capabilities(
        capabilities: Vec<Box<dyn Capability>>,
    ) -> Result<Self, RegistryError> {
        let mut registered: BTreeMap<CapabilityKind, Box<dyn Capability>> = BTreeMap::new();
        for capability in capabilities {
            let kind = capability.kind();
            if registered.insert(kind, capability).is_some() {
                return Err(RegistryError::DuplicateCapability(kind.as_str().to_string()));
            }
        }

        for kind in CapabilityKind::ALL {
            if !registered.contains_key(&kind) {
                return Err(RegistryError::MissingCapability(kind.as_str().to_string()));
            }
        }

        Ok(Self { capabilities: registered })
    }

    pub fn get(&self, kind: CapabilityKind) -> Result<&dyn Capability, RegistryError> {
        self.capabilities
            .get(&kind)
            .map(Box::as_ref)
            .ok_or_else(|| RegistryError::UnknownCapability(kind.as_str().to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.capabilities.keys().copied()
    }
}

/// Registry adapter over the deterministic pricing engine.
pub struct PricingCapability<E> {
    engine: E,
}

impl<E> PricingCapability<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E> Capability for PricingCapability<E>
where
    E: fieldline_core::PricingEngine,
{
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Pricing
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Fast
    }

    async fn invoke(&self, call: CapabilityCall) -> Result<CapabilityOutput, CapabilityFailure> {
        match call {
            CapabilityCall::Price { service_types, urgency } => {
                Ok(CapabilityOutput::Pricing(self.engine.quote(&service_types, urgency)))
            }
            other => Err(CapabilityFailure::contract_mismatch(self.kind(), other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use fieldline_core::errors::RegistryError;
    use fieldline_core::{DeterministicPricingEngine, UrgencyLevel};

    use super::{
        Capability, CapabilityCall, CapabilityFailure, CapabilityKind, CapabilityOutput,
        CapabilityRegistry, LatencyClass, PricingCapability,
    };
    use crate::analyzer::{AnalysisCapability, RequestAnalyzer};
    use crate::availability::AvailabilityCapability;

    fn standard_capabilities() -> Vec<Box<dyn Capability>> {
        let analyzer = Arc::new(RequestAnalyzer::fallback_only(Duration::from_secs(5)));
        vec![
            Box::new(AnalysisCapability::new(analyzer)),
            Box::new(AvailabilityCapability::default()),
            Box::new(PricingCapability::new(DeterministicPricingEngine::default())),
        ]
    }

    #[test]
    fn registry_validates_complete_capability_set() {
        let registry = CapabilityRegistry::from_capabilities(standard_capabilities())
            .expect("standard set should validate");

        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds, CapabilityKind::ALL.to_vec());
    }

    #[test]
    fn missing_capability_fails_startup_validation() {
        let mut capabilities = standard_capabilities();
        capabilities.retain(|capability| capability.kind() != CapabilityKind::Pricing);

        let error = CapabilityRegistry::from_capabilities(capabilities)
            .err()
            .expect("validation should fail");
        assert_eq!(error, RegistryError::MissingCapability("pricing".to_string()));
    }

    #[test]
    fn duplicate_capability_fails_startup_validation() {
        let mut capabilities = standard_capabilities();
        capabilities.push(Box::new(AvailabilityCapability::default()));

        let error = CapabilityRegistry::from_capabilities(capabilities)
            .err()
            .expect("validation should fail");
        assert_eq!(error, RegistryError::DuplicateCapability("availability".to_string()));
    }

    #[tokio::test]
    async fn mismatched_call_is_a_contract_failure() {
        let registry = CapabilityRegistry::from_capabilities(standard_capabilities())
            .expect("standard set should validate");
        let pricing = registry.get(CapabilityKind::Pricing).expect("pricing is registered");

        let error = pricing
            .invoke(CapabilityCall::CheckAvailability {
                service_types: BTreeSet::new(),
                urgency: UrgencyLevel::Routine,
            })
            .await
            .expect_err("wrong call variant must be rejected");
        assert!(matches!(error, CapabilityFailure::ContractMismatch { .. }));
    }

    #[tokio::test]
    async fn registered_capabilities_declare_latency_classes() {
        let registry = CapabilityRegistry::from_capabilities(standard_capabilities())
            .expect("standard set should validate");

        let analysis = registry.get(CapabilityKind::Analysis).expect("analysis is registered");
        assert_eq!(analysis.latency_class(), LatencyClass::Backend);

        let pricing = registry.get(CapabilityKind::Pricing).expect("pricing is registered");
        assert_eq!(pricing.latency_class(), LatencyClass::Fast);

        let call = CapabilityCall::Price {
            service_types: [fieldline_core::ServiceType::AcRepair].into_iter().collect(),
            urgency: UrgencyLevel::Routine,
        };
        let output = pricing.invoke(call).await.expect("pricing should succeed");
        assert!(matches!(output, CapabilityOutput::Pricing(_)));
    }
}
