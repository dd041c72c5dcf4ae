use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Urgency of a customer request. Ordering matters: followup merging keeps
/// the highest level seen in the session, so escalation is sticky.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    #[default]
    Routine,
    Urgent,
    Emergency,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed catalog of dispatchable service types. `GeneralService` is the
/// placeholder assigned when no specific service can be recognized; it is
/// dropped from a set as soon as a specific tag joins it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    AcRepair,
    HeatingRepair,
    PlumbingRepair,
    ElectricalRepair,
    ThermostatInstall,
    FilterReplacement,
    DuctCleaning,
    MaintenancePlan,
    GeneralService,
}

impl ServiceType {
    pub const ALL: [ServiceType; 9] = [
        Self::AcRepair,
        Self::HeatingRepair,
        Self::PlumbingRepair,
        Self::ElectricalRepair,
        Self::ThermostatInstall,
        Self::FilterReplacement,
        Self::DuctCleaning,
        Self::MaintenancePlan,
        Self::GeneralService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcRepair => "ac-repair",
            Self::HeatingRepair => "heating-repair",
            Self::PlumbingRepair => "plumbing-repair",
            Self::ElectricalRepair => "electrical-repair",
            Self::ThermostatInstall => "thermostat-install",
            Self::FilterReplacement => "filter-replacement",
            Self::DuctCleaning => "duct-cleaning",
            Self::MaintenancePlan => "maintenance-plan",
            Self::GeneralService => "general-service",
        }
    }

    /// Customer-facing name used in composed replies.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AcRepair => "AC repair",
            Self::HeatingRepair => "heating repair",
            Self::PlumbingRepair => "plumbing repair",
            Self::ElectricalRepair => "electrical repair",
            Self::ThermostatInstall => "thermostat installation",
            Self::FilterReplacement => "filter replacement",
            Self::DuctCleaning => "duct cleaning",
            Self::MaintenancePlan => "maintenance plan",
            Self::GeneralService => "general service visit",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = UnknownServiceTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|service| service.as_str() == normalized)
            .ok_or_else(|| UnknownServiceTag(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown service tag `{0}`")]
pub struct UnknownServiceTag(pub String);

/// Structured extraction of a customer request. Always well-formed: the
/// service set is non-empty for any analyzer output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAttributes {
    pub urgency: UrgencyLevel,
    pub service_types: BTreeSet<ServiceType>,
    pub summary: String,
    pub wants_scheduling: bool,
    pub wants_pricing: bool,
}

impl RequestAttributes {
    pub fn new(
        urgency: UrgencyLevel,
        service_types: BTreeSet<ServiceType>,
        summary: impl Into<String>,
    ) -> Self {
        let mut attributes = Self {
            urgency,
            service_types,
            summary: summary.into(),
            wants_scheduling: false,
            wants_pricing: false,
        };
        attributes.normalize();
        attributes
    }

    /// Guarantee a non-empty service set and drop the generic placeholder
    /// once a specific tag is present.
    pub fn normalize(&mut self) {
        if self.service_types.len() > 1 {
            self.service_types.remove(&ServiceType::GeneralService);
        }
        if self.service_types.is_empty() {
            self.service_types.insert(ServiceType::GeneralService);
        }
    }

    /// Followup merge law: the new attributes absorb the prior turn's
    /// service set (union) unless the customer explicitly asked for
    /// replacement. Urgency keeps the maximum of both turns; scheduling and
    /// pricing interest carries forward.
    pub fn merged_onto(mut self, prior: &Self, replace_services: bool) -> Self {
        if !replace_services {
            self.service_types.extend(prior.service_types.iter().copied());
        }
        self.urgency = self.urgency.max(prior.urgency);
        self.wants_scheduling |= prior.wants_scheduling;
        self.wants_pricing |= prior.wants_pricing;
        self.normalize();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{RequestAttributes, ServiceType, UrgencyLevel};

    fn attrs(urgency: UrgencyLevel, services: &[ServiceType]) -> RequestAttributes {
        RequestAttributes::new(urgency, services.iter().copied().collect(), "test request")
    }

    #[test]
    fn urgency_levels_are_ordered_for_escalation() {
        assert!(UrgencyLevel::Routine < UrgencyLevel::Urgent);
        assert!(UrgencyLevel::Urgent < UrgencyLevel::Emergency);
    }

    #[test]
    fn service_tags_round_trip_as_kebab_case() {
        for service in ServiceType::ALL {
            let parsed: ServiceType = service.as_str().parse().expect("tag should parse");
            assert_eq!(parsed, service);
        }
        assert_eq!("ac_repair".parse::<ServiceType>(), Ok(ServiceType::AcRepair));
        assert!("jetpack-repair".parse::<ServiceType>().is_err());
    }

    #[test]
    fn empty_service_set_defaults_to_general_service() {
        let attributes = attrs(UrgencyLevel::Routine, &[]);
        let expected: BTreeSet<_> = [ServiceType::GeneralService].into_iter().collect();
        assert_eq!(attributes.service_types, expected);
    }

    #[test]
    fn followup_merge_unions_service_sets() {
        let prior = attrs(UrgencyLevel::Urgent, &[ServiceType::AcRepair]);
        let followup = attrs(UrgencyLevel::Routine, &[ServiceType::ThermostatInstall]);

        let merged = followup.merged_onto(&prior, false);
        let expected: BTreeSet<_> =
            [ServiceType::AcRepair, ServiceType::ThermostatInstall].into_iter().collect();
        assert_eq!(merged.service_types, expected);
        assert_eq!(merged.urgency, UrgencyLevel::Urgent);
    }

    #[test]
    fn replacement_drops_prior_services() {
        let prior = attrs(UrgencyLevel::Routine, &[ServiceType::AcRepair]);
        let followup = attrs(UrgencyLevel::Routine, &[ServiceType::DuctCleaning]);

        let merged = followup.merged_onto(&prior, true);
        let expected: BTreeSet<_> = [ServiceType::DuctCleaning].into_iter().collect();
        assert_eq!(merged.service_types, expected);
    }

    #[test]
    fn merge_drops_general_placeholder_when_specific_service_known() {
        let prior = attrs(UrgencyLevel::Routine, &[ServiceType::AcRepair]);
        let followup = attrs(UrgencyLevel::Routine, &[]);

        let merged = followup.merged_onto(&prior, false);
        let expected: BTreeSet<_> = [ServiceType::AcRepair].into_iter().collect();
        assert_eq!(merged.service_types, expected);
    }

    #[test]
    fn scheduling_and_pricing_interest_carries_forward() {
        let mut prior = attrs(UrgencyLevel::Routine, &[ServiceType::AcRepair]);
        prior.wants_scheduling = true;
        let followup = attrs(UrgencyLevel::Routine, &[ServiceType::ThermostatInstall]);

        let merged = followup.merged_onto(&prior, false);
        assert!(merged.wants_scheduling);
        assert!(!merged.wants_pricing);
    }
}
