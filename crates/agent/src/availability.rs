use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};

use fieldline_core::{ServiceType, UrgencyLevel};

use crate::capability::{
    AvailabilityReport, Capability, CapabilityCall, CapabilityFailure, CapabilityKind,
    CapabilityOutput, LatencyClass, Slot,
};

const TECHNICIANS: [&str; 3] = ["Sarah M.", "John D.", "Mike R."];

/// Simulated technician calendar. There is no real scheduling backend; the
/// report is a deterministic function of the request shape and the clock.
#[derive(Clone, Debug, Default)]
pub struct AvailabilityCapability;

#[async_trait]
impl Capability for AvailabilityCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Availability
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Fast
    }

    async fn invoke(&self, call: CapabilityCall) -> Result<CapabilityOutput, CapabilityFailure> {
        match call {
            CapabilityCall::CheckAvailability { service_types, urgency } => Ok(
                CapabilityOutput::Availability(report_from(Utc::now(), &service_types, urgency)),
            ),
            other => Err(CapabilityFailure::contract_mismatch(self.kind(), other.kind())),
        }
    }
}

/// Emergencies get a same-day on-call dispatch; everything else gets morning
/// slots on the following days, one technician per day.
pub fn report_from(
    now: DateTime<Utc>,
    _service_types: &BTreeSet<ServiceType>,
    urgency: UrgencyLevel,
) -> AvailabilityReport {
    let slots = if urgency == UrgencyLevel::Emergency {
        vec![Slot {
            starts_at: now + Duration::hours(2),
            technician: "On-call dispatch".to_string(),
            emergency_dispatch: true,
        }]
    } else {
        let first_day_offset = 1;
        TECHNICIANS
            .iter()
            .enumerate()
            .map(|(index, technician)| Slot {
                starts_at: morning_of(now + Duration::days(first_day_offset + index as i64)),
                technician: (*technician).to_string(),
                emergency_dispatch: false,
            })
            .collect()
    };

    let earliest = slots.first().map(|slot| slot.starts_at);
    AvailabilityReport { slots, earliest }
}

fn morning_of(day: DateTime<Utc>) -> DateTime<Utc> {
    day.with_hour(9)
        .and_then(|at| at.with_minute(0))
        .and_then(|at| at.with_second(0))
        .and_then(|at| at.with_nanosecond(0))
        .unwrap_or(day)
}
