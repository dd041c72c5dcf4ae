use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldline_core::{Quote, RequestAttributes, ServiceType, UrgencyLevel};

use crate::capability::CapabilityKind;
use crate::orchestrator::TurnOutcome;

/// Machine-readable counterpart of the reply text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplySummary {
    pub urgency: UrgencyLevel,
    pub service_types: Vec<ServiceType>,
    pub quote: Option<Quote>,
    pub earliest_slot: Option<DateTime<Utc>>,
    pub slot_count: usize,
    pub failed_capabilities: Vec<String>,
    pub degraded: bool,
    pub next_steps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Composed {
    pub reply_text: String,
    pub summary: ReplySummary,
}

/// Pure rendering of the turn's observations. Sections degrade
/// independently: a failed capability yields an apology clause for that
/// section, never an empty reply.
pub fn compose(outcome: &TurnOutcome) -> Composed {
    let attributes = &outcome.attributes;
    let quote = outcome.quote().cloned();
    let availability = outcome.availability().cloned();
    let availability_required = outcome.observations.contains_key(&CapabilityKind::Availability);

    let mut lines = Vec::new();
    lines.push(acknowledgment(attributes));

    if availability_required {
        match &availability {
            Some(report) => {
                if let Some(slot) = report.slots.first() {
                    if slot.emergency_dispatch {
                        lines.push(format!(
                            "An on-call technician can be dispatched today, arriving around {}.",
                            slot.starts_at.format("%H:%M UTC")
                        ));
                    } else {
                        lines.push(format!(
                            "Our earliest visit is {} with {}; {} slot(s) are open this week.",
                            slot.starts_at.format("%B %-d at %H:%M UTC"),
                            slot.technician,
                            report.slots.len()
                        ));
                    }
                }
            }
            None => lines.push(
                "We could not confirm technician availability just now; our team will follow up \
                 shortly to schedule your visit."
                    .to_string(),
            ),
        }
    }

    match &quote {
        Some(quote) => {
            for line in &quote.lines {
                lines.push(format!(
                    "- {}: ${}",
                    line.service.display_name(),
                    line.adjusted_price
                ));
            }
            if quote.discount_total > rust_decimal::Decimal::ZERO {
                lines.push(format!(
                    "Bundling these services saves you ${} ({}% off).",
                    quote.discount_total,
                    (quote.discount_rate * rust_decimal::Decimal::ONE_HUNDRED).normalize()
                ));
            }
            lines.push(format!("Estimated total: ${}.", quote.total));
        }
        None => lines.push(
            "We could not compute an estimate right now; we will confirm pricing with you before \
             any work begins."
                .to_string(),
        ),
    }

    let next_steps = next_steps(&quote, &availability);
    lines.extend(next_steps.iter().map(|step| format!("Next: {step}")));

    let summary = ReplySummary {
        urgency: attributes.urgency,
        service_types: attributes.service_types.iter().copied().collect(),
        earliest_slot: availability.as_ref().and_then(|report| report.earliest),
        slot_count: availability.as_ref().map(|report| report.slots.len()).unwrap_or(0),
        failed_capabilities: outcome
            .failed_capabilities()
            .into_iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
        degraded: outcome.degraded(),
        next_steps,
        quote,
    };

    Composed { reply_text: lines.join("\n"), summary }
}

fn acknowledgment(attributes: &RequestAttributes) -> String {
    let services = attributes
        .service_types
        .iter()
        .map(|service| service.display_name())
        .collect::<Vec<_>>()
        .join(", ");

    match attributes.urgency {
        UrgencyLevel::Emergency => format!(
            "This sounds like an emergency - we are treating your {services} request with top \
             priority."
        ),
        UrgencyLevel::Urgent => {
            format!("We understand this is time-sensitive. Request noted for: {services}.")
        }
        UrgencyLevel::Routine => format!("Thanks for reaching out. Request noted for: {services}."),
    }
}

fn next_steps(
    quote: &Option<Quote>,
    availability: &Option<crate::capability::AvailabilityReport>,
) -> Vec<String> {
    let mut steps = Vec::new();
    if availability.as_ref().map(|report| !report.slots.is_empty()).unwrap_or(false) {
        steps.push("Reply with a preferred time slot to confirm your appointment.".to_string());
    }
    if let Some(quote) = quote {
        steps.push("Review the estimate and confirm to book.".to_string());
        if quote.lines.len() == 1 {
            steps.push(
                "Ask about bundling another service to unlock a multi-service discount."
                    .to_string(),
            );
        }
    }
    if steps.is_empty() {
        steps.push("Our team will contact you with scheduling and pricing details.".to_string());
    }
    steps
}
