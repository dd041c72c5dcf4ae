use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use fieldline_core::{InvocationRecord, Quote, RequestAttributes, UrgencyLevel};

use crate::analyzer;
use crate::capability::{
    AvailabilityReport, CapabilityCall, CapabilityFailure, CapabilityKind, CapabilityOutput,
    CapabilityRegistry,
};

#[derive(Clone, Debug, PartialEq)]
pub enum ObservationOutcome {
    Completed(CapabilityOutput),
    Failed(CapabilityFailure),
}

/// Result of one Act step, merged into the turn's working state.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub capability: CapabilityKind,
    pub outcome: ObservationOutcome,
    pub latency: Duration,
}

impl Observation {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ObservationOutcome::Completed(_))
    }

    pub fn output(&self) -> Option<&CapabilityOutput> {
        match &self.outcome {
            ObservationOutcome::Completed(output) => Some(output),
            ObservationOutcome::Failed(_) => None,
        }
    }

    pub fn record(&self) -> InvocationRecord {
        InvocationRecord {
            capability: self.capability.as_str().to_string(),
            success: self.succeeded(),
            latency_ms: self.latency.as_millis() as u64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopTermination {
    /// Every capability required by the intent produced an observation.
    Done,
    /// The iteration cap fired before the required set was covered.
    Degraded,
}

/// Everything one reasoning pass learned about a request.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub attributes: RequestAttributes,
    pub observations: BTreeMap<CapabilityKind, Observation>,
    pub termination: LoopTermination,
    pub iterations: u32,
    pub used_fallback_analysis: bool,
}

impl TurnOutcome {
    /// The reply-level degraded flag: any failed observation, a fallback
    /// analysis, or a capped loop all mean the reply is best-effort.
    pub fn degraded(&self) -> bool {
        self.termination == LoopTermination::Degraded
            || self.used_fallback_analysis
            || self.observations.values().any(|observation| !observation.succeeded())
    }

    pub fn quote(&self) -> Option<&Quote> {
        match self.observations.get(&CapabilityKind::Pricing)?.output()? {
            CapabilityOutput::Pricing(quote) => Some(quote),
            _ => None,
        }
    }

    pub fn availability(&self) -> Option<&AvailabilityReport> {
        match self.observations.get(&CapabilityKind::Availability)?.output()? {
            CapabilityOutput::Availability(report) => Some(report),
            _ => None,
        }
    }

    pub fn failed_capabilities(&self) -> Vec<CapabilityKind> {
        self.observations
            .values()
            .filter(|observation| !observation.succeeded())
            .map(|observation| observation.capability)
            .collect()
    }

    pub fn invocation_records(&self) -> Vec<InvocationRecord> {
        self.observations.values().map(Observation::record).collect()
    }
}

/// Capabilities (beyond analysis) the intent requires before composing.
/// Pricing always runs: every dispatch reply carries cost information.
/// Availability runs when the customer asked about scheduling or the
/// request is time-critical.
pub fn required_capabilities(attributes: &RequestAttributes) -> Vec<CapabilityKind> {
    let mut required = Vec::with_capacity(2);
    if attributes.wants_scheduling || attributes.urgency >= UrgencyLevel::Urgent {
        required.push(CapabilityKind::Availability);
    }
    required.push(CapabilityKind::Pricing);
    required
}

/// The Think/Act/Observe controller. One instance serves many requests; all
/// per-turn state lives in `run`.
pub struct ReasoningLoop {
    registry: Arc<CapabilityRegistry>,
    max_iterations: u32,
    tool_timeout: Duration,
}

impl ReasoningLoop {
    pub fn new(registry: Arc<CapabilityRegistry>, max_iterations: u32, tool_timeout: Duration) -> Self {
        Self { registry, max_iterations, tool_timeout }
    }

    pub async fn run(
        &self,
        correlation_id: &str,
        text: &str,
        prior: Option<&RequestAttributes>,
    ) -> TurnOutcome {
        let mut observations: BTreeMap<CapabilityKind, Observation> = BTreeMap::new();
        let mut attributes: Option<RequestAttributes> = None;
        let mut used_fallback_analysis = false;
        let mut iterations = 0u32;

        let termination = loop {
            // Think: pick the next capability, or conclude.
            let Some(kind) = think(attributes.as_ref(), &observations) else {
                break LoopTermination::Done;
            };
            if iterations >= self.max_iterations {
                warn!(
                    event_name = "agent.loop.iteration_cap",
                    correlation_id,
                    iterations,
                    pending = %kind,
                    "iteration cap reached before the required set was covered"
                );
                break LoopTermination::Degraded;
            }
            iterations += 1;

            // Act: invoke through the registry, bounded by the call timeout.
            let call = match kind {
                CapabilityKind::Analysis => {
                    CapabilityCall::Analyze { text: text.to_string(), prior: prior.cloned() }
                }
                CapabilityKind::Availability => {
                    let working = attributes
                        .get_or_insert_with(|| analyzer::fallback_attributes(text, prior));
                    CapabilityCall::CheckAvailability {
                        service_types: working.service_types.clone(),
                        urgency: working.urgency,
                    }
                }
                CapabilityKind::Pricing => {
                    let working = attributes
                        .get_or_insert_with(|| analyzer::fallback_attributes(text, prior));
                    CapabilityCall::Price {
                        service_types: working.service_types.clone(),
                        urgency: working.urgency,
                    }
                }
            };
            let observation = self.act(correlation_id, kind, call).await;

            // Observe: merge the result or failure into the working state.
            match &observation.outcome {
                ObservationOutcome::Completed(CapabilityOutput::Analysis(analysis)) => {
                    used_fallback_analysis = analysis.used_fallback;
                    attributes = Some(analysis.attributes.clone());
                }
                ObservationOutcome::Failed(_) if kind == CapabilityKind::Analysis => {
                    // Substitute the deterministic extraction so the rest of
                    // the turn can still proceed.
                    used_fallback_analysis = true;
                    attributes = Some(analyzer::fallback_attributes(text, prior));
                }
                _ => {}
            }
            observations.insert(kind, observation);
        };

        let attributes =
            attributes.unwrap_or_else(|| analyzer::fallback_attributes(text, prior));

        TurnOutcome { attributes, observations, termination, iterations, used_fallback_analysis }
    }

    async fn act(
        &self,
        correlation_id: &str,
        kind: CapabilityKind,
        call: CapabilityCall,
    ) -> Observation {
        let started = Instant::now();
        let outcome = match self.registry.get(kind) {
            Ok(capability) => {
                match tokio::time::timeout(self.tool_timeout, capability.invoke(call)).await {
                    Ok(Ok(output)) => ObservationOutcome::Completed(output),
                    Ok(Err(failure)) => ObservationOutcome::Failed(failure),
                    Err(_) => ObservationOutcome::Failed(CapabilityFailure::TimedOut {
                        timeout_secs: self.tool_timeout.as_secs(),
                    }),
                }
            }
            Err(error) => ObservationOutcome::Failed(CapabilityFailure::failed(error.to_string())),
        };
        let latency = started.elapsed();

        match &outcome {
            ObservationOutcome::Completed(_) => debug!(
                event_name = "agent.loop.observation",
                correlation_id,
                capability = %kind,
                latency_ms = latency.as_millis() as u64,
                "capability completed"
            ),
            ObservationOutcome::Failed(failure) => warn!(
                event_name = "agent.loop.observation_failed",
                correlation_id,
                capability = %kind,
                latency_ms = latency.as_millis() as u64,
                error = %failure,
                "capability failed; recording observation"
            ),
        }

        Observation { capability: kind, outcome, latency }
    }
}

/// Fixed ordering policy: analysis first, then whatever the intent still
/// requires. A capability already observed this turn (success or failure)
/// is never re-invoked.
fn think(
    attributes: Option<&RequestAttributes>,
    observations: &BTreeMap<CapabilityKind, Observation>,
) -> Option<CapabilityKind> {
    if !observations.contains_key(&CapabilityKind::Analysis) {
        return Some(CapabilityKind::Analysis);
    }

    let attributes = attributes?;
    required_capabilities(attributes)
        .into_iter()
        .find(|kind| !observations.contains_key(kind))
}
