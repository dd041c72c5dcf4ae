use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use fieldline_core::{RequestAttributes, ServiceType, UrgencyLevel};

use crate::capability::{
    AnalysisResult, Capability, CapabilityCall, CapabilityFailure, CapabilityKind,
    CapabilityOutput, LatencyClass,
};
use crate::llm::LlmClient;

/// Classifies free text into `RequestAttributes`. The backend path asks the
/// LLM for a structured extraction; every failure mode (unconfigured,
/// timeout, malformed output) degrades to the deterministic keyword path,
/// which is total.
pub struct RequestAnalyzer {
    backend: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
}

impl RequestAnalyzer {
    pub fn new(backend: Option<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn fallback_only(timeout: Duration) -> Self {
        Self::new(None, timeout)
    }

    pub fn backend_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn analyze(&self, text: &str, prior: Option<&RequestAttributes>) -> AnalysisResult {
        if let Some(backend) = &self.backend {
            match tokio::time::timeout(self.timeout, backend.complete(&extraction_prompt(text, prior)))
                .await
            {
                Ok(Ok(raw)) => {
                    if let Some(attributes) = parse_extraction(&raw, text, prior) {
                        debug!(event_name = "analyzer.backend.extracted", "backend extraction ok");
                        return AnalysisResult { attributes, used_fallback: false };
                    }
                    warn!(
                        event_name = "analyzer.backend.malformed",
                        "backend returned unusable extraction; using fallback"
                    );
                }
                Ok(Err(error)) => {
                    warn!(
                        event_name = "analyzer.backend.failed",
                        error = %error,
                        "backend call failed; using fallback"
                    );
                }
                Err(_) => {
                    warn!(
                        event_name = "analyzer.backend.timeout",
                        timeout_secs = self.timeout.as_secs(),
                        "backend call timed out; using fallback"
                    );
                }
            }
        }

        AnalysisResult { attributes: fallback_attributes(text, prior), used_fallback: true }
    }
}

/// Registry adapter so analysis runs through the same invocation interface
/// as every other capability.
pub struct AnalysisCapability {
    analyzer: Arc<RequestAnalyzer>,
}

impl AnalysisCapability {
    pub fn new(analyzer: Arc<RequestAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Capability for AnalysisCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Analysis
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Backend
    }

    async fn invoke(&self, call: CapabilityCall) -> Result<CapabilityOutput, CapabilityFailure> {
        match call {
            CapabilityCall::Analyze { text, prior } => Ok(CapabilityOutput::Analysis(
                self.analyzer.analyze(&text, prior.as_ref()).await,
            )),
            other => Err(CapabilityFailure::contract_mismatch(self.kind(), other.kind())),
        }
    }
}

/// Total deterministic analysis: for any input text this produces valid
/// attributes, defaulting to a routine general-service request.
pub fn fallback_attributes(text: &str, prior: Option<&RequestAttributes>) -> RequestAttributes {
    let normalized = text.to_ascii_lowercase();
    let tokens = tokenize(&normalized);

    let mut service_types = BTreeSet::new();
    for (service, words, phrases) in SERVICE_VOCABULARY {
        if matches_any(&normalized, &tokens, words, phrases) {
            service_types.insert(*service);
        }
    }

    let urgency = detect_urgency(&normalized, &tokens);
    let mut attributes = RequestAttributes::new(urgency, service_types, "");
    attributes.wants_scheduling =
        matches_any(&normalized, &tokens, SCHEDULING_WORDS, SCHEDULING_PHRASES);
    attributes.wants_pricing = matches_any(&normalized, &tokens, PRICING_WORDS, PRICING_PHRASES);
    attributes.summary = summarize(&attributes);

    match prior {
        Some(prior) => attributes.merged_onto(prior, replacement_indicated(text)),
        None => attributes,
    }
}

/// Whether the customer text explicitly asks to replace the running service
/// set rather than extend it.
pub fn replacement_indicated(text: &str) -> bool {
    let normalized = text.to_ascii_lowercase();
    let tokens = tokenize(&normalized);
    matches_any(&normalized, &tokens, REPLACEMENT_WORDS, REPLACEMENT_PHRASES)
}

fn detect_urgency(normalized: &str, tokens: &[String]) -> UrgencyLevel {
    if matches_any(normalized, tokens, EMERGENCY_WORDS, EMERGENCY_PHRASES) {
        UrgencyLevel::Emergency
    } else if matches_any(normalized, tokens, URGENT_WORDS, URGENT_PHRASES) {
        UrgencyLevel::Urgent
    } else {
        UrgencyLevel::Routine
    }
}

fn summarize(attributes: &RequestAttributes) -> String {
    let services = attributes
        .service_types
        .iter()
        .map(|service| service.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("customer requests {services} (urgency: {})", attributes.urgency)
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn matches_any(normalized: &str, tokens: &[String], words: &[&str], phrases: &[&str]) -> bool {
    words.iter().any(|word| tokens.iter().any(|token| token == word))
        || phrases.iter().any(|phrase| normalized.contains(phrase))
}

const SERVICE_VOCABULARY: &[(ServiceType, &[&str], &[&str])] = &[
    (
        ServiceType::AcRepair,
        &["ac", "hvac", "conditioner", "cooling"],
        &["air conditioning", "air conditioner"],
    ),
    (ServiceType::HeatingRepair, &["heating", "heat", "furnace", "boiler"], &[]),
    (
        ServiceType::PlumbingRepair,
        &["plumbing", "plumber", "pipe", "drain", "toilet", "leak"],
        &["water heater"],
    ),
    (
        ServiceType::ElectricalRepair,
        &["electrical", "electric", "outlet", "wiring", "lights", "breaker"],
        &[],
    ),
    (ServiceType::ThermostatInstall, &["thermostat"], &["temperature control"]),
    (ServiceType::FilterReplacement, &["filter", "filters"], &[]),
    (ServiceType::DuctCleaning, &["duct", "ducts"], &[]),
    (ServiceType::MaintenancePlan, &["maintenance"], &["service plan", "tune up", "tune-up"]),
];

const EMERGENCY_WORDS: &[&str] = &["emergency", "asap", "immediately"];
const EMERGENCY_PHRASES: &[&str] = &["right now", "no heat at all", "flooding"];
const URGENT_WORDS: &[&str] = &["urgent", "broken", "soon", "today", "tomorrow", "quickly", "leaking"];
const URGENT_PHRASES: &[&str] = &["not working", "stopped working", "this week"];

const SCHEDULING_WORDS: &[&str] =
    &["when", "schedule", "appointment", "available", "availability", "book", "visit", "today", "tomorrow"];
const SCHEDULING_PHRASES: &[&str] = &["come out", "this week", "send someone"];

const PRICING_WORDS: &[&str] =
    &["cost", "price", "pricing", "quote", "estimate", "expensive", "bundle"];
const PRICING_PHRASES: &[&str] = &["how much"];

const REPLACEMENT_WORDS: &[&str] = &["instead"];
const REPLACEMENT_PHRASES: &[&str] =
    &["rather than", "switch to", "cancel the", "scratch that", "no longer need", "forget the"];

fn extraction_prompt(text: &str, prior: Option<&RequestAttributes>) -> String {
    let tags = ServiceType::ALL.map(|service| service.as_str()).join(", ");
    let prior_json = prior
        .and_then(|attributes| serde_json::to_string(attributes).ok())
        .unwrap_or_else(|| "null".to_string());

    format!(
        "You are the request analyzer for a home-services dispatch agent.\n\
         Extract structured attributes from the customer message.\n\
         Reply with exactly one JSON object and no other text, shaped as:\n\
         {{\"urgency\": \"routine|urgent|emergency\", \"service_types\": [\"tag\"], \
         \"summary\": \"one sentence\", \"wants_scheduling\": true, \"wants_pricing\": true}}\n\
         Known service tags: {tags}.\n\
         Prior attributes from this conversation (or null): {prior_json}\n\
         Customer message: {text}"
    )
}

#[derive(Debug, Deserialize)]
struct BackendExtraction {
    urgency: String,
    service_types: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    wants_scheduling: Option<bool>,
    #[serde(default)]
    wants_pricing: Option<bool>,
}

/// Defensive parse of the backend reply. Returns `None` (and thereby the
/// fallback path) unless the reply yields a well-formed extraction.
fn parse_extraction(
    raw: &str,
    text: &str,
    prior: Option<&RequestAttributes>,
) -> Option<RequestAttributes> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    let extraction: BackendExtraction = serde_json::from_str(raw.get(start..=end)?).ok()?;

    let urgency = match extraction.urgency.trim().to_ascii_lowercase().as_str() {
        "routine" => UrgencyLevel::Routine,
        "urgent" => UrgencyLevel::Urgent,
        "emergency" => UrgencyLevel::Emergency,
        _ => return None,
    };

    let service_types: BTreeSet<ServiceType> = extraction
        .service_types
        .iter()
        .filter_map(|tag| tag.parse().ok())
        .collect();
    if service_types.is_empty() {
        return None;
    }

    let summary = extraction
        .summary
        .filter(|summary| !summary.trim().is_empty())
        .unwrap_or_else(|| text.trim().to_string());

    let mut attributes = RequestAttributes::new(urgency, service_types, summary);
    attributes.wants_scheduling = extraction.wants_scheduling.unwrap_or(false);
    attributes.wants_pricing = extraction.wants_pricing.unwrap_or(false);

    Some(match prior {
        Some(prior) => attributes.merged_onto(prior, replacement_indicated(text)),
        None => attributes,
    })
}
