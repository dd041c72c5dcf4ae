//! Agent Runtime - conversational dispatch orchestration
//!
//! This crate provides the "brain" of the fieldline system - the runtime
//! that:
//! - Extracts structured request attributes from natural language
//! - Manages bounded conversation context across followups
//! - Sequences capability calls through a Think/Act/Observe loop
//! - Composes customer-facing replies from partial, possibly-failed results
//!
//! # Architecture
//!
//! The agent follows a constrained loop:
//! 1. **Analysis** (`analyzer`) - Parse NL -> structured `RequestAttributes`,
//!    via the LLM backend or a deterministic keyword fallback
//! 2. **Orchestration** (`orchestrator`) - Think/Act/Observe over the closed
//!    capability registry, bounded by a timeout per call and a hard
//!    iteration cap
//! 3. **Composition** (`composer`) - Render observations into a reply,
//!    degrading gracefully where capabilities failed
//!
//! # Key Types
//!
//! - `Dispatcher` - external entry point (see `dispatcher` module)
//! - `CapabilityRegistry` - closed, startup-validated capability set
//! - `LlmClient` - pluggable trait for OpenAI/Anthropic/Ollama backends
//!
//! # Reliability Principle
//!
//! The LLM backend is strictly an extractor. Every price, slot, and policy
//! outcome is computed deterministically, and any backend failure degrades
//! to the keyword fallback rather than failing the request.

pub mod analyzer;
pub mod availability;
pub mod capability;
pub mod composer;
pub mod dispatcher;
pub mod llm;
pub mod orchestrator;

pub use capability::{
    AnalysisResult, AvailabilityReport, Capability, CapabilityCall, CapabilityFailure,
    CapabilityKind, CapabilityOutput, CapabilityRegistry, LatencyClass, PricingCapability, Slot,
};
pub use dispatcher::{DispatchReply, Dispatcher, Health, SessionSnapshot};
