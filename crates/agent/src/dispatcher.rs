use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use fieldline_core::config::{AgentConfig, AppConfig};
use fieldline_core::errors::{DispatchError, RegistryError};
use fieldline_core::{
    ConversationMemory, DeterministicPricingEngine, Quote, RequestAttributes, Turn,
};

use crate::analyzer::{AnalysisCapability, RequestAnalyzer};
use crate::availability::AvailabilityCapability;
use crate::capability::{Capability, CapabilityRegistry, PricingCapability};
use crate::composer::{compose, ReplySummary};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::orchestrator::ReasoningLoop;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchReply {
    pub reply_text: String,
    pub attributes: RequestAttributes,
    pub quote: Option<Quote>,
    pub degraded: bool,
    pub summary: ReplySummary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub turns: Vec<Turn>,
    pub last_attributes: Option<RequestAttributes>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub ready: bool,
    pub backend_available: bool,
}

/// The externally callable surface of the agent. Owns the session store and
/// serializes work per session: the session lock spans the whole
/// Think/Act/Observe cycle through composing and appending the turn, so a
/// followup always observes the attributes its predecessor produced.
/// Distinct sessions proceed concurrently.
pub struct Dispatcher {
    reasoning: ReasoningLoop,
    memory: Mutex<ConversationMemory>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    backend_available: bool,
}

impl Dispatcher {
    /// Build the standard capability set from configuration. Fails only on
    /// registry misconfiguration, which is a startup-time programming error.
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        let backend = HttpLlmClient::from_config(&config.llm)
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        let analyzer = Arc::new(RequestAnalyzer::new(
            backend,
            Duration::from_secs(config.llm.timeout_secs),
        ));
        let backend_available = analyzer.backend_configured();

        let capabilities: Vec<Box<dyn Capability>> = vec![
            Box::new(AnalysisCapability::new(Arc::clone(&analyzer))),
            Box::new(AvailabilityCapability::default()),
            Box::new(PricingCapability::new(DeterministicPricingEngine::default())),
        ];
        let registry = Arc::new(CapabilityRegistry::from_capabilities(capabilities)?);

        Ok(Self::with_registry(registry, &config.agent, backend_available))
    }

    /// Assemble from an explicit registry; used by tests and embedders that
    /// substitute capabilities.
    pub fn with_registry(
        registry: Arc<CapabilityRegistry>,
        agent: &AgentConfig,
        backend_available: bool,
    ) -> Self {
        Self {
            reasoning: ReasoningLoop::new(
                registry,
                agent.max_iterations,
                Duration::from_secs(agent.tool_timeout_secs),
            ),
            memory: Mutex::new(ConversationMemory::new(agent.memory_window)),
            session_locks: Mutex::new(HashMap::new()),
            backend_available,
        }
    }

    pub async fn handle_request(&self, session_id: &str, text: &str) -> DispatchReply {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.process(session_id, text).await
    }

    /// Same shape as `handle_request` but refuses ids with no history; the
    /// transport layer maps the error to its not-found signal.
    pub async fn handle_followup(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<DispatchReply, DispatchError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        if !self.memory.lock().await.contains(session_id) {
            return Err(DispatchError::UnknownSession(session_id.to_string()));
        }
        Ok(self.process(session_id, text).await)
    }

    /// Read-only introspection; does not create the session.
    pub async fn session_snapshot(&self, session_id: &str) -> SessionSnapshot {
        let memory = self.memory.lock().await;
        match memory.peek(session_id) {
            Some(session) => SessionSnapshot {
                turns: session.turns.iter().cloned().collect(),
                last_attributes: session.last_attributes.clone(),
            },
            None => SessionSnapshot { turns: Vec::new(), last_attributes: None },
        }
    }

    /// Explicit eviction hook for the embedder's session lifecycle policy.
    pub async fn evict_session(&self, session_id: &str) -> bool {
        let evicted = self.memory.lock().await.evict(session_id);
        self.session_locks.lock().await.remove(session_id);
        if evicted {
            info!(event_name = "dispatch.session.evicted", session_id, "session evicted");
        }
        evicted
    }

    pub fn health(&self) -> Health {
        Health { ready: true, backend_available: self.backend_available }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(
            locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Runs one turn. Caller must hold the session lock. The store mutex is
    /// only taken for map operations, never across capability calls.
    async fn process(&self, session_id: &str, text: &str) -> DispatchReply {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "dispatch.request.received",
            correlation_id = %correlation_id,
            session_id,
            "processing customer request"
        );

        let prior = {
            let mut memory = self.memory.lock().await;
            memory.get(session_id);
            memory.append(session_id, Turn::customer(text));
            memory.last_attributes(session_id)
        };

        let outcome = self.reasoning.run(&correlation_id, text, prior.as_ref()).await;
        let composed = compose(&outcome);
        let degraded = outcome.degraded();

        {
            let mut memory = self.memory.lock().await;
            memory.append(
                session_id,
                Turn::agent(
                    composed.reply_text.clone(),
                    outcome.attributes.clone(),
                    outcome.invocation_records(),
                ),
            );
            memory.set_last_attributes(session_id, outcome.attributes.clone());
        }

        info!(
            event_name = "dispatch.request.completed",
            correlation_id = %correlation_id,
            session_id,
            degraded,
            iterations = outcome.iterations,
            "request processed"
        );

        DispatchReply {
            reply_text: composed.reply_text,
            quote: outcome.quote().cloned(),
            attributes: outcome.attributes,
            degraded,
            summary: composed.summary,
        }
    }
}
