pub mod config;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod pricing;

pub use config::{
    AgentConfig, AppConfig, ConfigError, ConfigOverrides, LlmConfig, LlmProvider, LoadOptions,
    LogFormat, LoggingConfig,
};
pub use domain::quote::{Quote, QuoteLine};
pub use domain::request::{RequestAttributes, ServiceType, UrgencyLevel};
pub use domain::turn::{InvocationRecord, Turn, TurnRole};
pub use errors::{DispatchError, RegistryError};
pub use memory::{ConversationMemory, Session};
pub use pricing::{DeterministicPricingEngine, PricingEngine, PricingTable};
