use thiserror::Error;

/// Registry misconfiguration. Surfaced during startup validation; a request
/// should never observe one against a validated registry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no capability registered for `{0}`")]
    MissingCapability(String),
    #[error("capability `{0}` registered more than once")]
    DuplicateCapability(String),
    #[error("unknown capability `{0}` requested")]
    UnknownCapability(String),
}

/// Request-time errors surfaced to the external caller. Everything else is
/// absorbed into a degraded-but-valid reply.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown session `{0}`: a followup requires an existing session")]
    UnknownSession(String),
}
