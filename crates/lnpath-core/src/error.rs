use crate::state_machine::AttemptState;

/// Core errors shared by every lnpath crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid attempt state transition from {from} to {to}")]
    InvalidStateTransition {
        from: AttemptState,
        to: AttemptState,
    },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid millitokens amount: {0}")]
    InvalidAmount(String),

    #[error("invalid channel id: {0}")]
    InvalidChannelId(String),

    #[error("attempt already resolved")]
    AttemptAlreadyResolved,

    #[error("config io error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("logging init failed: {0}")]
    Logging(String),
}
