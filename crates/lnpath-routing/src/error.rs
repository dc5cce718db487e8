use lnpath_core::ChannelId;

/// Errors that can occur while building routes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("hop {index} is missing required field {field}")]
    MissingHopField { index: usize, field: &'static str },

    #[error("route has no hops")]
    EmptyRoute,

    #[error("channel {channel} does not connect to {expected}")]
    DisconnectedChannel { channel: ChannelId, expected: String },

    #[error("channel {channel} has no policy for {public_key}")]
    MissingPolicy {
        channel: ChannelId,
        public_key: String,
    },

    #[error("timeout height overflow at hop {index}")]
    TimeoutOverflow { index: usize },

    #[error("amount overflow at hop {index}")]
    AmountOverflow { index: usize },
}
