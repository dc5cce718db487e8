//! lnpath core: the leaf layer shared by routing and payments.
//!
//! - [`amount`]: exact-precision millitoken arithmetic and fee computation.
//! - [`ChannelId`]: the `BLOCKxINDEXxOUTPUT` channel id and its packed form.
//! - [`AttemptStateMachine`]: validated payment attempt transitions.
//! - [`EngineConfig`]: TOML configuration.

pub mod amount;
pub mod channel_id;
pub mod config;
pub mod error;
pub mod logging;
pub mod state_machine;

pub use amount::{fee_for_forward, mtokens_from_tokens, parse_mtokens, tokens_from_mtokens, Mtokens};
pub use channel_id::ChannelId;
pub use config::{EngineConfig, LoggingConfig, PaymentConfig, ProbeConfig, RoutingConfig};
pub use error::CoreError;
pub use state_machine::{AttemptEvent, AttemptState, AttemptStateMachine};
