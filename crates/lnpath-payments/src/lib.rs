//! lnpath payments: executing and probing routes against a remote node.
//!
//! Provides the failure classifier that turns raw node responses into typed
//! outcomes, the retrying [`PaymentExecutor`], the [`Prober`], the async
//! traits a node backend implements, and a scripted in-memory backend.

pub mod adapters;
pub mod error;
pub mod events;
pub mod executor;
pub mod failure;
pub mod prober;
pub mod traits;
pub mod types;

pub use error::{PaymentError, ProbeError, RpcError, UpdateDecodeError};
pub use events::{CancelHandle, PaymentEvent, PaymentSubscription, ProbeEvent, ProbeSubscription, Subscription};
pub use executor::PaymentExecutor;
pub use failure::{
    classify_failure, decode_response, decode_response_with, ChannelUpdate, FailureCode, FailureDetail,
    FailureGroup, PreimageCheck,
};
pub use prober::{ProbeReport, ProbeRequest, Prober};
pub use traits::{ChannelGraphSource, PaymentRpc, WalletInfo};
pub use types::{
    AttemptFailure, AttemptOutcome, AttemptStatus, PayViaRouteRequest, PayViaRoutesRequest,
    PaymentAttempt, PaymentId, PaymentSuccess, Preimage, RawFailure, RawPayResponse,
    WalletInfoSnapshot,
};
