//! Client side of the handoff API.
//!
//! - [`HandoffClient`]: typed calls against the HTTP surface of `kyc-rpc`
//! - [`HandoffClient`] as a [`kyc_capture::HandoffBackend`], so the capture
//!   flow can run on a remote device
//! - [`StatusPoller`]: the initiating device's wait for a verdict

pub mod backend;
pub mod error;
pub mod http;
pub mod poller;

pub use error::ClientError;
pub use http::{HandoffClient, DEFAULT_REQUEST_TIMEOUT};
pub use poller::{PollConfig, PollOutcome, StatusPoller, StatusSource, DEFAULT_POLL_INTERVAL};
