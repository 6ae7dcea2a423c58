//! Transport seam between the client and the queue service.
//!
//! The client speaks to the service only through [`Transport`]. Two
//! implementations ship with the crate:
//!
//! - [`HttpTransport`]: signed form-encoded POSTs over HTTP(S) via `reqwest`
//! - [`InMemoryService`]: an in-process service emulation speaking the same
//!   JSON protocol, used for tests and local development

use crate::error::CmqError;
use crate::request::Request;
use async_trait::async_trait;

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{Fault, InMemoryService, Subscription};

/// Status and body of one service exchange, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends one logical request and returns the undecoded response
///
/// Implementations must be safe to call concurrently from many tasks and must
/// treat every call independently, so a request can be re-sent on retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange
    ///
    /// # Errors
    ///
    /// Returns [`CmqError::Transport`] when no response could be obtained.
    async fn call(&self, request: &Request) -> Result<RawResponse, CmqError>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}
