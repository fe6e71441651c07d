//! Outbound response value.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Headers, Method};
use crate::exceptions::Failure;

/// Reason a response was handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Deferral {
    /// The router knows no route for the path.
    NoRoute,
    /// The path exists but not for the request method.
    MethodNotAllowed {
        /// Methods the path does accept.
        allowed: BTreeSet<Method>,
    },
    /// Application code raised a not-found failure.
    NotFoundFailure,
}

/// Response produced by the kernel.
///
/// Two flags travel alongside the status, headers and body: the failure
/// that produced the response, if any, and the deferral marker that hands
/// the request back to the host. A deferred response keeps its default
/// status and empty body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    status: u16,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: String,
    #[serde(skip)]
    exception: Option<Arc<Failure>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deferral: Option<Deferral>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200, String::new())
    }
}

impl Response {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
            exception: None,
            deferral: None,
        }
    }

    /// `200 OK` with the given body.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Empty response that tells the host to finish the request itself.
    #[must_use]
    pub fn defer_to_host(reason: Deferral) -> Self {
        Self {
            deferral: Some(reason),
            ..Self::default()
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches the failure that produced this response.
    #[must_use]
    pub fn with_exception(mut self, failure: Arc<Failure>) -> Self {
        self.exception = Some(failure);
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &str {
        self.body.as_str()
    }

    /// Failure attached by error handling, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<&Arc<Failure>> {
        self.exception.as_ref()
    }

    /// Detaches the failure, leaving the response otherwise intact.
    pub const fn take_exception(&mut self) -> Option<Arc<Failure>> {
        self.exception.take()
    }

    /// Why the response was deferred, when it was.
    #[must_use]
    pub const fn deferral(&self) -> Option<&Deferral> {
        self.deferral.as_ref()
    }

    /// Returns `true` when the host runtime must finish the request.
    #[must_use]
    pub const fn is_host_owned(&self) -> bool {
        self.deferral.is_some()
    }
}
