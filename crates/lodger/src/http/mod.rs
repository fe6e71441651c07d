//! Normalized request and response values exchanged with the host adapter.
//!
//! The host adapter builds a [`Request`] from whatever the host runtime
//! exposes and translates the returned [`Response`] back into the host's
//! output mechanism. A host-owned response (see [`Response::is_host_owned`])
//! tells the adapter to write nothing and let the host continue its own
//! dispatch.

mod headers;
mod method;
mod request;
mod response;

pub use headers::Headers;
pub use method::{Method, MethodParseError};
pub use request::{METHOD_OVERRIDE_FIELD, METHOD_OVERRIDE_HEADER, Parameters, Request};
pub use response::{Deferral, Response};
