//! The middleware capability.

use crate::exceptions::Failure;
use crate::http::{Request, Response};

use super::Next;

/// Request transformer or guard that sits in front of the router.
pub trait Middleware: Send + Sync {
    /// Handles `request`, usually by forwarding it through `next`.
    ///
    /// Returning without running `next` short-circuits the pipeline.
    /// `parameters` holds the arguments parsed from `name:arg1,arg2`.
    ///
    /// # Errors
    ///
    /// Returns any failure raised by this middleware or by the rest of the
    /// pipeline.
    fn process(
        &self,
        request: Request,
        next: Next<'_>,
        parameters: &[String],
    ) -> Result<Response, Failure>;

    /// Runs after the response has been produced and was not deferred to
    /// the host.
    fn terminate(&self, request: &Request, response: &Response) {
        let _ = (request, response);
    }
}
