//! JSON-lines host adapter.
//!
//! Each input line is a serialized [`Request`]. Each output line is a
//! [`ShimMessage`] tagged by `kind`: the response, a deferral marker telling
//! the host to finish the request itself, or an error for lines that could
//! not be parsed. Each message is flushed before the kernel's termination
//! hooks run, and the resulting [`Termination`] decides whether the loop
//! keeps reading.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::host::Termination;
use crate::http::{Deferral, Request, Response};
use crate::kernel::Kernel;
use crate::routing::Router;

const SHIM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shim");

/// Line written for each request.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShimMessage {
    /// The kernel produced a response for the host to send.
    Response {
        /// Response to send.
        response: Response,
    },
    /// The host should finish the request itself.
    Deferred {
        /// Why the kernel deferred.
        deferral: Deferral,
    },
    /// The input line was not a valid request.
    Error {
        /// Parse error description.
        message: String,
    },
}

/// Errors that stop the adapter loop.
#[derive(Debug, Error)]
pub enum ShimError {
    /// Reading input or writing output failed.
    #[error("shim I/O failed: {0}")]
    Io(#[from] io::Error),
    /// A message could not be serialized.
    #[error("failed to serialize shim message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The kernel could not bootstrap.
    #[error("kernel failed to bootstrap: {0}")]
    Bootstrap(#[source] Arc<BootstrapError>),
}

/// Counters describing a finished adapter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShimSummary {
    /// Requests answered with a kernel response.
    pub responded: usize,
    /// Requests deferred to the host.
    pub deferred: usize,
    /// Lines rejected as malformed.
    pub rejected: usize,
    /// Whether the loop stopped because the kernel asked the process to end.
    pub exited: bool,
}

/// Feeds JSON-line requests from `input` through `kernel`, writing one
/// message per line to `output`.
///
/// Blank lines are ignored. The loop ends at end of input or after the
/// first request whose termination asks the process to exit.
///
/// # Errors
///
/// Returns [`ShimError::Bootstrap`] when the kernel fails to start and
/// [`ShimError::Io`] or [`ShimError::Serialize`] when output cannot be
/// written.
pub fn serve_jsonl<R, I, O>(
    kernel: &Kernel<R>,
    input: I,
    mut output: O,
) -> Result<ShimSummary, ShimError>
where
    R: Router,
    I: BufRead,
    O: Write,
{
    let mut summary = ShimSummary::default();
    for line in input.lines() {
        let raw = line?;
        if raw.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(target: SHIM_TARGET, %error, "malformed request line");
                summary.rejected += 1;
                write_message(
                    &mut output,
                    &ShimMessage::Error {
                        message: error.to_string(),
                    },
                )?;
                continue;
            }
        };

        let response = kernel
            .handle(request.clone())
            .map_err(ShimError::Bootstrap)?;

        let message = match response.deferral() {
            Some(deferral) => {
                summary.deferred += 1;
                ShimMessage::Deferred {
                    deferral: deferral.clone(),
                }
            }
            None => {
                summary.responded += 1;
                ShimMessage::Response {
                    response: response.clone(),
                }
            }
        };
        write_message(&mut output, &message)?;
        output.flush()?;

        let termination = kernel.terminate(&request, &response);
        if termination == Termination::ExitProcess {
            summary.exited = true;
            break;
        }
    }
    output.flush()?;
    Ok(summary)
}

fn write_message<O: Write>(output: &mut O, message: &ShimMessage) -> Result<(), ShimError> {
    serde_json::to_writer(&mut *output, message)?;
    output.write_all(b"\n")?;
    Ok(())
}
