//! Stdio host adapter for the Lodger kernel.

use std::io;
use std::process::ExitCode;

use lodger::{
    Kernel, Response, Route, RouteParameters, RouteTable, install_fallback_telemetry, serve_jsonl,
};

const ADAPTER_TARGET: &str = "lodger::shim";

fn health(_: &lodger::Request, _: &RouteParameters) -> Result<Response, lodger::Failure> {
    Ok(Response::ok("ok").with_header("content-type", "text/plain; charset=utf-8"))
}

fn main() -> ExitCode {
    let routes = RouteTable::new().route(Route::get("/lodger/health", health));
    let kernel = match Kernel::builder(routes).build() {
        Ok(kernel) => kernel,
        Err(error) => {
            let _fallback = install_fallback_telemetry();
            tracing::error!(target: ADAPTER_TARGET, %error, "invalid middleware configuration");
            return ExitCode::FAILURE;
        }
    };

    // Configured telemetry is only installed by a successful bootstrap.
    if let Err(error) = kernel.bootstrap() {
        let _fallback = install_fallback_telemetry();
        tracing::error!(
            target: ADAPTER_TARGET,
            step = error.failed_step(),
            %error,
            "kernel failed to bootstrap"
        );
        return ExitCode::FAILURE;
    }

    match serve_jsonl(&kernel, io::stdin().lock(), io::stdout().lock()) {
        Ok(summary) => {
            tracing::info!(
                target: ADAPTER_TARGET,
                responded = summary.responded,
                deferred = summary.deferred,
                rejected = summary.rejected,
                exited = summary.exited,
                "adapter finished"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(target: ADAPTER_TARGET, %error, "adapter stopped");
            ExitCode::FAILURE
        }
    }
}
