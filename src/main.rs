//! Demo service.
//!
//! Serves `demo.Echo` over RPC, fronted by the gateway on the external REST
//! port, with health on the internal REST port. Runs until SIGINT/SIGTERM.
//!
//! ```text
//! POST /demo.Echo/Echo          {"message": "hi"}     (RPC)
//! GET  /v1/echo/{message}                             (gateway, unary)
//! GET  /v1/count/{times}?message=hi                   (gateway, server stream)
//! GET  /health                                        (internal port)
//! ```

use axum::http::Method;
use clap::Parser;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use multiserve::builder::partial::{service_builder, ServiceParts};
use multiserve::builder::RpcRegistration;
use multiserve::config::{load_config, ServerSettings};
use multiserve::gateway::{registration, GatewayMux};
use multiserve::lifecycle::{shutdown_signal, start};
use multiserve::observability::logging;
use multiserve::rpc::{RpcContext, RpcServer, Status};

#[derive(Parser, Debug)]
#[command(name = "multiserve", version, about = "Multi-listener web service demo")]
struct Args {
    /// Path to a TOML settings file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
struct EchoMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CountRequest {
    #[serde(default)]
    message: String,
    times: String,
}

fn register_echo(server: &mut RpcServer) {
    server.add_unary("demo.Echo", "Echo", |_ctx: RpcContext, req: EchoMessage| async move {
        Ok::<_, Status>(req)
    });
    server.add_server_streaming("demo.Echo", "Count", |_ctx: RpcContext, req: CountRequest| async move {
        let times: usize = req
            .times
            .parse()
            .map_err(|_| Status::invalid_argument(format!("times must be a number, got {:?}", req.times)))?;
        let message = req.message;
        Ok::<_, Status>(stream::iter((1..=times).map(move |i| {
            Ok::<_, Status>(EchoMessage {
                message: format!("{message} {i}"),
            })
        })))
    });
}

fn register_echo_gateway(mux: &mut GatewayMux, endpoint: &str) -> Result<(), multiserve::GatewayError> {
    mux.handle(Method::GET, "/v1/echo/{message}", endpoint, "/demo.Echo/Echo")?
        .handle(Method::POST, "/v1/echo", endpoint, "/demo.Echo/Echo")?
        .handle_server_stream(Method::GET, "/v1/count/{times}", endpoint, "/demo.Echo/Count")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerSettings::default(),
    };
    logging::init(&settings.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "multiserve starting"
    );

    let parts = ServiceParts {
        rpc_apis: vec![Arc::new(register_echo) as RpcRegistration],
        gateway_handlers: vec![registration(register_echo_gateway)],
        log: Some(logging::tracing_sink()),
        ..Default::default()
    };
    let service = service_builder(&settings, parts).build()?;
    let running = start(&service, settings.shutdown.timeout()).await?;

    tokio::select! {
        _ = shutdown_signal() => {}
        result = running => {
            // Serving ended on its own; surface why.
            result??;
        }
    }

    service.stop(settings.shutdown.timeout()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
