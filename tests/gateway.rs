//! Gateway and REST listeners served next to the RPC server.

mod common;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use multiserve::builder::partial::{service_builder, ServiceParts};
use multiserve::builder::RpcRegistration;
use multiserve::config::ServerSettings;
use multiserve::gateway::{registration, GatewayMux};
use multiserve::{GatewayOption, ServerKind, ServiceBuilder, WebService};

async fn serve(service: &WebService) -> tokio::task::JoinHandle<Result<(), multiserve::ServiceError>> {
    tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    })
}

async fn shutdown(service: WebService, running: tokio::task::JoinHandle<Result<(), multiserve::ServiceError>>) {
    service.stop(Duration::from_secs(5)).await.unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn gateway_on_fixed_ports() {
    let rpc_port = free_port();
    let rest_port = free_port();
    let service = ServiceBuilder::new()
        .listen_on(format!("127.0.0.1:{rpc_port}"))
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on(format!("127.0.0.1:{rest_port}"))
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();

    let ports = service.ports();
    assert_eq!(ports.len(), 2);
    assert_eq!((ports[0].kind, ports[0].port), (ServerKind::Rpc, rpc_port));
    assert_eq!((ports[1].kind, ports[1].port), (ServerKind::Rest, rest_port));

    let running = serve(&service).await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{rest_port}");

    // Path parameter.
    let reply: Value = http
        .get(format!("{base}/v1/echo/hello"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "hello");
    assert_eq!(reply["request_id"], "req-42");

    // Body fields are not overridden by the query string.
    let reply: Value = http
        .post(format!("{base}/v1/echo?message=from-query"))
        .json(&json!({ "message": "from-body" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "from-body");

    // Query fields fill what the body leaves out.
    let reply: Value = http
        .post(format!("{base}/v1/echo?message=from-query"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "from-query");

    // Health route is always mounted on the gateway.
    let health: Value = http
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "SERVING");

    shutdown(service, running).await;
}

#[tokio::test]
async fn gateway_streams_ndjson() {
    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on("127.0.0.1:0")
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();
    let running = serve(&service).await;
    let rest = &service.ports()[1].address;

    let response = http_client()
        .get(format!("http://{rest}/v1/count/3?message=tick"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/x-ndjson");
    let body = response.text().await.unwrap();
    let frames: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        frames,
        vec![
            json!({ "result": { "message": "tick 1" } }),
            json!({ "result": { "message": "tick 2" } }),
            json!({ "result": { "message": "tick 3" } }),
        ]
    );

    // Failing to open the stream is a plain error response.
    let response = http_client()
        .get(format!("http://{rest}/v1/count/many"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-rpc-status"], "InvalidArgument");

    shutdown(service, running).await;
}

#[tokio::test]
async fn gateway_error_handler_option() {
    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on("127.0.0.1:0")
        .add_gateway_options([GatewayOption::error_handler(|_status| {
            (StatusCode::IM_A_TEAPOT, "teapot").into_response()
        })])
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();
    let running = serve(&service).await;
    let rest = &service.ports()[1].address;
    let http = http_client();

    let response = http.get(format!("http://{rest}/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(response.text().await.unwrap(), "teapot");

    // Known path, wrong method.
    let response = http.delete(format!("http://{rest}/v1/echo")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    shutdown(service, running).await;
}

#[tokio::test]
async fn unmatched_gateway_path_is_not_found() {
    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on("127.0.0.1:0")
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();
    let running = serve(&service).await;
    let rest = &service.ports()[1].address;

    let response = http_client()
        .get(format!("http://{rest}/v2/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-rpc-status"], "NotFound");

    shutdown(service, running).await;
}

#[tokio::test]
async fn literal_handlers_win_over_the_gateway() {
    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on("127.0.0.1:0")
        .add_handler_fn("/v1/echo/literal", || async { "literal" })
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();
    let running = serve(&service).await;
    let rest = &service.ports()[1].address;
    let http = http_client();

    let body = http
        .get(format!("http://{rest}/v1/echo/literal"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "literal");

    let reply: Value = http
        .get(format!("http://{rest}/v1/echo/other"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "other");

    shutdown(service, running).await;
}

#[tokio::test]
async fn rest_parts_share_a_listener() {
    let listener = Arc::new(std::net::TcpListener::bind("127.0.0.1:0").unwrap());
    let address = listener.local_addr().unwrap();
    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .set_shared_listener(listener.clone())
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .add_rest_server()
        .set_shared_listener(listener)
        .add_handler_fn("/version", || async { "1.0" })
        .build_rest_part()
        .build()
        .unwrap();

    // Each REST config is listed, both on the shared port.
    let ports = service.ports();
    assert_eq!(ports.len(), 3);
    assert_eq!(ports[1].port, address.port());
    assert_eq!(ports[2].port, address.port());

    let running = serve(&service).await;
    let http = http_client();
    let version = http
        .get(format!("http://{address}/version"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(version, "1.0");
    let reply: Value = http
        .get(format!("http://{address}/v1/echo/shared"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "shared");

    shutdown(service, running).await;
}

#[tokio::test]
async fn two_gateways_on_one_listener_conflict() {
    let listener = Arc::new(std::net::TcpListener::bind("127.0.0.1:0").unwrap());
    let err = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .set_shared_listener(listener.clone())
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .add_rest_server()
        .set_shared_listener(listener)
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, multiserve::BuildError::ListenerConflict { .. }));
}

#[tokio::test]
async fn custom_gateway_mux_keeps_its_routes() {
    // Registered up front against an endpoint nothing listens on.
    let dead_endpoint = format!("127.0.0.1:{}", free_port());
    let mut mux = GatewayMux::default();
    mux.handle(axum::http::Method::GET, "/v1/stale", &dead_endpoint, ECHO_METHOD)
        .unwrap();

    let service = ServiceBuilder::new()
        .listen_on("127.0.0.1:0")
        .register_rpc_api(register_echo)
        .add_rest_server()
        .listen_on("127.0.0.1:0")
        .set_custom_gateway_mux(mux)
        .register_gateway_handler(|mux, endpoint| {
            mux.handle(axum::http::Method::PUT, "/v1/echo", endpoint, ECHO_METHOD)?;
            Ok(())
        })
        .build_rest_part()
        .build()
        .unwrap();
    let running = serve(&service).await;
    let rest = &service.ports()[1].address;
    let http = http_client();

    let reply: Value = http
        .put(format!("http://{rest}/v1/echo"))
        .json(&json!({ "message": "put" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "put");

    let response = http.get(format!("http://{rest}/v1/stale")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    shutdown(service, running).await;
}

#[tokio::test]
async fn default_listen_addresses() {
    let service = ServiceBuilder::new()
        .register_rpc_api(register_echo)
        .add_rest_server()
        .register_gateway_handler(register_echo_gateway)
        .build_rest_part()
        .build()
        .unwrap();

    let ports = service.ports();
    assert_eq!(ports.len(), 2);
    assert!(ports.iter().all(|info| info.port != 0));
    assert_ne!(ports[0].port, ports[1].port);
    assert!(service.rpc_address().ip().is_loopback());

    service.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn settings_wire_internal_health() {
    let internal_port = free_port();
    let external_port = free_port();
    let mut settings = ServerSettings::default();
    settings.rpc.address = Some("127.0.0.1:0".into());
    settings.rest.internal_port = Some(internal_port);
    settings.rest.external_port = Some(external_port);

    let parts = ServiceParts {
        rpc_apis: vec![Arc::new(register_echo) as RpcRegistration],
        gateway_handlers: vec![registration(register_echo_gateway)],
        ..Default::default()
    };
    let service = service_builder(&settings, parts).build().unwrap();
    assert_eq!(service.ports().len(), 3);

    let running = serve(&service).await;
    let http = http_client();

    let response = http
        .get(format!("http://127.0.0.1:{internal_port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "healthy\n");

    let reply: Value = http
        .get(format!("http://127.0.0.1:{external_port}/v1/echo/external"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["message"], "external");

    shutdown(service, running).await;
}
