//! Gateway multiplexer: route table and request forwarding.

use axum::{
    body::Body,
    extract::{Query, Request},
    http::{uri::Authority, HeaderMap, HeaderName, Method},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{ErrorHandler, GatewayError, GatewayOption, HeaderMatcher, PathTemplate};
use crate::observability::metrics;
use crate::rpc::client::RpcClient;
use crate::rpc::interceptor::X_REQUEST_ID;
use crate::rpc::server::ndjson_response;
use crate::rpc::status::Status;

/// Upper bound on a forwarded request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Unary,
    ServerStreaming,
}

struct GatewayRoute {
    method: Method,
    template: PathTemplate,
    rpc_method: String,
    kind: CallKind,
    client: RpcClient,
}

enum Lookup<'a> {
    Found(&'a GatewayRoute, Vec<(String, String)>),
    MethodNotAllowed,
    NotFound,
}

/// Maps HTTP routes onto RPC methods.
#[derive(Clone)]
pub struct GatewayMux {
    routes: Vec<Arc<GatewayRoute>>,
    clients: HashMap<String, RpcClient>,
    error_handler: ErrorHandler,
    header_matcher: HeaderMatcher,
}

impl Default for GatewayMux {
    fn default() -> Self {
        Self::new([])
    }
}

impl GatewayMux {
    pub fn new(options: impl IntoIterator<Item = GatewayOption>) -> Self {
        let mut mux = Self {
            routes: Vec::new(),
            clients: HashMap::new(),
            error_handler: Arc::new(default_error_handler),
            header_matcher: Arc::new(default_header_matcher),
        };
        mux.apply_options(options);
        mux
    }

    /// Apply options to an existing mux, e.g. a custom one handed to the builder.
    pub fn apply_options(&mut self, options: impl IntoIterator<Item = GatewayOption>) {
        for option in options {
            match option {
                GatewayOption::ErrorHandler(handler) => self.error_handler = handler,
                GatewayOption::HeaderMatcher(matcher) => self.header_matcher = matcher,
            }
        }
    }

    /// Map `method template` to the unary RPC `rpc_method` served at `endpoint`.
    pub fn handle(
        &mut self,
        method: Method,
        template: &str,
        endpoint: &str,
        rpc_method: &str,
    ) -> Result<&mut Self, GatewayError> {
        self.insert(method, template, endpoint, rpc_method, CallKind::Unary)
    }

    /// Map `method template` to a server-streaming RPC method.
    pub fn handle_server_stream(
        &mut self,
        method: Method,
        template: &str,
        endpoint: &str,
        rpc_method: &str,
    ) -> Result<&mut Self, GatewayError> {
        self.insert(method, template, endpoint, rpc_method, CallKind::ServerStreaming)
    }

    /// Whether a route with this method and template shape exists.
    pub fn has_route(&self, method: &Method, template: &str) -> bool {
        PathTemplate::parse(template)
            .map(|t| self.routes.iter().any(|r| r.method == *method && r.template.same_shape(&t)))
            .unwrap_or(false)
    }

    /// Registered routes as `(method, template, rpc method)`.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str, &str)> {
        self.routes
            .iter()
            .map(|r| (&r.method, r.template.as_str(), r.rpc_method.as_str()))
    }

    fn insert(
        &mut self,
        method: Method,
        template: &str,
        endpoint: &str,
        rpc_method: &str,
        kind: CallKind,
    ) -> Result<&mut Self, GatewayError> {
        let parsed = PathTemplate::parse(template).map_err(|e| GatewayError::InvalidTemplate {
            template: template.to_string(),
            reason: e.to_string(),
        })?;
        if !is_rpc_method(rpc_method) {
            return Err(GatewayError::InvalidMethod(rpc_method.to_string()));
        }
        if self
            .routes
            .iter()
            .any(|r| r.method == method && r.template.same_shape(&parsed))
        {
            return Err(GatewayError::DuplicateRoute {
                method: method.to_string(),
                template: template.to_string(),
            });
        }

        let client = self.client_for(endpoint)?;
        tracing::debug!(
            method = %method,
            template = %template,
            rpc_method = %rpc_method,
            endpoint = %endpoint,
            "Gateway route registered"
        );
        self.routes.push(Arc::new(GatewayRoute {
            method,
            template: parsed,
            rpc_method: rpc_method.to_string(),
            kind,
            client,
        }));
        Ok(self)
    }

    fn client_for(&mut self, endpoint: &str) -> Result<RpcClient, GatewayError> {
        let authority = endpoint.strip_prefix("http://").unwrap_or(endpoint);
        if authority.is_empty() || authority.parse::<Authority>().is_err() {
            return Err(GatewayError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(self
            .clients
            .entry(authority.to_string())
            .or_insert_with(|| RpcClient::new(authority))
            .clone())
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let mut best: Option<(&GatewayRoute, Vec<(String, String)>)> = None;
        let mut path_matched = false;
        for route in self.routes.iter().map(Arc::as_ref) {
            let Some(captures) = route.template.matches(path) else {
                continue;
            };
            path_matched = true;
            if route.method != *method {
                continue;
            }
            // Ties keep the earlier registration.
            let better = best
                .as_ref()
                .map_or(true, |(b, _)| route.template.specificity() > b.template.specificity());
            if better {
                best = Some((route, captures));
            }
        }
        match best {
            Some((route, captures)) => Lookup::Found(route, captures),
            None if path_matched => Lookup::MethodNotAllowed,
            None => Lookup::NotFound,
        }
    }

    /// Serve one HTTP request.
    pub async fn serve(&self, request: Request) -> Response {
        let path = request.uri().path().to_string();
        let (route, captures) = match self.lookup(request.method(), &path) {
            Lookup::Found(route, captures) => (route, captures),
            Lookup::MethodNotAllowed => {
                let response = (self.error_handler)(Status::unimplemented("Method Not Allowed"));
                metrics::record_gateway_request("unmatched", response.status().as_u16());
                return response;
            }
            Lookup::NotFound => {
                let response = (self.error_handler)(Status::not_found("Not Found"));
                metrics::record_gateway_request("unmatched", response.status().as_u16());
                return response;
            }
        };

        let (parts, body) = request.into_parts();
        let metadata = forwarded_metadata(&parts.headers, &self.header_matcher);
        let message = match read_message(body, &parts.uri, captures).await {
            Ok(message) => message,
            Err(status) => return self.finish(route, Err(status)),
        };

        tracing::debug!(
            rpc_method = %route.rpc_method,
            path = %path,
            request_id = metadata.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()).unwrap_or("unknown"),
            "Forwarding gateway request"
        );

        let result = match route.kind {
            CallKind::Unary => route
                .client
                .call_value(&route.rpc_method, &metadata, message)
                .await
                .map(|value| Json(value).into_response()),
            CallKind::ServerStreaming => route
                .client
                .server_stream_value(&route.rpc_method, &metadata, message)
                .await
                .map(ndjson_response),
        };
        self.finish(route, result)
    }

    fn finish(&self, route: &GatewayRoute, result: Result<Response, Status>) -> Response {
        let response = match result {
            Ok(response) => response,
            Err(status) => {
                tracing::debug!(
                    rpc_method = %route.rpc_method,
                    code = %status.code,
                    message = %status.message,
                    "Gateway call failed"
                );
                (self.error_handler)(status)
            }
        };
        metrics::record_gateway_request(route.template.as_str(), response.status().as_u16());
        response
    }

    /// Router answering every request through this mux.
    pub fn into_router(self) -> Router {
        let mux = Arc::new(self);
        Router::new().fallback(move |request: Request| {
            let mux = mux.clone();
            async move { mux.serve(request).await }
        })
    }
}

/// Status rendered as JSON with the mapped HTTP status.
pub fn default_error_handler(status: Status) -> Response {
    status.into_response()
}

/// Forward everything except transport-level headers.
pub fn default_header_matcher(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "host"
            | "connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
            | "content-type"
            | "accept-encoding"
    )
}

fn is_rpc_method(path: &str) -> bool {
    path.strip_prefix('/')
        .and_then(|p| p.split_once('/'))
        .is_some_and(|(service, method)| !service.is_empty() && !method.is_empty() && !method.contains('/'))
}

fn forwarded_metadata(headers: &HeaderMap, matcher: &HeaderMatcher) -> HeaderMap {
    let mut metadata = HeaderMap::new();
    for (name, value) in headers {
        if name.as_str() == X_REQUEST_ID || matcher(name) {
            metadata.append(name.clone(), value.clone());
        }
    }
    metadata
}

async fn read_message(
    body: Body,
    uri: &axum::http::Uri,
    captures: Vec<(String, String)>,
) -> Result<Value, Status> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Status::invalid_argument(format!("reading request body failed: {e}")))?;
    let query = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .map_err(|e| Status::invalid_argument(format!("malformed query string: {e}")))?;
    build_message(&bytes, query, captures)
}

/// Body fields win over query parameters; path parameters win over both.
fn build_message(
    body: &[u8],
    query: Vec<(String, String)>,
    path: Vec<(String, String)>,
) -> Result<Value, Status> {
    let mut message = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(body)
            .map_err(|e| Status::invalid_argument(format!("request body is not JSON: {e}")))?
    };
    if query.is_empty() && path.is_empty() {
        return Ok(message);
    }
    let Value::Object(fields) = &mut message else {
        return Err(Status::invalid_argument(
            "request body must be a JSON object when the route binds parameters",
        ));
    };

    let mut query_fields: Vec<(String, Value)> = Vec::new();
    for (key, value) in query {
        match query_fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, Value::Array(values))) => values.push(Value::String(value)),
            Some((_, existing)) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => query_fields.push((key, Value::String(value))),
        }
    }
    for (key, value) in query_fields {
        set_field(fields, &key, value, false)?;
    }
    for (key, value) in path {
        set_field(fields, &key, Value::String(value), true)?;
    }
    Ok(message)
}

/// Set a possibly dotted field path, creating nested objects as needed.
fn set_field(target: &mut Map<String, Value>, key: &str, value: Value, overwrite: bool) -> Result<(), Status> {
    match key.split_once('.') {
        None => {
            if overwrite || !target.contains_key(key) {
                target.insert(key.to_string(), value);
            }
            Ok(())
        }
        Some((head, tail)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(inner) => set_field(inner, tail, value, overwrite),
                _ => Err(Status::invalid_argument(format!("field {head:?} is not a message"))),
            }
        }
    }
}
