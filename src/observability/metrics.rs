//! Metrics collection.
//!
//! # Metrics
//! - `rpc_requests_total` (counter): finished RPC calls by method, code
//! - `rpc_panics_recovered_total` (counter): handler panics turned into a status, by method
//! - `gateway_requests_total` (counter): HTTP requests forwarded by the gateway, by route, status
//!
//! # Design Decisions
//! - Facade only; exposition is left to whoever installs a recorder
//! - Labels are method paths and route templates, never raw request paths

use metrics::counter;

use crate::rpc::status::Code;

pub fn record_rpc(method: &str, code: Code) {
    counter!(
        "rpc_requests_total",
        "method" => method.to_string(),
        "code" => code.as_str()
    )
    .increment(1);
}

pub fn record_panic_recovered(method: &str) {
    counter!("rpc_panics_recovered_total", "method" => method.to_string()).increment(1);
}

pub fn record_gateway_request(route: &str, status: u16) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
