//! Route selection and outcome classification.

use crate::http::{Method, TransportError};

use super::policy::{ErrorKind, RetryOptions};

/// Endpoint an attempt is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Secondary,
}

/// Picks the endpoint for attempt `attempt` (1-based). The secondary is used
/// only for read-only methods, on even attempts, while it has not answered 404
/// for this request.
pub fn select_route(
    options: &RetryOptions,
    method: Method,
    secondary_has_404: bool,
    attempt: u32,
) -> Route {
    let use_secondary = options.secondary_host.is_some()
        && method.is_read_only()
        && !secondary_has_404
        && attempt % 2 == 0;
    if use_secondary {
        Route::Secondary
    } else {
        Route::Primary
    }
}

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        503 => ErrorKind::Throttled,
        500 => ErrorKind::Http5xx(code),
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Other,
    }
}

/// Classify a transport failure for retry decisions.
pub fn classify_transport_error(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Timeout(_) => ErrorKind::Timeout,
        TransportError::Curl(ce) => {
            if ce.is_operation_timedout() {
                ErrorKind::Timeout
            } else if ce.is_couldnt_connect()
                || ce.is_couldnt_resolve_host()
                || ce.is_couldnt_resolve_proxy()
                || ce.is_read_error()
                || ce.is_recv_error()
                || ce.is_send_error()
                || ce.is_got_nothing()
            {
                ErrorKind::Connection
            } else {
                ErrorKind::Other
            }
        }
        TransportError::InvalidRequest(_) | TransportError::Worker(_) => ErrorKind::Other,
    }
}
