//! Retry, backoff and secondary-endpoint failover for single HTTP requests.
//!
//! `RetryPolicy` wraps another `HttpSender` and turns one logical request into
//! up to `max_tries` attempts. Route selection, outcome classification and
//! backoff are pure functions so they can be tested without a transport.

mod classify;
mod policy;
mod run;

pub use classify::{classify_http_status, classify_transport_error, select_route, Route};
pub use policy::{ErrorKind, RetryDecision, RetryOptions, RetryPolicyType};
pub use run::RetryPolicy;
