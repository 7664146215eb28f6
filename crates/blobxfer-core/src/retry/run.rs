//! Retry loop: send one logical request until success or the policy says stop.

use async_trait::async_trait;

use crate::http::{HttpRequest, HttpResponse, HttpSender, TransportError};
use crate::url_model::set_url_host;

use super::classify::{classify_http_status, classify_transport_error, select_route, Route};
use super::policy::{ErrorKind, RetryDecision, RetryOptions};

/// `HttpSender` that retries the wrapped sender according to `RetryOptions`.
///
/// Each attempt works on a fresh clone of the caller's request, so a host
/// rewrite for the secondary endpoint never leaks into later attempts. Only one
/// attempt is in flight at a time.
#[derive(Debug, Clone)]
pub struct RetryPolicy<S> {
    inner: S,
    options: RetryOptions,
}

impl<S> RetryPolicy<S> {
    pub fn new(inner: S, options: RetryOptions) -> Self {
        Self {
            inner,
            options: options.normalized(),
        }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }
}

impl<S: HttpSender> RetryPolicy<S> {
    async fn attempt(
        &self,
        request: &HttpRequest,
        route: Route,
    ) -> Result<HttpResponse, TransportError> {
        let mut attempt_request = request.clone();
        if route == Route::Secondary {
            if let Some(host) = self.options.secondary_host.as_deref() {
                attempt_request.url = set_url_host(&request.url, host).map_err(|e| {
                    TransportError::InvalidRequest(format!("secondary host {host}: {e}"))
                })?;
            }
        }

        let try_timeout = self.options.try_timeout;
        match tokio::time::timeout(try_timeout, self.inner.send(attempt_request)).await {
            Ok(outcome) => outcome,
            // The slow response is dropped; the attempt counts as timed out.
            Err(_) => Err(TransportError::Timeout(try_timeout)),
        }
    }
}

#[async_trait]
impl<S: HttpSender> HttpSender for RetryPolicy<S> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut secondary_has_404 = false;
        let mut attempt = 1u32;
        loop {
            let route = select_route(&self.options, request.method, secondary_has_404, attempt);
            let outcome = self.attempt(&request, route).await;
            let kind = match &outcome {
                Ok(resp) => classify_http_status(resp.status),
                Err(e) => classify_transport_error(e),
            };

            match self.options.decide(attempt, route, kind) {
                RetryDecision::NoRetry => {
                    if attempt > 1 {
                        tracing::debug!(
                            method = request.method.as_str(),
                            attempt,
                            ?kind,
                            "retry loop finished"
                        );
                    }
                    return outcome;
                }
                RetryDecision::RetryAfter(delay) => {
                    if route == Route::Secondary && kind == ErrorKind::NotFound {
                        secondary_has_404 = true;
                    }
                    tracing::warn!(
                        method = request.method.as_str(),
                        url = %request.url.path(),
                        attempt,
                        ?route,
                        ?kind,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
