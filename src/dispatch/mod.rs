//! The resilient request pipeline.
//!
//! Every API call goes through [`Dispatcher::execute`], which runs an ordered
//! pipeline for each attempt: attach authorization, send, classify the
//! response, then decide between returning, refreshing the account token and
//! replaying, waiting and retrying, or failing.
use crate::auth::{AuthorizationRecord, AuthorizeResponse, Authorizer};
use crate::error::{ErrorRepr, Result};
use crate::transport::{Transport, TransportClient};

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

mod classify;
pub use classify::{ApiFailure, FailureCategory, FailureKind, classify};

mod request;
pub use request::{ApiRequest, Endpoint};

mod retry;
pub use retry::{RetryDecision, RetryPolicy};

pub use crate::transport::{HttpRequest, HttpResponse};

/// What to do after one attempt.
#[derive(Debug)]
enum Next {
    Return(HttpResponse),
    RefreshAndReplay(ApiFailure),
    Retry(ApiFailure, Duration),
    Fail(ApiFailure),
}

/// Decide the next step from the response of attempt number `attempt`.
fn decide(
    resp: HttpResponse,
    req: &ApiRequest,
    attempt: u32,
    replayed: bool,
    policy: &RetryPolicy,
) -> Next {
    if resp.is_success() {
        return Next::Return(resp);
    }

    let failure = ApiFailure::from_response(&resp);
    if failure.kind == FailureKind::ExpiredAuthToken && req.needs_account_token() {
        return if replayed {
            Next::Fail(failure)
        } else {
            Next::RefreshAndReplay(failure)
        };
    }

    let decision = policy.should_retry(attempt, failure.status, req.endpoint, failure.retry_after);
    if decision.retry {
        Next::Retry(failure, decision.delay)
    } else {
        Next::Fail(failure)
    }
}

/// Executes logical API calls against the service.
///
/// The dispatcher keeps no state between calls besides what the
/// [`Authorizer`] caches.
pub struct Dispatcher {
    transport: TransportClient,
    authorizer: Authorizer,
    policy: RetryPolicy,
    auth_url: String,
}

impl Dispatcher {
    /// Create a new `Dispatcher`.
    pub fn new(
        transport: TransportClient,
        authorizer: Authorizer,
        policy: RetryPolicy,
        auth_url: String,
    ) -> Self {
        Self {
            transport,
            authorizer,
            policy,
            auth_url,
        }
    }

    /// The authorizer owning the account token.
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// The retry policy applied to every call.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Return a live account authorization, authorizing if needed.
    pub async fn authorization(&self) -> Result<Arc<AuthorizationRecord>> {
        self.authorizer.current(|| self.authorize_account()).await
    }

    /// Execute `req`, returning the first successful response.
    ///
    /// Rate limiting and unavailability are retried per the [`RetryPolicy`].
    /// An expired account token is refreshed and the request replayed once.
    /// Any other failure is returned classified.
    pub async fn execute(&self, req: ApiRequest) -> Result<HttpResponse> {
        let mut attempt = 1;
        let mut replayed = false;

        loop {
            let record = if req.needs_account_token() {
                Some(self.authorization().await?)
            } else {
                None
            };
            let http = req
                .resolve(record.as_deref())
                .ok_or(ErrorRepr::Missing("ApiRequest", "authorization"))?;

            trace!(endpoint = %req.endpoint, attempt, url = %http.url, "sending request");
            let resp = self
                .transport
                .send(http)
                .await
                .map_err(|e| e.with_endpoint(req.endpoint))?;

            match decide(resp, &req, attempt, replayed, &self.policy) {
                Next::Return(resp) => {
                    trace!(endpoint = %req.endpoint, attempt, status = resp.status, "request succeeded");
                    return Ok(resp);
                }
                Next::RefreshAndReplay(failure) => {
                    debug!(endpoint = %req.endpoint, %failure, "account token expired, refreshing");
                    replayed = true;
                    if let Some(record) = record {
                        self.authorizer
                            .refresh(&record.authorization_token, || self.authorize_account())
                            .await?;
                    }
                }
                Next::Retry(failure, delay) => {
                    warn!(
                        endpoint = %req.endpoint,
                        attempt,
                        ?delay,
                        %failure,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Next::Fail(failure) => {
                    debug!(endpoint = %req.endpoint, attempt, %failure, "request failed");
                    return Err(failure.into());
                }
            }
        }
    }

    /// Execute `req` and decode the JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T> {
        let endpoint = req.endpoint;
        let resp = self.execute(req).await?;
        decode(endpoint, &resp)
    }

    /// Run the authorization exchange.
    ///
    /// This is a single attempt: the exchange is never retried and its failure
    /// is reported unchanged.
    async fn authorize_account(&self) -> Result<AuthorizationRecord> {
        let req =
            ApiRequest::authorize_account(&self.auth_url, self.authorizer.credentials().basic());
        let http = req
            .resolve(None)
            .ok_or(ErrorRepr::Missing("ApiRequest", "credentials"))?;

        let resp = self
            .transport
            .send(http)
            .await
            .map_err(|e| e.with_endpoint(Endpoint::AuthorizeAccount))?;
        if !resp.is_success() {
            let failure = ApiFailure::from_response(&resp);
            warn!(%failure, "authorization failed");
            return Err(failure.into());
        }

        let body: AuthorizeResponse = decode(Endpoint::AuthorizeAccount, &resp)?;
        Ok(AuthorizationRecord::from_response(body, Utc::now()))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport)
            .field("authorizer", &self.authorizer)
            .field("policy", &self.policy)
            .field("auth_url", &self.auth_url)
            .finish()
    }
}

pub(crate) fn decode<T: DeserializeOwned>(endpoint: Endpoint, resp: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&resp.body)
        .map_err(|source| ErrorRepr::Decode { endpoint, source }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn failure_response(status: u16, code: &str) -> HttpResponse {
        let body = json!({ "status": status, "code": code, "message": "m" });
        HttpResponse::new(status, vec![], Bytes::from(body.to_string()))
    }

    fn api_request() -> ApiRequest {
        ApiRequest::api(Endpoint::FinishLargeFile, &json!({}))
    }

    #[test]
    fn success_returns() {
        let resp = HttpResponse::json(&json!({"ok": true}));
        let next = decide(resp, &api_request(), 1, false, &RetryPolicy::default());
        assert!(matches!(next, Next::Return(_)));
    }

    #[test]
    fn expired_token_replays_once() {
        let req = api_request();
        let policy = RetryPolicy::default();
        let first = decide(failure_response(401, "expired_auth_token"), &req, 1, false, &policy);
        assert!(matches!(first, Next::RefreshAndReplay(_)));
        let second = decide(failure_response(401, "expired_auth_token"), &req, 1, true, &policy);
        assert!(matches!(second, Next::Fail(f) if f.kind == FailureKind::ExpiredAuthToken));
    }

    #[test]
    fn expired_capability_token_is_not_refreshed() {
        let req = ApiRequest::capability(Endpoint::UploadPart, "https://pod/upload", "cap");
        let next = decide(
            failure_response(401, "expired_auth_token"),
            &req,
            1,
            false,
            &RetryPolicy::default(),
        );
        assert!(matches!(next, Next::Fail(_)));
    }

    #[test]
    fn unavailable_is_retried() {
        let next = decide(
            failure_response(503, "service_unavailable"),
            &api_request(),
            1,
            false,
            &RetryPolicy::default(),
        );
        assert!(matches!(next, Next::Retry(_, d) if d == Duration::from_secs(2)));
    }

    #[test]
    fn not_found_fails() {
        let next = decide(
            failure_response(404, "not_found"),
            &api_request(),
            1,
            false,
            &RetryPolicy::default(),
        );
        assert!(matches!(next, Next::Fail(f) if f.code == "not_found"));
    }
}
