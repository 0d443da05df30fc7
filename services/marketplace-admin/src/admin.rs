//! Admin HTTP API for the marketplace account and license key
//!
//! Endpoints:
//! - POST   /account                   create account, store issued license key
//! - GET    /license-key               whether a license key is configured
//! - PUT    /license-key               validate and store a license key
//! - DELETE /license-key               remove the stored license key
//! - POST   /plugins/{name}/free-trial start a plugin free trial
//!
//! A caller is a superuser when it presents `Authorization: Bearer <admin token>`.
//! Privilege is resolved per request and handed to the orchestrator as its
//! `AccessGuard`, so the orchestrator's own checks stay authoritative.
//! Request bodies are only inspected after the caller is known to be
//! privileged.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use marketplace_api::{
    AccessGuard, Error, ErrorKind, MarketplaceApi, Operation, StaticAccess, TransportErrorKind,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::metrics;

/// Error code for a request body that is not the expected JSON shape.
const INVALID_BODY: &str = "InvalidRequestBody";

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    api: MarketplaceApi,
    admin_token: Option<Arc<Secret<String>>>,
}

impl AdminState {
    pub fn new(api: MarketplaceApi, admin_token: Option<Secret<String>>) -> Self {
        Self {
            api,
            admin_token: admin_token.map(Arc::new),
        }
    }

    /// Privilege of the caller presenting these headers.
    fn caller(&self, headers: &HeaderMap) -> StaticAccess {
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let elevated = match (&self.admin_token, presented) {
            (Some(token), Some(candidate)) => token.matches(candidate),
            _ => false,
        };
        StaticAccess::from_elevated(elevated)
    }

    /// Orchestrator bound to this request's caller.
    fn api_for(&self, headers: &HeaderMap) -> MarketplaceApi {
        self.api.with_access(Arc::new(self.caller(headers)))
    }
}

/// Build the admin router with all account and license endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/account", post(create_account))
        .route(
            "/license-key",
            get(license_key_status)
                .put(save_license_key)
                .delete(delete_license_key),
        )
        .route("/plugins/{name}/free-trial", post(start_free_trial))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateAccountRequest {
    email: String,
}

#[derive(Deserialize)]
struct SaveLicenseKeyRequest {
    license_key: String,
}

/// Unwrap a JSON body only once the caller is known to be privileged, so an
/// unprivileged caller is refused with 403 whatever it sent.
fn request_body<T>(
    operation: Operation,
    started: Instant,
    caller: StaticAccess,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, Response> {
    if let Err(err) = caller.require_elevated_privilege() {
        return Err(respond(operation, started, Err(err)));
    }
    body.map(|Json(body)| body).map_err(|rejection| {
        let message = rejection.body_text();
        metrics::record_operation(operation, INVALID_BODY, started.elapsed().as_secs_f64());
        info!(%operation, code = INVALID_BODY, error = %message, "operation refused");
        json(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": INVALID_BODY, "message": message }),
        )
    })
}

/// POST /account
async fn create_account(
    State(state): State<AdminState>,
    headers: HeaderMap,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let caller = state.caller(&headers);
    let body = match request_body(Operation::CreateAccount, started, caller, body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let result = state
        .api
        .with_access(Arc::new(caller))
        .create_account(&body.email)
        .await;
    respond(Operation::CreateAccount, started, result.map(|()| created()))
}

/// GET /license-key. Never exposes the key itself.
async fn license_key_status(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let result = state.api_for(&headers).license_key_configured().await;
    respond(
        Operation::LicenseStatus,
        started,
        result.map(|configured| json(StatusCode::OK, serde_json::json!({ "configured": configured }))),
    )
}

/// PUT /license-key
async fn save_license_key(
    State(state): State<AdminState>,
    headers: HeaderMap,
    body: Result<Json<SaveLicenseKeyRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let caller = state.caller(&headers);
    let body = match request_body(Operation::SaveLicenseKey, started, caller, body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let license_key = Secret::new(body.license_key);
    let result = state
        .api
        .with_access(Arc::new(caller))
        .save_license_key(license_key.expose())
        .await;
    respond(Operation::SaveLicenseKey, started, result.map(|()| success()))
}

/// DELETE /license-key (idempotent)
async fn delete_license_key(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let result = state.api_for(&headers).delete_license_key().await;
    respond(Operation::DeleteLicenseKey, started, result.map(|()| success()))
}

/// POST /plugins/{name}/free-trial
async fn start_free_trial(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let started = Instant::now();
    let result = state.api_for(&headers).start_free_trial(&name).await;
    respond(Operation::StartFreeTrial, started, result.map(|()| created()))
}

fn respond(operation: Operation, started: Instant, result: Result<Response, Error>) -> Response {
    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(response) => {
            metrics::record_operation(operation, "success", elapsed);
            response
        }
        Err(err) => {
            metrics::record_operation(operation, err.code(), elapsed);
            error_response(operation, &err)
        }
    }
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn success() -> Response {
    json(StatusCode::OK, serde_json::json!({ "success": true }))
}

fn created() -> Response {
    json(StatusCode::CREATED, serde_json::json!({ "success": true }))
}

/// HTTP status for each error kind.
fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
        ErrorKind::RemoteRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::UnexpectedResponse => StatusCode::BAD_GATEWAY,
        ErrorKind::Connectivity => match err {
            Error::Connectivity(e) if e.kind == TransportErrorKind::Timeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::BAD_GATEWAY,
        },
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(operation: Operation, err: &Error) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        warn!(%operation, code = err.code(), error = %err, "operation failed");
    } else {
        info!(%operation, code = err.code(), "operation refused");
    }

    let mut body = serde_json::json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    if let Some(remote) = err.remote_message() {
        body["remote_message"] = serde_json::Value::String(remote.to_string());
    }
    json(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use marketplace_api::{
        AllowedDomains, BoxFuture, LicenseKeyStore, MemoryLicenseKeyStore, RawResponse, Transport,
        TransportError, TransportRequest,
    };
    use std::sync::Mutex;
    use tower::ServiceExt;

    const TOKEN: &str = "admin-secret";

    /// Marketplace stub answering every request with one canned reply.
    struct StubTransport {
        reply: std::result::Result<RawResponse, TransportError>,
        actions: Mutex<Vec<String>>,
    }

    impl Transport for StubTransport {
        fn download<'a>(
            &'a self,
            request: &'a TransportRequest,
        ) -> BoxFuture<'a, std::result::Result<RawResponse, TransportError>> {
            self.actions.lock().unwrap().push(request.action.clone());
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<MemoryLicenseKeyStore>,
        transport: Arc<StubTransport>,
    }

    fn test_app(
        reply: std::result::Result<RawResponse, TransportError>,
        store: MemoryLicenseKeyStore,
    ) -> TestApp {
        let transport = Arc::new(StubTransport {
            reply,
            actions: Mutex::new(Vec::new()),
        });
        let store = Arc::new(store);
        let api = MarketplaceApi::new(
            transport.clone(),
            store.clone(),
            Arc::new(StaticAccess::denied()),
            Arc::new(AllowedDomains::any()),
        );
        let state = AdminState::new(api, Some(Secret::new(TOKEN.to_string())));
        TestApp {
            router: build_admin_router(state),
            store,
            transport,
        }
    }

    fn raw_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn create_account_stores_key() {
        let app = test_app(
            Ok(RawResponse::new(200, r#"{"license_key":"key"}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request(
                "POST",
                "/account",
                Some(TOKEN),
                Some(serde_json::json!({ "email": "test@matomo.org" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["success"], true);
        assert_eq!(app.store.get().await.unwrap().expose(), "key");
    }

    #[tokio::test]
    async fn missing_token_is_forbidden_and_makes_no_call() {
        let app = test_app(
            Ok(RawResponse::new(200, r#"{"license_key":"key"}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request(
                "POST",
                "/account",
                None,
                Some(serde_json::json!({ "email": "test@matomo.org" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "checkUserHasSuperUserAccess");
        assert!(app.transport.actions.lock().unwrap().is_empty());
        assert!(!app.store.has().await.unwrap());
    }

    #[tokio::test]
    async fn unprivileged_caller_is_forbidden_before_body_is_checked() {
        for (method, uri) in [("POST", "/account"), ("PUT", "/license-key")] {
            for body in ["{}", "not json"] {
                let app = test_app(Ok(RawResponse::new(201, "")), MemoryLicenseKeyStore::new());

                let (status, json) =
                    send(app.router, raw_request(method, uri, None, body)).await;

                assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri} {body:?}");
                assert_eq!(json["error"], "checkUserHasSuperUserAccess");
                assert!(json["message"].is_string());
                assert!(app.transport.actions.lock().unwrap().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn malformed_body_from_superuser_is_bad_request() {
        for (method, uri, body) in [
            ("POST", "/account", "{}"),
            ("PUT", "/license-key", "{\"license\":"),
        ] {
            let app = test_app(Ok(RawResponse::new(201, "")), MemoryLicenseKeyStore::new());

            let (status, json) =
                send(app.router, raw_request(method, uri, Some(TOKEN), body)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri} {body:?}");
            assert_eq!(json["error"], "InvalidRequestBody");
            assert!(json["message"].is_string());
            assert!(app.transport.actions.lock().unwrap().is_empty());
            assert!(!app.store.has().await.unwrap());
        }
    }

    #[tokio::test]
    async fn wrong_token_is_forbidden() {
        let app = test_app(Ok(RawResponse::new(201, "")), MemoryLicenseKeyStore::new());

        let (status, _) = send(
            app.router,
            request("POST", "/plugins/testPlugin/free-trial", Some("guess"), None),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn existing_license_key_conflicts() {
        let app = test_app(
            Ok(RawResponse::new(200, r#"{"license_key":"new"}"#)),
            MemoryLicenseKeyStore::with_key("key"),
        );

        let (status, json) = send(
            app.router,
            request(
                "POST",
                "/account",
                Some(TOKEN),
                Some(serde_json::json!({ "email": "test@matomo.org" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "CreateAccountErrorLicenseExists");
    }

    #[tokio::test]
    async fn invalid_email_is_bad_request() {
        let app = test_app(Ok(RawResponse::new(200, "")), MemoryLicenseKeyStore::new());

        let (status, json) = send(
            app.router,
            request(
                "POST",
                "/account",
                Some(TOKEN),
                Some(serde_json::json!({ "email": "invalid.email@" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "CreateAccountErrorEmailInvalid");
    }

    #[tokio::test]
    async fn license_key_lifecycle() {
        let app = test_app(
            Ok(RawResponse::new(200, r#"{"isValid":true}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router.clone(),
            request("GET", "/license-key", Some(TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["configured"], false);

        let (status, _) = send(
            app.router.clone(),
            request(
                "PUT",
                "/license-key",
                Some(TOKEN),
                Some(serde_json::json!({ "license_key": "123licensekey" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.store.get().await.unwrap().expose(), "123licensekey");

        let (_, json) = send(
            app.router.clone(),
            request("GET", "/license-key", Some(TOKEN), None),
        )
        .await;
        assert_eq!(json["configured"], true);
        assert!(json.get("license_key").is_none(), "key must never be exposed");

        for _ in 0..2 {
            let (status, _) = send(
                app.router.clone(),
                request("DELETE", "/license-key", Some(TOKEN), None),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert!(!app.store.has().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_license_key_is_unprocessable() {
        let app = test_app(
            Ok(RawResponse::new(200, r#"{"isValid":false}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request(
                "PUT",
                "/license-key",
                Some(TOKEN),
                Some(serde_json::json!({ "license_key": "key" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "LicenseKeyIsNotValid");
        assert!(!app.store.has().await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_marketplace_is_bad_gateway() {
        let app = test_app(
            Err(TransportError::new(
                TransportErrorKind::Http,
                "Host not reachable",
            )),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request(
                "PUT",
                "/license-key",
                Some(TOKEN),
                Some(serde_json::json!({ "license_key": "key" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"], "HttpError");
        assert_eq!(json["message"], "Host not reachable");
    }

    #[tokio::test]
    async fn marketplace_timeout_is_gateway_timeout() {
        let app = test_app(
            Err(TransportError::new(TransportErrorKind::Timeout, "timed out")),
            MemoryLicenseKeyStore::new(),
        );

        let (status, _) = send(
            app.router,
            request("POST", "/plugins/testPlugin/free-trial", Some(TOKEN), None),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn free_trial_started() {
        let app = test_app(Ok(RawResponse::new(201, "")), MemoryLicenseKeyStore::new());

        let (status, _) = send(
            app.router,
            request("POST", "/plugins/testPlugin/free-trial", Some(TOKEN), None),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            app.transport.actions.lock().unwrap().as_slice(),
            ["plugins/testPlugin/freeTrial"]
        );
    }

    #[tokio::test]
    async fn free_trial_rejection_includes_remote_message() {
        let app = test_app(
            Ok(RawResponse::new(400, r#"{"error":"trial already used"}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request("POST", "/plugins/testPlugin/free-trial", Some(TOKEN), None),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "TrialStartRejected");
        assert_eq!(json["remote_message"], "trial already used");
    }

    #[tokio::test]
    async fn unexpected_trial_response_is_bad_gateway() {
        let app = test_app(
            Ok(RawResponse::new(201, r#"{"success":true}"#)),
            MemoryLicenseKeyStore::new(),
        );

        let (status, json) = send(
            app.router,
            request("POST", "/plugins/testPlugin/free-trial", Some(TOKEN), None),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"], "TrialStartErrorAPI");
    }

    #[tokio::test]
    async fn no_configured_token_denies_everyone() {
        let store = Arc::new(MemoryLicenseKeyStore::with_key("key"));
        let api = MarketplaceApi::new(
            Arc::new(StubTransport {
                reply: Ok(RawResponse::new(201, "")),
                actions: Mutex::new(Vec::new()),
            }),
            store.clone(),
            Arc::new(StaticAccess::denied()),
            Arc::new(AllowedDomains::any()),
        );
        let router = build_admin_router(AdminState::new(api, None));

        let (status, _) = send(
            router,
            request("DELETE", "/license-key", Some(""), None),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(store.has().await.unwrap());
    }
}
