//! HTTP API routes for the access gateway

use crate::gateway::{
    AccessChange, AccessGateway, AuthorizationCall, Credentials, NoticeCall, UploadMetadata,
};
use crate::models::{Decision, RequestId};
use crate::BrokerError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

/// Largest accepted JSON or form body.
const MAX_BODY_BYTES: u64 = 64 * 1024;
/// Largest accepted document upload.
const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Error body shared by every route
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

/// Body of POST /api/v1/authorizations/:id/resolve (JSON or form)
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub action: String,
}

/// Fields the provider posts to the inbound webhook
#[derive(Debug, Clone, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn status_reply(status: StatusCode, message: impl Into<String>) -> Response {
    json_reply(
        &serde_json::json!({"status": "ok", "message": message.into()}),
        status,
    )
}

fn error_reply(err: &BrokerError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
    json_reply(
        &ErrorResponse {
            status: "error".to_string(),
            message: err.to_string(),
        },
        status,
    )
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Create HTTP API routes
pub fn create_api_routes(
    gateway: Arc<AccessGateway>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let gateway_filter = warp::any().map(move || Arc::clone(&gateway));

    // POST /api/v1/authorizations - Request authorization and wait for the decision
    let post_authorization = warp::path!("api" / "v1" / "authorizations")
        .and(warp::post())
        .and(json_body::<AuthorizationCall>())
        .and(gateway_filter.clone())
        .and_then(handle_post_authorization);

    // GET /api/v1/authorizations/:id - Confirmation page
    let get_authorization_page = warp::path!("api" / "v1" / "authorizations" / String)
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(handle_get_authorization_page);

    // GET /api/v1/authorizations/:id/status - Pending entry
    let get_authorization_status =
        warp::path!("api" / "v1" / "authorizations" / String / "status")
            .and(warp::get())
            .and(gateway_filter.clone())
            .and_then(handle_get_authorization_status);

    // POST /api/v1/authorizations/:id/resolve - Confirm or cancel (JSON or form)
    let resolve_body = warp::body::content_length_limit(MAX_BODY_BYTES).and(
        warp::body::json::<ResolveRequest>()
            .or(warp::body::form::<ResolveRequest>())
            .unify(),
    );
    let post_resolve = warp::path!("api" / "v1" / "authorizations" / String / "resolve")
        .and(warp::post())
        .and(resolve_body)
        .and(gateway_filter.clone())
        .and_then(handle_post_resolve);

    // POST /api/v1/users - Register
    let post_users = warp::path!("api" / "v1" / "users")
        .and(warp::post())
        .and(json_body::<Credentials>())
        .and(gateway_filter.clone())
        .and_then(handle_post_users);

    // GET /api/v1/users - Registered usernames
    let get_users = warp::path!("api" / "v1" / "users")
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(handle_get_users);

    // POST /api/v1/login
    let post_login = warp::path!("api" / "v1" / "login")
        .and(warp::post())
        .and(json_body::<Credentials>())
        .and(gateway_filter.clone())
        .and_then(handle_post_login);

    // GET /api/v1/users/:username/documents
    let get_documents = warp::path!("api" / "v1" / "users" / String / "documents")
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(handle_get_documents);

    // POST /api/v1/users/:username/documents?name=..&issuer=..[&extract=true] - Raw file body
    let post_documents = warp::path!("api" / "v1" / "users" / String / "documents")
        .and(warp::post())
        .and(warp::query::<UploadMetadata>())
        .and(warp::body::content_length_limit(MAX_UPLOAD_BYTES))
        .and(warp::body::bytes())
        .and(gateway_filter.clone())
        .and_then(handle_post_documents);

    // POST /api/v1/users/:username/notifications - Leave an in-app notice
    let post_notices = warp::path!("api" / "v1" / "users" / String / "notifications")
        .and(warp::post())
        .and(json_body::<NoticeCall>())
        .and(gateway_filter.clone())
        .and_then(handle_post_notices);

    // GET /api/v1/users/:username/notifications
    let get_notices = warp::path!("api" / "v1" / "users" / String / "notifications")
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(handle_get_notices);

    // POST /api/v1/access - Grant or revoke
    let post_access = warp::path!("api" / "v1" / "access")
        .and(warp::post())
        .and(json_body::<AccessChange>())
        .and(gateway_filter.clone())
        .and_then(handle_post_access);

    // GET /api/v1/access/:subject/:grantee/documents - Read with a grant
    let get_granted_documents =
        warp::path!("api" / "v1" / "access" / String / String / "documents")
            .and(warp::get())
            .and(gateway_filter.clone())
            .and_then(handle_get_granted_documents);

    // POST /api/v1/inbound - Provider webhook for replies
    let post_inbound = warp::path!("api" / "v1" / "inbound")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::form::<InboundForm>())
        .and(gateway_filter.clone())
        .and_then(handle_post_inbound);

    // GET /api/v1/health - Health check endpoint
    let get_health = warp::path!("api" / "v1" / "health")
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(handle_get_health);

    post_authorization
        .or(get_authorization_page)
        .or(get_authorization_status)
        .or(post_resolve)
        .or(post_users)
        .or(get_users)
        .or(post_login)
        .or(get_documents)
        .or(post_documents)
        .or(post_notices)
        .or(get_notices)
        .or(post_access)
        .or(get_granted_documents)
        .or(post_inbound)
        .or(get_health)
        .recover(handle_rejection)
}

/// Handle POST /api/v1/authorizations
async fn handle_post_authorization(
    call: AuthorizationCall,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.request_authorization(call).await {
        Ok(outcome) if outcome.is_timeout() => Ok(json_reply(&outcome, StatusCode::REQUEST_TIMEOUT)),
        Ok(outcome) => Ok(json_reply(&outcome, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/authorizations/:id
async fn handle_get_authorization_page(
    id: String,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.authorization_page(&RequestId::from(id)).await {
        Ok(page) => Ok(warp::reply::html(page).into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/authorizations/:id/status
async fn handle_get_authorization_status(
    id: String,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.status(&RequestId::from(id)).await {
        Ok(request) => Ok(json_reply(&request, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/authorizations/:id/resolve
async fn handle_post_resolve(
    id: String,
    body: ResolveRequest,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    let decision = match body.action.parse::<Decision>() {
        Ok(decision) => decision,
        Err(message) => return Ok(error_reply(&BrokerError::Validation(message))),
    };
    match gateway.resolve(&RequestId::from(id), decision).await {
        Ok(report) => Ok(json_reply(&report, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/users
async fn handle_post_users(
    credentials: Credentials,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    let username = credentials.username.clone();
    match gateway.register(credentials).await {
        Ok(()) => Ok(status_reply(
            StatusCode::CREATED,
            format!("user {} registered", username),
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/users
async fn handle_get_users(gateway: Arc<AccessGateway>) -> Result<Response, warp::Rejection> {
    match gateway.users().await {
        Ok(users) => Ok(json_reply(&serde_json::json!({ "users": users }), StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/login
async fn handle_post_login(
    credentials: Credentials,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.login(credentials).await {
        Ok(()) => Ok(status_reply(StatusCode::OK, "login successful")),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/users/:username/documents
async fn handle_get_documents(
    username: String,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.documents(&username).await {
        Ok(documents) => Ok(json_reply(
            &serde_json::json!({ "username": username, "documents": documents }),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/users/:username/documents
async fn handle_post_documents(
    username: String,
    metadata: UploadMetadata,
    contents: Bytes,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.upload(&username, metadata, contents).await {
        Ok(documents) => Ok(json_reply(
            &serde_json::json!({ "username": username, "documents": documents }),
            StatusCode::CREATED,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/users/:username/notifications
async fn handle_post_notices(
    username: String,
    call: NoticeCall,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.post_notice(&username, call).await {
        Ok(notice) => Ok(json_reply(&notice, StatusCode::CREATED)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/users/:username/notifications
async fn handle_get_notices(
    username: String,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.notices(&username).await {
        Ok(notices) => Ok(json_reply(
            &serde_json::json!({ "username": username, "notifications": notices }),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/access
async fn handle_post_access(
    change: AccessChange,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    let message = format!(
        "access for {} to {} set to {}",
        change.grantee, change.subject, change.allowed
    );
    match gateway.toggle_access(change).await {
        Ok(()) => Ok(status_reply(StatusCode::OK, message)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/access/:subject/:grantee/documents
async fn handle_get_granted_documents(
    subject: String,
    grantee: String,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.documents_for_grantee(&subject, &grantee).await {
        Ok(documents) => Ok(json_reply(
            &serde_json::json!({ "username": subject, "documents": documents }),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/inbound
///
/// Answers with an empty TwiML document so the provider sends no auto-reply.
async fn handle_post_inbound(
    form: InboundForm,
    gateway: Arc<AccessGateway>,
) -> Result<Response, warp::Rejection> {
    match gateway.record_inbound(&form.from, &form.body).await {
        Ok(_) => Ok(warp::reply::with_header(
            "<Response></Response>",
            "content-type",
            "text/xml",
        )
        .into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle GET /api/v1/health
async fn handle_get_health(gateway: Arc<AccessGateway>) -> Result<Response, warp::Rejection> {
    Ok(json_reply(&gateway.health().await, StatusCode::OK))
}

/// Turn filter rejections into the same error body the handlers use.
async fn handle_rejection(err: warp::Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content-length required".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported content type".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::error!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(json_reply(
        &ErrorResponse {
            status: "error".to_string(),
            message,
        },
        status,
    ))
}
