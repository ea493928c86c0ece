//! Request-validation and request-id middleware.
//!
//! The validation middleware translates each inbound request into the
//! framework-free [`RequestContext`], runs the security pipeline and
//! refuses blocked requests with a structured JSON body before they
//! reach any handler.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::http::server::GatewayState;
use crate::pipeline::context::RequestContext;
use crate::pipeline::violation::PipelineDecision;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Caller identity headers set by the upstream authenticator.
const CALLER_SUBJECT_HEADER: &str = "x-caller-subject";
const CALLER_ROLES_HEADER: &str = "x-caller-roles";

/// Form bodies above this size are refused instead of inspected.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Assign a request ID when the client did not send one, and echo it
/// on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(X_REQUEST_ID, value.clone());
        let mut response = next.run(req).await;
        response.headers_mut().insert(X_REQUEST_ID, value);
        return response;
    }
    next.run(req).await
}

/// Run the security pipeline against the request. Blocked requests
/// never reach a handler.
pub async fn security_validation_middleware(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.load().request_validation.enabled {
        return next.run(req).await;
    }

    let (req, ctx) = match build_context(addr, req).await {
        Ok(built) => built,
        Err(response) => return response,
    };

    let decision = state.pipeline.load().execute(&ctx);
    if decision.blocked {
        return refusal(&decision);
    }
    next.run(req).await
}

/// Build the pipeline's view of the request. Consumes and restores the
/// body when form fields need inspection.
async fn build_context(
    addr: SocketAddr,
    req: Request<Body>,
) -> Result<(Request<Body>, RequestContext), Response> {
    let (parts, body) = req.into_parts();

    let mut ctx = RequestContext::new(addr.ip(), parts.method.as_str(), parts.uri.path());

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }

    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            ctx = ctx.with_query(&key, &value);
        }
    }

    let subject = ctx.header(CALLER_SUBJECT_HEADER).map(str::to_string);
    let roles: Vec<String> = ctx
        .header(CALLER_ROLES_HEADER)
        .map(|raw| {
            raw.split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if let Some(subject) = subject {
        let role_refs: Vec<&str> = roles.iter().map(String::as_str).collect();
        ctx = ctx.with_identity(&subject, &role_refs);
    }

    let body = if is_form_urlencoded(&parts.headers) {
        let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES).await.map_err(|_| {
            (StatusCode::PAYLOAD_TOO_LARGE, "Form body too large to inspect").into_response()
        })?;
        for (key, value) in url::form_urlencoded::parse(&bytes) {
            ctx = ctx.with_form(&key, &value);
        }
        Body::from(bytes)
    } else {
        body
    };

    Ok((Request::from_parts(parts, body), ctx))
}

fn is_form_urlencoded(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Structured refusal. The reason is the first critical violation's
/// description, falling back to the first violation of any severity.
fn refusal(decision: &PipelineDecision) -> Response {
    let reason = decision
        .block_reason
        .clone()
        .or_else(|| decision.violations.first().map(|v| v.description.clone()))
        .unwrap_or_else(|| "Request blocked by security policy".to_string());

    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "request blocked",
            "reason": reason,
            "violations": decision.violations,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", "Bearer token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("comment=hello&name=alice"))
            .unwrap()
    }

    #[tokio::test]
    async fn context_captures_headers_query_and_form() {
        let addr: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        let (_req, ctx) = build_context(addr, request("/submit?page=2&sort=asc"))
            .await
            .unwrap();

        assert_eq!(ctx.remote_addr, "10.1.2.3".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.path, "/submit");
        assert_eq!(ctx.header("Authorization"), Some("Bearer token"));
        assert_eq!(ctx.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(ctx.form.get("comment").map(String::as_str), Some("hello"));
    }

    #[tokio::test]
    async fn identity_headers_become_caller_claims() {
        let addr: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        let req = Request::builder()
            .uri("/admin/users")
            .header("x-caller-subject", "alice")
            .header("x-caller-roles", "admin, auditor")
            .body(Body::empty())
            .unwrap();

        let (_req, ctx) = build_context(addr, req).await.unwrap();
        let identity = ctx.identity.unwrap();
        assert_eq!(identity.subject, "alice");
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("auditor"));
    }

    #[tokio::test]
    async fn form_body_survives_inspection() {
        let addr: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        let (req, _ctx) = build_context(addr, request("/submit")).await.unwrap();

        let bytes = axum::body::to_bytes(req.into_body(), MAX_FORM_BYTES)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"comment=hello&name=alice");
    }

    #[test]
    fn refusal_prefers_critical_reason() {
        use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};

        let mut decision = PipelineDecision::default();
        decision.blocked = true;
        decision.violations.push(SecurityViolation::new(
            ViolationKind::RateLimit,
            Severity::Medium,
            "limiter",
            "too fast",
        ));
        let response = refusal(&decision);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        decision.block_reason = Some("no credentials".into());
        let response = refusal(&decision);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
