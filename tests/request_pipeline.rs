//! End-to-end scenarios for the request security pipeline with the
//! default validator set.

use std::net::IpAddr;

use trustgate::config::schema::TrustConfig;
use trustgate::http::server::build_request_pipeline;
use trustgate::pipeline::context::RequestContext;
use trustgate::pipeline::validators::rate_limit::RateLimiterState;
use trustgate::pipeline::violation::{Severity, ViolationKind};
use trustgate::pipeline::SecurityValidationPipeline;

fn pipeline() -> SecurityValidationPipeline {
    build_request_pipeline(&TrustConfig::default(), RateLimiterState::new())
}

fn authed(ip: &str, path: &str) -> RequestContext {
    RequestContext::new(ip.parse::<IpAddr>().unwrap(), "GET", path)
        .with_header("Authorization", "Bearer test-token")
        .with_identity("svc-client", &["user"])
}

#[test]
fn default_pipeline_runs_all_validators_in_order() {
    let pipeline = pipeline();
    assert_eq!(
        pipeline.validator_names(),
        vec![
            "AuthenticationValidator",
            "AuthorizationValidator",
            "RateLimitValidator",
            "InputInspectionValidator",
        ]
    );
}

#[test]
fn clean_authenticated_request_is_allowed() {
    let pipeline = pipeline();
    let decision = pipeline.execute(&authed("10.0.0.1", "/v1/orders"));

    assert!(!decision.blocked);
    assert!(decision.is_clean());
    assert_eq!(decision.passed.len(), 4);
}

#[test]
fn missing_credentials_block_before_anything_else_runs() {
    let pipeline = pipeline();
    let ctx = RequestContext::new("10.0.0.2".parse::<IpAddr>().unwrap(), "GET", "/v1/orders");
    let decision = pipeline.execute(&ctx);

    assert!(decision.blocked);
    assert_eq!(decision.block_reason.as_deref(), Some("Missing credential header"));
    assert_eq!(decision.failed, vec!["AuthenticationValidator"]);
    assert!(decision.passed.is_empty());
}

#[test]
fn admin_path_requires_admin_role() {
    let pipeline = pipeline();

    let denied = pipeline.execute(&authed("10.0.0.3", "/admin/config"));
    assert!(denied.blocked);
    assert_eq!(denied.violations[0].kind, ViolationKind::Authorization);

    let granted = pipeline.execute(
        &authed("10.0.0.4", "/admin/config").with_identity("root-operator", &["admin"]),
    );
    assert!(!granted.blocked);
}

#[test]
fn rapid_second_request_is_rate_limited_but_fully_inspected() {
    let pipeline = pipeline();
    let ctx = authed("10.0.0.5", "/v1/orders");

    assert!(!pipeline.execute(&ctx).blocked);

    // Same client again, well inside the minimum interval.
    let decision = pipeline.execute(&ctx);
    assert!(decision.blocked);
    assert_eq!(decision.violations.len(), 1);
    assert_eq!(decision.violations[0].kind, ViolationKind::RateLimit);
    assert_eq!(decision.violations[0].severity, Severity::Medium);
    // Non-critical: the inspection validator still ran.
    assert!(decision.passed.contains(&"InputInspectionValidator".to_string()));
}

#[test]
fn injection_marker_blocks_with_high_severity() {
    let pipeline = pipeline();
    let ctx = authed("10.0.0.6", "/v1/search").with_query("q", "1 UNION SELECT password");

    let decision = pipeline.execute(&ctx);
    assert!(decision.blocked);
    assert_eq!(decision.violations[0].severity, Severity::High);
    // No critical violation, so the refusal reason falls back later.
    assert!(decision.block_reason.is_none());
}

#[test]
fn high_block_threshold_tolerates_medium_violations() {
    let mut config = TrustConfig::default();
    config.request_validation.block_severity = Severity::High;
    let pipeline = build_request_pipeline(&config, RateLimiterState::new());
    let ctx = authed("10.0.0.7", "/v1/orders");

    assert!(!pipeline.execute(&ctx).blocked);
    let decision = pipeline.execute(&ctx);
    // The rate-limit violation is recorded but below the threshold.
    assert!(!decision.blocked);
    assert_eq!(decision.violations.len(), 1);
}

#[test]
fn per_validator_metrics_accumulate_across_requests() {
    let pipeline = pipeline();
    pipeline.execute(&authed("10.0.1.1", "/v1/orders"));
    pipeline.execute(&authed("10.0.1.2", "/v1/orders"));
    pipeline.execute(&RequestContext::new(
        "10.0.1.3".parse::<IpAddr>().unwrap(),
        "GET",
        "/v1/orders",
    ));

    let snapshot = pipeline.metrics_snapshot();
    let authn = snapshot
        .iter()
        .find(|m| m.name == "AuthenticationValidator")
        .unwrap();
    assert_eq!(authn.count, 3);
    assert_eq!(authn.failures, 1);

    // The short-circuited request never reached the limiter.
    let limiter = snapshot
        .iter()
        .find(|m| m.name == "RateLimitValidator")
        .unwrap();
    assert_eq!(limiter.count, 2);
}
