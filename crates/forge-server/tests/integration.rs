use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use forge_core::admin::{demo_snapshot, StaticAdminData};
use forge_core::backend::{InMemoryBackend, MemberRole, MemberSeed, OrgSeed};
use forge_core::config::Config;
use forge_core::plan::{PlanCode, Subscription, SubscriptionStatus};
use forge_server::state::AppState;
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn org(org_id: &str, plan: Option<PlanCode>) -> OrgSeed {
    let now = Utc::now();
    OrgSeed {
        org_id: org_id.into(),
        subscription: plan.map(|plan_code| Subscription {
            org_id: org_id.into(),
            plan_code,
            status: SubscriptionStatus::Active,
            seats: 1,
            current_period_start: now - Duration::days(3),
            current_period_end: now + Duration::days(27),
            trial_end: None,
        }),
        members: vec![MemberSeed {
            user_id: "u1".into(),
            role: MemberRole::Owner,
        }],
        overrides: Vec::new(),
    }
}

fn test_app(dir: &TempDir) -> axum::Router {
    let backend = InMemoryBackend::new();
    backend.insert(org("org-free", None));
    backend.insert(org("org-pro", Some(PlanCode::Pro)));
    backend.insert(org("org-ent", Some(PlanCode::Enterprise)));
    let mut lapsed = org("org-lapsed", Some(PlanCode::Pro));
    if let Some(sub) = lapsed.subscription.as_mut() {
        sub.status = SubscriptionStatus::Canceled;
        sub.current_period_end = Utc::now() - Duration::days(1);
    }
    backend.insert(lapsed);
    let admin = Arc::new(StaticAdminData::new(demo_snapshot(Utc::now())));
    let state = AppState::new(
        dir.path().to_path_buf(),
        Config::default(),
        Arc::new(backend),
        admin,
    );
    forge_server::build_router(state)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn checkout_body(org_id: &str, plan: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "orgId": org_id,
        "billingCycle": "annual",
        "successUrl": "https://app.example.com/billing?upgraded=true",
        "cancelUrl": "https://app.example.com/billing",
    });
    if let Some(plan) = plan {
        body["planCode"] = serde_json::json!(plan);
    }
    body
}

// ---------------------------------------------------------------------------
// Health / entitlements
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_is_ok() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn entitlements_for_pro_org() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/entitlements?orgId=org-pro&userId=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["org_id"], "org-pro");
    assert_eq!(json["entitlements"]["canExportPDF"], true);
    assert_eq!(json["entitlements"]["hasAPI"], false);
    assert_eq!(json["entitlements"]["maxRunsPerDay"], 100);
    assert_eq!(json["plan"], "pro");
    assert_eq!(json["subscription"]["plan_code"], "pro");
    assert_eq!(json["membership"]["role"], "owner");
}

#[tokio::test]
async fn lapsed_cancellation_reports_free_plan() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/entitlements?orgId=org-lapsed&userId=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["plan"], "free");
    assert_eq!(json["subscription"]["plan_code"], "pro");
    assert_eq!(json["subscription"]["status"], "canceled");
    assert_eq!(json["entitlements"]["canExportPDF"], false);
}

#[tokio::test]
async fn entitlements_require_org_and_user() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/entitlements?userId=u1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "orgId is required");

    let (status, _) = get(test_app(&dir), "/api/entitlements?orgId=org-pro").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entitlements_unknown_org_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/entitlements?orgId=nope&userId=u1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn feature_check_recommends_smallest_plan() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(
        test_app(&dir),
        "/api/entitlements/features/canExportPDF?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["allowed"], false);
    assert_eq!(json["currentPlan"], "free");
    assert_eq!(json["recommendedPlan"], "pro");

    let (_, json) = get(
        test_app(&dir),
        "/api/entitlements/features/canExportJSON?orgId=org-pro&userId=u1",
    )
    .await;
    assert_eq!(json["allowed"], true);
    assert!(json["recommendedPlan"].is_null());
}

#[tokio::test]
async fn feature_check_unknown_key_is_400() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(
        test_app(&dir),
        "/api/entitlements/features/canTeleport?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_check_denies_pdf_on_free() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(
        test_app(&dir),
        "/api/entitlements/check/export?orgId=org-free&userId=u1&format=pdf",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["allowed"], false);
    assert_eq!(json["upgrade_required"], true);
    assert_eq!(json["required_plan"], "pro");

    let (_, json) = get(
        test_app(&dir),
        "/api/entitlements/check/export?orgId=org-free&userId=u1&format=md",
    )
    .await;
    assert_eq!(json["allowed"], true);
}

#[tokio::test]
async fn export_check_requires_format() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(
        test_app(&dir),
        "/api/entitlements/check/export?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn daily_run_quota_is_enforced() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let pair = serde_json::json!({ "orgId": "org-free", "userId": "u1" });
    for _ in 0..10 {
        let (status, _) = post_json(app.clone(), "/api/usage/runs", pair.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, json) = get(
        app,
        "/api/entitlements/check/generate?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(json["allowed"], false);
    assert_eq!(json["required_plan"], "creator");
    assert_eq!(json["remaining"], 0);
}

#[tokio::test]
async fn gpt_optimization_needs_creator() {
    let dir = TempDir::new().unwrap();
    let (_, json) = get(
        test_app(&dir),
        "/api/entitlements/check/gpt-optimization?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(json["allowed"], false);
    assert_eq!(json["reason"], "GPT optimization requires Creator plan or higher.");
}

// ---------------------------------------------------------------------------
// Plans / paywall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plans_annual_prices() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/plans?billingCycle=annual&current=creator").await;
    assert_eq!(status, StatusCode::OK);
    let plans = json["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 4);
    assert_eq!(plans[2]["code"], "pro");
    assert_eq!(plans[2]["price"], 41);
    assert_eq!(plans[2]["billed"], 490);
    assert_eq!(plans[1]["current"], true);
}

#[tokio::test]
async fn plans_reject_unknown_cycle() {
    let dir = TempDir::new().unwrap();
    let (status, _) = get(test_app(&dir), "/api/plans?billingCycle=weekly").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paywall_for_blocked_feature() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(
        test_app(&dir),
        "/api/paywall/canExportPDF?orgId=org-free&userId=u1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["blocked"], true);
    assert_eq!(json["prompt"]["trigger"], "export_pdf");
    assert_eq!(json["prompt"]["recommended_plan"], "pro");
    assert!(json["prompt"]["message"]
        .as_str()
        .unwrap()
        .starts_with("PDF reports require Pro plan"));
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkout_returns_hosted_url() {
    let dir = TempDir::new().unwrap();
    let (status, json) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-free", Some("pro")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("https://checkout.stripe.com/c/pay/cs_test_"), "{url}");
}

#[tokio::test]
async fn checkout_without_plan_picks_next_tier() {
    let dir = TempDir::new().unwrap();
    let (status, _) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-pro", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-ent", None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("highest plan"));
}

#[tokio::test]
async fn checkout_rejects_downgrade_and_free() {
    let dir = TempDir::new().unwrap();
    let (status, _) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-pro", Some("creator")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-free", Some("free")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_validates_urls_and_org() {
    let dir = TempDir::new().unwrap();
    let mut body = checkout_body("org-free", Some("creator"));
    body["cancelUrl"] = serde_json::json!("/billing");
    let (status, json) = post_json(test_app(&dir), "/api/billing/create-checkout", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "cancelUrl must be an absolute URL");

    let (status, _) = post_json(
        test_app(&dir),
        "/api/billing/create-checkout",
        checkout_body("org-missing", Some("creator")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_api_keys_filter() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(test_app(&dir), "/api/admin/api-keys?q=staging").await;
    assert_eq!(status, StatusCode::OK);
    let keys = json.as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["name"], "Staging Tests");

    let (_, json) = get(test_app(&dir), "/api/admin/api-keys").await;
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn admin_incidents_and_seats() {
    let dir = TempDir::new().unwrap();
    let (_, json) = get(test_app(&dir), "/api/admin/incidents").await;
    assert_eq!(json["open"], 1);
    assert_eq!(json["incidents"].as_array().unwrap().len(), 2);
    assert_eq!(json["incidents"][0]["type"], "performance");

    let (_, json) = get(test_app(&dir), "/api/admin/seats").await;
    assert_eq!(json["seatsAvailable"], 2);
    assert_eq!(json["needsMoreSeats"], false);
    assert_eq!(json["overview"]["plan"], "pro");
}

#[tokio::test]
async fn admin_members_and_health() {
    let dir = TempDir::new().unwrap();
    let (_, json) = get(test_app(&dir), "/api/admin/members").await;
    assert_eq!(json.as_array().unwrap().len(), 3);

    let (status, json) = get(test_app(&dir), "/api/admin/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["p95_latency_ms"], 180);
}

#[tokio::test]
async fn load_reads_seed_files_from_root() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".promptforge")).unwrap();
    std::fs::write(
        dir.path().join(".promptforge/orgs.yaml"),
        "orgs:\n  - org_id: org-seeded\n    members:\n      - user_id: u9\n        role: member\n",
    )
    .unwrap();
    let state = AppState::load(dir.path().to_path_buf()).unwrap();
    let app = forge_server::build_router(state);
    let (status, json) = get(app, "/api/entitlements?orgId=org-seeded&userId=u9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["entitlements"]["canExportMD"], true);
    assert_eq!(json["membership"]["role"], "member");
}
