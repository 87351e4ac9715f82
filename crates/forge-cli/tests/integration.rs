#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn forge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("forge").unwrap();
    cmd.current_dir(dir.path())
        .env("FORGE_ROOT", dir.path())
        .env_remove("AUTH_TOKEN")
        .env_remove("ORG_ID")
        .env_remove("FORGE_BASE_URL");
    cmd
}

const VALID_ENV: &str = "\
# Stripe
STRIPE_SECRET_KEY=sk_test_51Habc
STRIPE_WEBHOOK_SECRET=whsec_abc123
NEXT_PUBLIC_STRIPE_PUBLISHABLE_KEY=pk_test_51Habc
SUPABASE_URL=https://abcdefgh.supabase.co
SUPABASE_SERVICE_ROLE_KEY=eyJhbGciOiJIUzI1NiJ9.service
NEXT_PUBLIC_SUPABASE_ANON_KEY=eyJhbGciOiJIUzI1NiJ9.anon
NEXT_PUBLIC_BASE_URL=http://localhost:3000
NODE_ENV=development
";

const MIGRATION_SQL: &str = "\
CREATE TABLE IF NOT EXISTS public.subscriptions (id uuid primary key);
CREATE TABLE IF NOT EXISTS public.entitlements (org_id uuid, key text);
CREATE TABLE IF NOT EXISTS public.webhook_events (id text primary key);
CREATE OR REPLACE FUNCTION public.pf_apply_plan_entitlements(p_org uuid) RETURNS void AS $$ BEGIN END $$ LANGUAGE plpgsql;
CREATE POLICY subscriptions_read ON public.subscriptions FOR SELECT USING (true);
CREATE INDEX subscriptions_org_idx ON public.subscriptions (id);
";

const REQUIRED_FILES: &[&str] = &[
    "lib/billing/stripe.ts",
    "lib/billing/entitlements.ts",
    "app/api/webhooks/stripe/route.ts",
    "app/api/billing/checkout/route.ts",
    "app/api/billing/portal/route.ts",
    "app/api/entitlements/route.ts",
    "scripts/create-stripe-products.js",
    "scripts/setup-billing.js",
];

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A project that passes every check.
fn configured_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), ".env.local", VALID_ENV);
    for file in REQUIRED_FILES {
        write(dir.path(), file, "// stub\n");
    }
    write(
        dir.path(),
        forge_core::paths::MIGRATION_FILE,
        MIGRATION_SQL,
    );
    dir
}

const ORGS_YAML: &str = "\
orgs:
  - org_id: org-free
    members:
      - user_id: u1
        role: owner
  - org_id: org-pro
    subscription:
      org_id: org-pro
      plan_code: pro
      status: active
      seats: 3
      current_period_start: 2024-01-01T00:00:00Z
      current_period_end: 2099-01-01T00:00:00Z
    members:
      - user_id: u1
        role: admin
";

fn seeded_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), ".promptforge/orgs.yaml", ORGS_YAML);
    dir
}

// ---------------------------------------------------------------------------
// forge check-config
// ---------------------------------------------------------------------------

#[test]
fn check_config_missing_env_file_fails() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .arg("check-config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("❌ .env.local file not found"))
        .stdout(predicate::str::contains("Run: pnpm run setup:billing"));
}

#[test]
fn check_config_flags_invalid_stripe_key() {
    let dir = configured_project();
    let env = VALID_ENV.replace("sk_test_51Habc", "invalid_key_format");
    write(dir.path(), ".env.local", &env);

    forge(&dir)
        .arg("check-config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("❌ STRIPE_SECRET_KEY: INVALID FORMAT"))
        .stdout(predicate::str::contains("✅ STRIPE_SECRET_KEY").not())
        .stdout(predicate::str::contains("Got: invalid_key_format"))
        .stdout(predicate::str::contains("⚠️  CONFIGURATION CHECK FAILED"));
}

#[test]
fn check_config_passes_on_complete_project() {
    let dir = configured_project();
    forge(&dir)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("✅ STRIPE_SECRET_KEY: VALID"))
        .stdout(predicate::str::contains("⚠️  SENDGRID_API_KEY: NOT SET"))
        .stdout(predicate::str::contains("Required: 8/8 valid"))
        .stdout(predicate::str::contains("📁 File Structure: COMPLETE"))
        .stdout(predicate::str::contains("🗄️  Database Migration: VALID"))
        .stdout(predicate::str::contains("🏆 CONFIGURATION CHECK PASSED!"));
}

#[test]
fn check_config_reports_missing_file() {
    let dir = configured_project();
    std::fs::remove_file(dir.path().join("lib/billing/stripe.ts")).unwrap();

    forge(&dir)
        .arg("check-config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("❌ lib/billing/stripe.ts"))
        .stdout(predicate::str::contains("📁 File Structure: INCOMPLETE"));
}

#[test]
fn check_config_reports_missing_migration_components() {
    let dir = configured_project();
    write(
        dir.path(),
        forge_core::paths::MIGRATION_FILE,
        "CREATE TABLE subscriptions (id int);\n",
    );

    forge(&dir)
        .arg("check-config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("✅ Subscriptions table"))
        .stdout(predicate::str::contains("❌ RLS policies"))
        .stdout(predicate::str::contains("🗄️  Database Migration: INVALID"));
}

#[test]
fn check_config_json_report() {
    let dir = configured_project();
    let output = forge(&dir)
        .args(["--json", "check-config"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["env_file_found"], true);
    assert_eq!(report["required"].as_array().unwrap().len(), 8);
    assert_eq!(report["migration"]["found"], true);
}

// ---------------------------------------------------------------------------
// forge plans / paywall
// ---------------------------------------------------------------------------

#[test]
fn plans_annual_shows_monthly_equivalent() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["plans", "--cycle", "annual"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Billing cycle: annual"))
        .stdout(predicate::str::contains("$41/mo"))
        .stdout(predicate::str::contains("$490"));
}

#[test]
fn plans_rejects_unknown_cycle() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["plans", "--cycle", "weekly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown billing cycle 'weekly'"));
}

#[test]
fn paywall_recommends_enterprise_for_api() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["paywall", "hasAPI"])
        .assert()
        .success()
        .stdout(predicate::str::contains("API access requires Enterprise plan"))
        .stdout(predicate::str::contains("Recommended: Enterprise"));
}

#[test]
fn paywall_recommends_pro_for_pdf() {
    let dir = TempDir::new().unwrap();
    let output = forge(&dir)
        .args(["--json", "paywall", "canExportPDF"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["prompt"]["recommended_plan"], "pro");
    assert_eq!(value["plans"].as_array().unwrap().len(), 4);
}

#[test]
fn paywall_unknown_feature_fails() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["paywall", "canTeleport"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown capability: canTeleport"));
}

// ---------------------------------------------------------------------------
// forge entitlements / gate
// ---------------------------------------------------------------------------

#[test]
fn entitlements_show_reads_seed() {
    let dir = seeded_project();
    forge(&dir)
        .args(["entitlements", "show", "--org", "org-pro", "--user", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan: Pro"))
        .stdout(predicate::str::contains("Role: admin"))
        .stdout(predicate::str::contains("canExportPDF"))
        .stdout(predicate::str::contains("Period ends in"));
}

#[test]
fn entitlements_orgs_lists_seeded_plans() {
    let dir = seeded_project();
    forge(&dir)
        .args(["entitlements", "orgs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ORG"))
        .stdout(predicate::str::is_match(r"org-free\s+Free").unwrap())
        .stdout(predicate::str::is_match(r"org-pro\s+Pro").unwrap());

    let out = forge(&dir)
        .args(["--json", "entitlements", "orgs"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json[0]["org_id"], "org-free");
    assert_eq!(json[1]["plan"], "pro");
}

#[test]
fn entitlements_orgs_without_seed_says_so() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["entitlements", "orgs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No orgs in"));
}

#[test]
fn entitlements_show_unknown_org_fails() {
    let dir = seeded_project();
    forge(&dir)
        .args(["entitlements", "show", "--org", "nope", "--user", "u1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("organization not found: nope"));
}

#[test]
fn entitlements_export_check_on_free() {
    let dir = seeded_project();
    forge(&dir)
        .args([
            "entitlements", "check", "export", "--format", "pdf", "--org", "org-free", "--user", "u1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("export: denied"))
        .stdout(predicate::str::contains("PDF export requires pro plan or higher."));
}

#[test]
fn entitlements_feature_falls_back_closed() {
    let dir = seeded_project();
    forge(&dir)
        .args(["entitlements", "feature", "canExportJSON", "--org", "nope", "--user", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("canExportJSON: denied"))
        .stdout(predicate::str::contains("Upgrade to Creator"));
}

#[test]
fn entitlements_recommend_text() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["entitlements", "recommend", "export-pdf", "--current", "creator"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upgrade to Pro plan for PDF export"));
}

#[test]
fn gate_replace_without_fallback_shows_locked_placeholder() {
    let dir = seeded_project();
    forge(&dir)
        .args([
            "gate", "canExportPDF", "--org", "org-free", "--user", "u1", "--mode", "replace",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Locked: canExportPDF requires the Pro plan"));
}

#[test]
fn gate_modal_opens_only_on_click() {
    let dir = seeded_project();
    let args = ["gate", "canExportPDF", "--org", "org-free", "--user", "u1"];
    forge(&dir)
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("[gated content]"))
        .stdout(predicate::str::contains("[upgrade]").not());

    forge(&dir)
        .args(args)
        .arg("--click")
        .assert()
        .success()
        .stdout(predicate::str::contains("[upgrade] PDF reports require Pro plan"));
}

#[test]
fn gate_granted_renders_children() {
    let dir = seeded_project();
    forge(&dir)
        .args(["gate", "canExportPDF", "--org", "org-pro", "--user", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[gated content]\n"));
}

#[test]
fn gate_fail_open_on_unknown_org() {
    let dir = seeded_project();
    forge(&dir)
        .args(["gate", "canExportPDF", "--org", "nope", "--user", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("! Could not verify access"));
}

// ---------------------------------------------------------------------------
// forge config
// ---------------------------------------------------------------------------

#[test]
fn config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    forge(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join(".promptforge/config.yaml").exists());
    forge(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
    forge(&dir).args(["config", "init"]).assert().failure();
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        ".promptforge/config.yaml",
        "api_base_url: app.example.com\nrequest_timeout_seconds: 0\n",
    );
    forge(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] api_base_url"))
        .stderr(predicate::str::contains("config validation found errors"));
}

// ---------------------------------------------------------------------------
// forge smoke
// ---------------------------------------------------------------------------

/// Serve the dev API for `root` on a free port in a background thread.
fn spawn_server(root: &Path) -> u16 {
    let (tx, rx) = std::sync::mpsc::channel();
    let root = root.to_path_buf();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap().port()).unwrap();
            forge_server::serve_on(root, listener).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

#[test]
fn smoke_without_org_skips() {
    let dir = TempDir::new().unwrap();
    forge(&dir)
        .args(["smoke", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entitlements API: SKIP"))
        .stdout(predicate::str::contains("Checkout API: SKIP"))
        .stdout(predicate::str::contains("Some tests were skipped"));
}

#[test]
fn smoke_against_dev_server_passes() {
    let dir = seeded_project();
    let port = spawn_server(dir.path());
    let base_url = format!("http://127.0.0.1:{port}");

    forge(&dir)
        .args(["smoke", "--base-url", &base_url, "--org-id", "org-free"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✅ Entitlements API: PASS"))
        .stdout(predicate::str::contains("Flags: 19"))
        .stdout(predicate::str::contains("✅ Entitlements PII Check: PASS"))
        .stdout(predicate::str::contains("✅ Checkout API: PASS"))
        .stdout(predicate::str::contains("All smoke tests passed!"));
}

#[test]
fn smoke_unknown_org_fails() {
    let dir = seeded_project();
    let port = spawn_server(dir.path());
    let base_url = format!("http://127.0.0.1:{port}");

    forge(&dir)
        .args(["smoke", "--base-url", &base_url, "--org-id", "org-missing"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("❌ Entitlements API: FAIL"))
        .stdout(predicate::str::contains("Status: 404"))
        .stderr(predicate::str::contains("smoke test(s) failed"));
}
