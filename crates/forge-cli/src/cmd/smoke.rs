use crate::output::print_json;
use forge_core::checkout::{CheckoutRequest, RedirectUrl};
use forge_core::plan::{BillingCycle, PlanCode};
use serde::Serialize;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Substrings that must never show up in an API response body.
const PII_PATTERNS: &[&str] = &[
    "email",
    "phone",
    "address",
    "ssn",
    "credit_card",
    "password",
    "api_key",
    "secret",
];

pub struct SmokeConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub org_id: Option<String>,
    pub user_id: String,
    pub plan: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum Outcome {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Serialize)]
struct TestResult {
    name: &'static str,
    outcome: Outcome,
    detail: String,
}

#[derive(Default)]
struct Results {
    items: Vec<TestResult>,
    echo: bool,
}

impl Results {
    fn record(&mut self, name: &'static str, outcome: Outcome, detail: impl Into<String>) {
        let detail = detail.into();
        if self.echo {
            let icon = match outcome {
                Outcome::Pass => "✅",
                Outcome::Fail => "❌",
                Outcome::Skip => "⚠️",
            };
            let label = match outcome {
                Outcome::Pass => "PASS",
                Outcome::Fail => "FAIL",
                Outcome::Skip => "SKIP",
            };
            println!("{icon} {name}: {label}");
            if !detail.is_empty() {
                println!("   {detail}");
            }
        }
        self.items.push(TestResult {
            name,
            outcome,
            detail,
        });
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.items.iter().filter(|r| r.outcome == outcome).count()
    }
}

pub fn run(cfg: &SmokeConfig, json: bool) -> anyhow::Result<()> {
    let plan: PlanCode = cfg.plan.parse()?;
    let base_url = cfg.base_url.trim_end_matches('/');
    let agent = ureq::AgentBuilder::new()
        .timeout(TIMEOUT)
        .user_agent("forge-smoke/1.0")
        .build();

    if !json {
        println!("\n🚀 PromptForge v3 API Smoke Tests");
        println!("================================");
        println!("Base URL: {base_url}");
        println!(
            "Auth Token: {}",
            cfg.token
                .as_deref()
                .map(|t| format!("{}...", t.chars().take(20).collect::<String>()))
                .unwrap_or_else(|| "Not provided".to_string())
        );
        println!("Org ID: {}", cfg.org_id.as_deref().unwrap_or("Not provided"));
        println!("Timeout: {}ms\n", TIMEOUT.as_millis());
    }

    let started = Instant::now();
    let mut results = Results {
        echo: !json,
        ..Results::default()
    };
    match cfg.org_id.as_deref() {
        Some(org_id) => {
            test_entitlements(&agent, base_url, cfg, org_id, &mut results);
            test_checkout(&agent, base_url, cfg, org_id, plan, &mut results);
        }
        None => {
            results.record("Entitlements API", Outcome::Skip, "Missing org ID");
            results.record("Checkout API", Outcome::Skip, "Missing org ID");
        }
    }
    let elapsed = started.elapsed();

    let passed = results.count(Outcome::Pass);
    let failed = results.count(Outcome::Fail);
    let skipped = results.count(Outcome::Skip);

    if json {
        print_json(&serde_json::json!({
            "base_url": base_url,
            "results": results.items,
            "passed": passed,
            "failed": failed,
            "skipped": skipped,
            "duration_ms": elapsed.as_millis() as u64,
        }))?;
    } else {
        println!("\n================================");
        println!("Test Results Summary");
        println!("================================");
        println!("Total Tests: {}", results.items.len());
        println!("Passed: {passed}");
        println!("Failed: {failed}");
        println!("Skipped: {skipped}");
        println!("Duration: {}ms", elapsed.as_millis());
        if failed == 0 && skipped == 0 {
            println!("\n🎉 All smoke tests passed!");
        } else if failed == 0 {
            println!("\n⚠️  Some tests were skipped, but all executed tests passed");
        } else {
            println!("\n❌ Some tests failed. Check the output above.");
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} smoke test(s) failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual tests
// ---------------------------------------------------------------------------

fn test_entitlements(
    agent: &ureq::Agent,
    base_url: &str,
    cfg: &SmokeConfig,
    org_id: &str,
    results: &mut Results,
) {
    let mut req = agent
        .get(&format!("{base_url}/api/entitlements"))
        .query("orgId", org_id)
        .query("userId", &cfg.user_id);
    if let Some(token) = &cfg.token {
        req = req.set("Authorization", &format!("Bearer {token}"));
    }

    let (status, body) = match read(req.call()) {
        Ok(pair) => pair,
        Err(e) => {
            results.record("Entitlements API", Outcome::Fail, format!("Error: {e}"));
            return;
        }
    };

    let flags = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("entitlements").and_then(|e| e.as_object()).map(|m| m.len()));
    match flags {
        Some(n) if status == 200 => {
            results.record(
                "Entitlements API",
                Outcome::Pass,
                format!("Status: {status}, Flags: {n}"),
            );
            record_pii(results, "Entitlements PII Check", &body);
        }
        _ => results.record(
            "Entitlements API",
            Outcome::Fail,
            format!("Status: {status}, Response: {}", excerpt(&body)),
        ),
    }
}

fn test_checkout(
    agent: &ureq::Agent,
    base_url: &str,
    cfg: &SmokeConfig,
    org_id: &str,
    plan: PlanCode,
    results: &mut Results,
) {
    let return_url = format!("{base_url}/billing");
    let request = CheckoutRequest {
        org_id: org_id.to_string(),
        plan_code: Some(plan),
        billing_cycle: BillingCycle::Monthly,
        success_url: format!("{return_url}?upgraded=true"),
        cancel_url: return_url,
    };
    let mut req = agent.post(&format!("{base_url}/api/billing/create-checkout"));
    if let Some(token) = &cfg.token {
        req = req.set("Authorization", &format!("Bearer {token}"));
    }

    let (status, body) = match read(req.send_json(&request)) {
        Ok(pair) => pair,
        Err(e) => {
            results.record("Checkout API", Outcome::Fail, format!("Error: {e}"));
            return;
        }
    };

    let url = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(str::to_string))
        .and_then(|u| RedirectUrl::parse(u).ok());
    match url {
        Some(url) if status == 200 => {
            results.record(
                "Checkout API",
                Outcome::Pass,
                format!("Status: {status}, Redirect: {url}"),
            );
            record_pii(results, "Checkout PII Check", &body);
        }
        _ => results.record(
            "Checkout API",
            Outcome::Fail,
            format!("Status: {status}, Response: {}", excerpt(&body)),
        ),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Status and body for any HTTP response; `Err` only for transport failures.
fn read(result: Result<ureq::Response, ureq::Error>) -> Result<(u16, String), String> {
    match result {
        Ok(resp) | Err(ureq::Error::Status(_, resp)) => {
            let status = resp.status();
            let body = resp.into_string().map_err(|e| e.to_string())?;
            Ok((status, body))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn record_pii(results: &mut Results, name: &'static str, body: &str) {
    let found = pii_patterns(body);
    if found.is_empty() {
        results.record(name, Outcome::Pass, "No PII detected");
    } else {
        results.record(
            name,
            Outcome::Fail,
            format!("PII patterns detected: {}", found.join(", ")),
        );
    }
}

/// PII markers present in `body`, matched case-insensitively.
fn pii_patterns(body: &str) -> Vec<&'static str> {
    let lower = body.to_lowercase();
    PII_PATTERNS
        .iter()
        .copied()
        .filter(|p| lower.contains(p))
        .collect()
}

fn excerpt(body: &str) -> String {
    body.chars().take(100).collect()
}
