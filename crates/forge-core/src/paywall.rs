use crate::checkout::{CheckoutClient, CheckoutError, CheckoutRequest, RedirectUrl};
use crate::entitlements::Capability;
use crate::plan::{catalog, BillingCycle, PlanCode};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Trigger messages
// ---------------------------------------------------------------------------

/// Trigger key reported when `capability` is the one that was denied.
pub fn trigger_key(capability: Capability) -> &'static str {
    use Capability::*;
    match capability {
        CanUseGptTestReal => "gpt_test_real",
        CanExportPdf => "export_pdf",
        CanExportJson => "export_json",
        CanExportBundleZip => "export_bundle",
        HasApi => "api_access",
        HasEvaluatorAi => "evaluator_ai",
        HasCloudHistory => "cloud_history",
        HasSeatsGt1 | MaxSeats => "multi_seat",
        HasWhiteLabel => "white_label",
        other => other.key(),
    }
}

/// Human-readable reason for the paywall. Unknown triggers get a generic
/// sentence built from `feature_key`.
pub fn trigger_message(trigger: &str, feature_key: &str) -> String {
    let known = match trigger {
        "gpt_test_real" => "Real GPT test scoring requires Pro plan. Get detailed analysis and optimization recommendations.",
        "export_pdf" => "PDF reports require Pro plan. Generate professional documentation with your branding.",
        "export_json" => "JSON export with metadata requires Creator plan. Export structured data for integrations.",
        "export_bundle" => "Bundle exports require Enterprise plan. Get complete packages with assets and manifests.",
        "api_access" => "API access requires Enterprise plan. Integrate PromptForge into your workflows.",
        "evaluator_ai" => "AI evaluation requires Pro plan. Get intelligent scoring and improvement suggestions.",
        "cloud_history" => "Cloud history requires Creator plan. Access your prompts from anywhere.",
        "multi_seat" => "Multi-seat access requires Enterprise plan. Collaborate with your team.",
        "white_label" => "White-label options require Enterprise plan. Brand the platform as your own.",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_string();
    }
    format!(
        "{} requires a premium plan. Upgrade to unlock advanced capabilities.",
        humanize(feature_key)
    )
}

/// `canExportMD` -> `can export md`.
fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.extend(ch.to_lowercase());
    }
    out
}

// ---------------------------------------------------------------------------
// Recommended plan / feature info
// ---------------------------------------------------------------------------

/// Smallest paid plan that includes `capability`.
pub fn recommended_plan(capability: Capability) -> PlanCode {
    capability.included_from().max(PlanCode::Creator)
}

/// Same as [`recommended_plan`] but by wire key; unknown keys point at Pro.
pub fn recommended_plan_for_key(key: &str) -> PlanCode {
    Capability::from_key(key)
        .map(recommended_plan)
        .unwrap_or(PlanCode::Pro)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub required_plan: PlanCode,
}

pub fn feature_info(capability: Capability) -> FeatureInfo {
    use Capability::*;
    let (name, description) = match capability {
        CanUseGptTestReal => ("GPT Test Engine", "Real-time testing with detailed analysis"),
        CanExportPdf => ("PDF Export", "Professional PDF reports with your branding"),
        CanExportJson => ("JSON Export", "Structured data export for integrations"),
        CanExportBundleZip => ("Bundle Export", "Complete packages with assets and manifests"),
        HasApi => ("API Access", "Integrate PromptForge into your workflows"),
        HasEvaluatorAi => ("Evaluator AI", "Intelligent scoring and improvement suggestions"),
        HasCloudHistory => ("Cloud History", "Access your prompts from anywhere"),
        HasWhiteLabel => ("White Label", "Brand the platform as your own"),
        HasSeatsGt1 | MaxSeats => ("Team Seats", "Invite your team to a shared workspace"),
        _ => ("Premium Feature", "Advanced functionality for professional use"),
    };
    FeatureInfo {
        name,
        description,
        required_plan: recommended_plan(capability),
    }
}

// ---------------------------------------------------------------------------
// PaywallPrompt
// ---------------------------------------------------------------------------

/// Everything a paywall presentation needs to describe one denial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaywallPrompt {
    pub trigger: String,
    pub capability: Capability,
    pub message: String,
    pub recommended_plan: PlanCode,
    pub feature: FeatureInfo,
}

impl PaywallPrompt {
    /// `trigger` overrides the key derived from the capability.
    pub fn for_capability(capability: Capability, trigger: Option<&str>) -> Self {
        let trigger = trigger.unwrap_or_else(|| trigger_key(capability)).to_string();
        let message = trigger_message(&trigger, capability.key());
        Self {
            trigger,
            capability,
            message,
            recommended_plan: recommended_plan(capability),
            feature: feature_info(capability),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRow {
    pub code: PlanCode,
    pub name: &'static str,
    /// Per-month price for the selected cycle.
    pub price: u32,
    /// Amount charged each billing period.
    pub billed: u32,
    pub billing_cycle: BillingCycle,
    pub features: &'static [&'static str],
    pub current: bool,
    pub recommended: bool,
}

pub fn plan_rows(current: PlanCode, recommended: PlanCode, cycle: BillingCycle) -> Vec<PlanRow> {
    catalog()
        .iter()
        .map(|p| PlanRow {
            code: p.code,
            name: p.name,
            price: p.monthly_equivalent(cycle),
            billed: p.billed_price(cycle),
            billing_cycle: cycle,
            features: p.features,
            current: p.code == current,
            recommended: p.code == recommended,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PaywallSession
// ---------------------------------------------------------------------------

/// State of one open paywall. Dropping or closing it discards everything.
#[derive(Debug)]
pub struct PaywallSession {
    org_id: String,
    prompt: PaywallPrompt,
    current_plan: PlanCode,
    billing_cycle: BillingCycle,
    error: Option<String>,
}

impl PaywallSession {
    pub fn open(org_id: impl Into<String>, prompt: PaywallPrompt, current_plan: PlanCode) -> Self {
        Self {
            org_id: org_id.into(),
            prompt,
            current_plan,
            billing_cycle: BillingCycle::Monthly,
            error: None,
        }
    }

    pub fn prompt(&self) -> &PaywallPrompt {
        &self.prompt
    }

    pub fn billing_cycle(&self) -> BillingCycle {
        self.billing_cycle
    }

    pub fn set_billing_cycle(&mut self, cycle: BillingCycle) {
        self.billing_cycle = cycle;
    }

    /// Visible error from the last failed upgrade attempt.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn plan_rows(&self) -> Vec<PlanRow> {
        plan_rows(self.current_plan, self.prompt.recommended_plan, self.billing_cycle)
    }

    /// Request a checkout session. `plan` is `None` for the inline upsell,
    /// which lets the billing service choose. `return_url` is where the
    /// hosted page sends the user back; success adds `upgraded=true` so the
    /// caller knows to refetch.
    ///
    /// On failure the session stays open with a visible error. No retry.
    pub fn handle_upgrade(
        &mut self,
        client: &dyn CheckoutClient,
        plan: Option<PlanCode>,
        return_url: &str,
    ) -> Result<RedirectUrl, CheckoutError> {
        self.error = None;
        let request = CheckoutRequest {
            org_id: self.org_id.clone(),
            plan_code: plan,
            billing_cycle: self.billing_cycle,
            success_url: with_query(return_url, "upgraded=true"),
            cancel_url: return_url.to_string(),
        };
        match client.create_session(&request) {
            Ok(url) => {
                tracing::info!(org_id = %self.org_id, plan = ?plan, "checkout session created");
                Ok(url)
            }
            Err(e) => {
                tracing::warn!(org_id = %self.org_id, plan = ?plan, error = %e, "checkout session failed");
                self.error = Some(e.user_message().to_string());
                Err(e)
            }
        }
    }

    pub fn close(self) {}
}

/// Append `pair` to the query of `url`, ahead of any `#fragment`.
fn with_query(url: &str, pair: &str) -> String {
    let (base, fragment) = match url.find('#') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{pair}{fragment}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
