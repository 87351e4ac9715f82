use crate::backend::{EntitlementBackend, Membership, UsageCounter};
use crate::cancel::CancelToken;
use crate::entitlements::{remaining, Capability, EntitlementSet, UNLIMITED};
use crate::error::{ForgeError, Result};
use crate::plan::{PlanCode, SubscriptionSummary};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEntitlements {
    pub plan: PlanCode,
    pub entitlements: EntitlementSet,
    pub subscription: Option<SubscriptionSummary>,
    pub membership: Option<Membership>,
}

impl ResolvedEntitlements {
    fn fallback() -> Self {
        Self {
            plan: PlanCode::Free,
            entitlements: EntitlementSet::most_restrictive(),
            subscription: None,
            membership: None,
        }
    }
}

/// Outcome of a quota or feature check. A denial is data, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitlementCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub upgrade_required: bool,
    pub current_plan: PlanCode,
    pub required_plan: PlanCode,
    /// Units left on the checked quota. Absent for unlimited quotas and
    /// for checks that are not quota-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

impl EntitlementCheck {
    fn allow(current: PlanCode) -> Self {
        Self {
            allowed: true,
            reason: None,
            warning: None,
            upgrade_required: false,
            current_plan: current,
            required_plan: current,
            remaining: None,
        }
    }

    fn deny(current: PlanCode, required: PlanCode, reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            warning: None,
            upgrade_required: true,
            current_plan: current,
            required_plan: required,
            remaining: None,
        }
    }

    fn not_upgrade(mut self) -> Self {
        self.upgrade_required = false;
        self
    }

    fn with_remaining(mut self, remaining: Option<u64>) -> Self {
        self.remaining = remaining;
        self
    }
}

// ---------------------------------------------------------------------------
// UpgradeAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeAction {
    Generate,
    Test,
    ExportJson,
    ExportPdf,
    ExportZip,
}

impl UpgradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            UpgradeAction::Generate => "generate",
            UpgradeAction::Test => "test",
            UpgradeAction::ExportJson => "export-json",
            UpgradeAction::ExportPdf => "export-pdf",
            UpgradeAction::ExportZip => "export-zip",
        }
    }
}

impl fmt::Display for UpgradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpgradeAction {
    type Err = ForgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "generate" => Ok(UpgradeAction::Generate),
            "test" => Ok(UpgradeAction::Test),
            "export-json" => Ok(UpgradeAction::ExportJson),
            "export-pdf" => Ok(UpgradeAction::ExportPdf),
            "export-zip" => Ok(UpgradeAction::ExportZip),
            _ => Err(ForgeError::UnknownAction(s.to_string())),
        }
    }
}

/// Static advice shown next to a denied action.
pub fn upgrade_recommendation(current: PlanCode, action: UpgradeAction) -> &'static str {
    use PlanCode::*;
    use UpgradeAction::*;
    match (action, current) {
        (Generate, Free) => "Upgrade to Creator plan for 50 runs per day",
        (Generate, Creator) => "Upgrade to Pro plan for 100 runs per day",
        (Generate, Pro) => "Upgrade to Enterprise for 1000 runs per day",
        (Test, Free) => "Upgrade to Creator plan for GPT optimization",
        (Test, Creator) => "Upgrade to Pro plan for 150 monthly GPT tests",
        (Test, Pro) => "Upgrade to Enterprise for unlimited GPT tests",
        (ExportJson, Free) => "Upgrade to Creator plan for JSON export",
        (ExportPdf, Free | Creator) => "Upgrade to Pro plan for PDF export",
        (ExportZip, Free | Creator | Pro) => "Upgrade to Enterprise for bundle export",
        _ => "Upgrade your plan to access this feature",
    }
}

// ---------------------------------------------------------------------------
// EntitlementsManager
// ---------------------------------------------------------------------------

struct CacheEntry {
    resolved: ResolvedEntitlements,
    fetched_at: Instant,
}

/// Resolves `(user, org)` pairs to entitlement sets and answers capability
/// checks. Constructed explicitly and shared behind `Arc`.
pub struct EntitlementsManager {
    backend: Arc<dyn EntitlementBackend>,
    usage: Arc<dyn UsageCounter>,
    cache_ttl: Duration,
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl EntitlementsManager {
    pub fn new(backend: Arc<dyn EntitlementBackend>, usage: Arc<dyn UsageCounter>) -> Self {
        Self::with_cache_ttl(backend, usage, DEFAULT_CACHE_TTL)
    }

    /// A zero TTL disables caching.
    pub fn with_cache_ttl(
        backend: Arc<dyn EntitlementBackend>,
        usage: Arc<dyn UsageCounter>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            usage,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch and merge entitlements, surfacing backend failures.
    ///
    /// Returns [`ForgeError::Cancelled`] if `token` is cancelled before the
    /// backend call starts or by the time it returns; a cancelled result is
    /// never cached.
    pub fn fetch(&self, user_id: &str, org_id: &str, token: &CancelToken) -> Result<ResolvedEntitlements> {
        if token.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        let key = (user_id.to_string(), org_id.to_string());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let record = self.backend.fetch(user_id, org_id)?;
        if token.is_cancelled() {
            tracing::debug!(user_id, org_id, "dropping entitlement fetch after cancellation");
            return Err(ForgeError::Cancelled);
        }

        let mut entitlements = record
            .resolved
            .unwrap_or_else(|| EntitlementSet::for_plan(record.plan));
        entitlements.apply_overrides(&record.overrides, Utc::now());
        let resolved = ResolvedEntitlements {
            plan: record.plan,
            entitlements,
            subscription: record.subscription,
            membership: record.membership,
        };

        if !self.cache_ttl.is_zero() {
            if let Ok(mut cache) = self.cache.lock() {
                let ttl = self.cache_ttl;
                cache.retain(|_, e| e.fetched_at.elapsed() < ttl);
                cache.insert(
                    key,
                    CacheEntry {
                        resolved: resolved.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
        }
        Ok(resolved)
    }

    /// Entitlements for the pair, or the most restrictive built-in set when
    /// they cannot be fetched. Never fails.
    pub fn get_user_entitlements(&self, user_id: &str, org_id: &str) -> EntitlementSet {
        self.resolve(user_id, org_id).entitlements
    }

    /// Like [`fetch`](Self::fetch) but falls back to the free plan on error.
    pub fn resolve(&self, user_id: &str, org_id: &str) -> ResolvedEntitlements {
        match self.fetch(user_id, org_id, &CancelToken::new()) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(user_id, org_id, error = %e, "entitlement fetch failed, using most restrictive set");
                ResolvedEntitlements::fallback()
            }
        }
    }

    pub fn can_generate_prompt(&self, user_id: &str, org_id: &str) -> EntitlementCheck {
        let resolved = self.resolve(user_id, org_id);
        let plan = resolved.plan;
        let limit = resolved.entitlements.quota(Capability::MaxRunsPerDay);
        let upgrade_to = plan.next().unwrap_or(plan);

        if limit == UNLIMITED {
            return EntitlementCheck::allow(plan);
        }
        if limit == 0 {
            return EntitlementCheck::deny(
                plan,
                upgrade_to,
                "Prompt generation is not included in your plan.".to_string(),
            );
        }

        match self.usage.runs_today(user_id, org_id) {
            Ok(used) => match remaining(limit, used) {
                Some(0) => EntitlementCheck::deny(
                    plan,
                    upgrade_to,
                    format!("Daily limit reached ({used}/{limit} runs). Upgrade to continue generating prompts."),
                )
                .with_remaining(Some(0)),
                left => EntitlementCheck::allow(plan).with_remaining(left),
            },
            Err(e) => {
                tracing::warn!(user_id, org_id, error = %e, "usage counter unavailable, allowing prompt generation");
                EntitlementCheck {
                    warning: Some("Usage could not be verified; this run was allowed.".to_string()),
                    ..EntitlementCheck::allow(plan)
                }
            }
        }
    }

    pub fn can_use_gpt_optimization(&self, user_id: &str, org_id: &str) -> EntitlementCheck {
        let resolved = self.resolve(user_id, org_id);
        let plan = resolved.plan;
        let limit = resolved.entitlements.quota(Capability::MonthlyGptOptimizations);
        let upgrade_to = plan.next().unwrap_or(plan);

        if limit == 0 {
            return EntitlementCheck::deny(
                plan,
                Capability::MonthlyGptOptimizations.included_from(),
                "GPT optimization requires Creator plan or higher.".to_string(),
            );
        }
        if limit == UNLIMITED {
            return EntitlementCheck::allow(plan);
        }

        match self.usage.gpt_optimizations_this_month(user_id, org_id) {
            Ok(used) => match remaining(limit, used) {
                Some(0) => EntitlementCheck::deny(
                    plan,
                    upgrade_to,
                    format!("Monthly GPT optimization limit reached ({used}/{limit})."),
                )
                .with_remaining(Some(0)),
                left => EntitlementCheck::allow(plan).with_remaining(left),
            },
            Err(e) => {
                tracing::warn!(user_id, org_id, error = %e, "usage counter unavailable, denying GPT optimization");
                EntitlementCheck::deny(
                    plan,
                    plan,
                    "GPT optimization is temporarily unavailable because usage could not be verified.".to_string(),
                )
                .not_upgrade()
            }
        }
    }

    /// txt and md are always allowed; json, pdf and zip follow their export
    /// capability; anything else is denied.
    pub fn can_export_format(&self, user_id: &str, org_id: &str, format: &str) -> EntitlementCheck {
        let capability = match format {
            "txt" | "md" => {
                let plan = self.resolve(user_id, org_id).plan;
                return EntitlementCheck::allow(plan);
            }
            "json" => Some(Capability::CanExportJson),
            "pdf" => Some(Capability::CanExportPdf),
            "zip" => Some(Capability::CanExportBundleZip),
            _ => None,
        };

        let resolved = self.resolve(user_id, org_id);
        let plan = resolved.plan;
        match capability {
            Some(c) if resolved.entitlements.flag(c) => EntitlementCheck::allow(plan),
            Some(c) => {
                let required = c.included_from();
                EntitlementCheck::deny(
                    plan,
                    required,
                    format!(
                        "{} export requires {} plan or higher.",
                        format.to_uppercase(),
                        required
                    ),
                )
            }
            None => EntitlementCheck::deny(plan, plan, format!("Unsupported export format: {format}"))
                .not_upgrade(),
        }
    }

    pub fn track_prompt_generation(&self, user_id: &str, org_id: &str) {
        if let Err(e) = self.usage.record_run(user_id, org_id) {
            tracing::error!(user_id, org_id, error = %e, "failed to track prompt generation");
        }
        self.invalidate(user_id, org_id);
    }

    pub fn track_gpt_optimization(&self, user_id: &str, org_id: &str) {
        if let Err(e) = self.usage.record_gpt_optimization(user_id, org_id) {
            tracing::error!(user_id, org_id, error = %e, "failed to track GPT optimization");
        }
        self.invalidate(user_id, org_id);
    }

    pub fn invalidate(&self, user_id: &str, org_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(&(user_id.to_string(), org_id.to_string()));
        }
    }

    fn cached(&self, key: &(String, String)) -> Option<ResolvedEntitlements> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(key)?;
        (entry.fetched_at.elapsed() < self.cache_ttl).then(|| entry.resolved.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
