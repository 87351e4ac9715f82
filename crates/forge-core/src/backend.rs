use crate::entitlements::{EntitlementOverride, EntitlementSet};
use crate::error::{ForgeError, Result};
use crate::paths;
use crate::plan::{PlanCode, Subscription, SubscriptionSummary};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub role: MemberRole,
}

// ---------------------------------------------------------------------------
// Wire shape of GET /api/entitlements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementsResponse {
    pub org_id: String,
    pub user_id: String,
    /// Plan in effect after subscription status is applied. Older servers
    /// omit it; clients then derive it from `subscription`.
    #[serde(default)]
    pub plan: Option<PlanCode>,
    pub entitlements: EntitlementSet,
    #[serde(default)]
    pub subscription: Option<SubscriptionSummary>,
    #[serde(default)]
    pub membership: Option<Membership>,
}

// ---------------------------------------------------------------------------
// Backend traits
// ---------------------------------------------------------------------------

/// Raw material the manager merges into an [`EntitlementSet`].
///
/// `resolved` is set when the backend already returns a merged set (the
/// HTTP API does); otherwise the plan defaults for `plan` are used. Either
/// way `overrides` are layered on top.
#[derive(Debug, Clone)]
pub struct EntitlementRecord {
    pub plan: PlanCode,
    pub subscription: Option<SubscriptionSummary>,
    pub membership: Option<Membership>,
    pub resolved: Option<EntitlementSet>,
    pub overrides: Vec<EntitlementOverride>,
}

pub trait EntitlementBackend: Send + Sync {
    fn fetch(&self, user_id: &str, org_id: &str) -> Result<EntitlementRecord>;
}

/// Usage tallies compared against quota entitlements.
pub trait UsageCounter: Send + Sync {
    fn runs_today(&self, user_id: &str, org_id: &str) -> Result<u64>;
    fn gpt_optimizations_this_month(&self, user_id: &str, org_id: &str) -> Result<u64>;
    fn record_run(&self, user_id: &str, org_id: &str) -> Result<()>;
    fn record_gpt_optimization(&self, user_id: &str, org_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InMemoryBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgSeed {
    pub org_id: String,
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(default)]
    pub members: Vec<MemberSeed>,
    #[serde(default)]
    pub overrides: Vec<EntitlementOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSeed {
    pub user_id: String,
    pub role: MemberRole,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeedFile {
    #[serde(default)]
    orgs: Vec<OrgSeed>,
}

/// Backend over a fixed set of orgs, used by the dev server and tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    orgs: RwLock<HashMap<String, OrgSeed>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.promptforge/orgs.yaml`. A missing file yields an empty backend.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::orgs_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let seed: SeedFile = serde_yaml::from_str(&data)?;
        let backend = Self::new();
        for org in seed.orgs {
            backend.insert(org);
        }
        Ok(backend)
    }

    pub fn insert(&self, org: OrgSeed) {
        if let Ok(mut orgs) = self.orgs.write() {
            orgs.insert(org.org_id.clone(), org);
        }
    }

    pub fn org_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .orgs
            .read()
            .map(|orgs| orgs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Plan currently in effect for `org_id`, ignoring membership.
    pub fn org_plan(&self, org_id: &str) -> Result<PlanCode> {
        Ok(self.record_at("", org_id, Utc::now())?.plan)
    }

    fn record_at(&self, user_id: &str, org_id: &str, now: DateTime<Utc>) -> Result<EntitlementRecord> {
        let orgs = self
            .orgs
            .read()
            .map_err(|_| ForgeError::Backend("org table lock poisoned".into()))?;
        let org = orgs
            .get(org_id)
            .ok_or_else(|| ForgeError::OrgNotFound(org_id.to_string()))?;
        let membership = org
            .members
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| Membership { role: m.role });
        let plan = org
            .subscription
            .as_ref()
            .map(|s| s.effective_plan(now))
            .unwrap_or(PlanCode::Free);
        Ok(EntitlementRecord {
            plan,
            subscription: org.subscription.as_ref().map(Subscription::summary),
            membership,
            resolved: None,
            overrides: org.overrides.clone(),
        })
    }
}

impl EntitlementBackend for InMemoryBackend {
    fn fetch(&self, user_id: &str, org_id: &str) -> Result<EntitlementRecord> {
        self.record_at(user_id, org_id, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// InMemoryUsage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Tally {
    day: NaiveDate,
    runs: u64,
    month: (i32, u32),
    gpt: u64,
}

impl Tally {
    fn fresh(today: NaiveDate) -> Self {
        Self {
            day: today,
            runs: 0,
            month: (today.year(), today.month()),
            gpt: 0,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.runs = 0;
        }
        let month = (today.year(), today.month());
        if self.month != month {
            self.month = month;
            self.gpt = 0;
        }
    }
}

/// Per (user, org) counters that reset at UTC day and month boundaries.
#[derive(Debug, Default)]
pub struct InMemoryUsage {
    tallies: Mutex<HashMap<(String, String), Tally>>,
}

impl InMemoryUsage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tally<T>(&self, user_id: &str, org_id: &str, f: impl FnOnce(&mut Tally) -> T) -> Result<T> {
        let today = Utc::now().date_naive();
        let mut tallies = self
            .tallies
            .lock()
            .map_err(|_| ForgeError::UsageUnavailable("usage lock poisoned".into()))?;
        let tally = tallies
            .entry((user_id.to_string(), org_id.to_string()))
            .or_insert_with(|| Tally::fresh(today));
        tally.roll(today);
        Ok(f(tally))
    }
}

impl UsageCounter for InMemoryUsage {
    fn runs_today(&self, user_id: &str, org_id: &str) -> Result<u64> {
        self.with_tally(user_id, org_id, |t| t.runs)
    }

    fn gpt_optimizations_this_month(&self, user_id: &str, org_id: &str) -> Result<u64> {
        self.with_tally(user_id, org_id, |t| t.gpt)
    }

    fn record_run(&self, user_id: &str, org_id: &str) -> Result<()> {
        self.with_tally(user_id, org_id, |t| t.runs += 1)
    }

    fn record_gpt_optimization(&self, user_id: &str, org_id: &str) -> Result<()> {
        self.with_tally(user_id, org_id, |t| t.gpt += 1)
    }
}

// ---------------------------------------------------------------------------
// HttpEntitlementBackend
// ---------------------------------------------------------------------------

/// Reads entitlements from a deployed `GET /api/entitlements` endpoint.
pub struct HttpEntitlementBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpEntitlementBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }
}

impl EntitlementBackend for HttpEntitlementBackend {
    fn fetch(&self, user_id: &str, org_id: &str) -> Result<EntitlementRecord> {
        let url = format!("{}/api/entitlements", self.base_url);
        let mut req = self
            .client
            .get(&url)
            .query(&[("orgId", org_id), ("userId", user_id)]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send()?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ForgeError::OrgNotFound(org_id.to_string()));
        }
        if !status.is_success() {
            return Err(ForgeError::Backend(format!(
                "GET {url} returned {}",
                status.as_u16()
            )));
        }
        let body: EntitlementsResponse = resp.json()?;
        let plan = body
            .plan
            .or_else(|| body.subscription.as_ref().map(|s| s.effective_plan(Utc::now())))
            .unwrap_or(PlanCode::Free);
        Ok(EntitlementRecord {
            plan,
            subscription: body.subscription,
            membership: body.membership,
            resolved: Some(body.entitlements),
            overrides: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
