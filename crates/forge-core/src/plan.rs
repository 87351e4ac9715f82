use crate::error::ForgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PlanCode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCode {
    /// Older billing rows call the free tier "pilot".
    #[serde(alias = "pilot")]
    Free,
    Creator,
    Pro,
    Enterprise,
}

impl PlanCode {
    pub fn all() -> &'static [PlanCode] {
        &[
            PlanCode::Free,
            PlanCode::Creator,
            PlanCode::Pro,
            PlanCode::Enterprise,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The next plan up, or `None` at the top of the ladder.
    pub fn next(self) -> Option<PlanCode> {
        PlanCode::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanCode::Free => "free",
            PlanCode::Creator => "creator",
            PlanCode::Pro => "pro",
            PlanCode::Enterprise => "enterprise",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlanCode::Free => "Free",
            PlanCode::Creator => "Creator",
            PlanCode::Pro => "Pro",
            PlanCode::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for PlanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanCode {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" | "pilot" => Ok(PlanCode::Free),
            "creator" => Ok(PlanCode::Creator),
            "pro" => Ok(PlanCode::Pro),
            "enterprise" => Ok(PlanCode::Enterprise),
            _ => Err(ForgeError::UnknownPlan(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// BillingCycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Annual,
}

impl BillingCycle {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "annual" => Ok(BillingCycle::Annual),
            _ => Err(ForgeError::UnknownBillingCycle(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan catalog
// ---------------------------------------------------------------------------

/// Static catalog entry. Prices are whole US dollars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub code: PlanCode,
    pub name: &'static str,
    pub monthly_price: u32,
    pub annual_price: u32,
    pub features: &'static [&'static str],
    pub recommended: bool,
}

impl Plan {
    /// Price per month for the given cycle; annual billing is spread over
    /// twelve months and rounded.
    pub fn monthly_equivalent(&self, cycle: BillingCycle) -> u32 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Annual => (self.annual_price as f64 / 12.0).round() as u32,
        }
    }

    /// Amount charged per billing period.
    pub fn billed_price(&self, cycle: BillingCycle) -> u32 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Annual => self.annual_price,
        }
    }

    pub fn is_free(&self) -> bool {
        self.monthly_price == 0 && self.annual_price == 0
    }
}

static CATALOG: [Plan; 4] = [
    Plan {
        code: PlanCode::Free,
        name: "Free",
        monthly_price: 0,
        annual_price: 0,
        features: &[
            "Basic prompt generation",
            "Text and Markdown export",
            "10 runs per day",
            "Community support",
        ],
        recommended: false,
    },
    Plan {
        code: PlanCode::Creator,
        name: "Creator",
        monthly_price: 19,
        annual_price: 190,
        features: &[
            "All modules unlocked",
            "JSON export",
            "Cloud history",
            "25 GPT optimizations per month",
            "50 runs per day",
            "Email support",
        ],
        recommended: false,
    },
    Plan {
        code: PlanCode::Pro,
        name: "Pro",
        monthly_price: 49,
        annual_price: 490,
        features: &[
            "Everything in Creator",
            "GPT Test Engine",
            "PDF export",
            "Evaluator AI",
            "100 runs per day",
            "Priority support",
        ],
        recommended: true,
    },
    Plan {
        code: PlanCode::Enterprise,
        name: "Enterprise",
        monthly_price: 299,
        annual_price: 2990,
        features: &[
            "Everything in Pro",
            "API access",
            "Bundle ZIP export",
            "White-label options",
            "Multi-seat support",
            "1000 runs per day",
            "Dedicated support",
        ],
        recommended: false,
    },
];

pub fn catalog() -> &'static [Plan] {
    &CATALOG
}

pub fn plan(code: PlanCode) -> &'static Plan {
    &CATALOG[code.index()]
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            _ => Err(ForgeError::UnknownSubscriptionStatus(s.to_string())),
        }
    }
}

/// An organization's subscription as recorded by the billing backend.
/// Read-only on this side; webhooks mutate it elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub org_id: String,
    pub plan_code: PlanCode,
    pub status: SubscriptionStatus,
    #[serde(default = "default_seats")]
    pub seats: u32,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    #[serde(default)]
    pub trial_end: Option<DateTime<Utc>>,
}

fn default_seats() -> u32 {
    1
}

/// Plan whose defaults apply at `now`. A canceled subscription keeps its
/// plan until the paid period ends; past-due keeps it as a grace period.
fn effective_plan(
    plan_code: PlanCode,
    status: SubscriptionStatus,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PlanCode {
    match status {
        SubscriptionStatus::Canceled if now >= period_end => PlanCode::Free,
        _ => plan_code,
    }
}

impl Subscription {
    pub fn effective_plan(&self, now: DateTime<Utc>) -> PlanCode {
        effective_plan(self.plan_code, self.status, self.current_period_end, now)
    }

    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            plan_code: self.plan_code,
            status: self.status,
            seats: self.seats,
            trial_end: self.trial_end,
            current_period_end: self.current_period_end,
        }
    }
}

/// The subset of a subscription exposed by the entitlements API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub plan_code: PlanCode,
    pub status: SubscriptionStatus,
    #[serde(default = "default_seats")]
    pub seats: u32,
    #[serde(default)]
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: DateTime<Utc>,
}

impl SubscriptionSummary {
    pub fn effective_plan(&self, now: DateTime<Utc>) -> PlanCode {
        effective_plan(self.plan_code, self.status, self.current_period_end, now)
    }

    pub fn is_trialing(&self) -> bool {
        self.status == SubscriptionStatus::Trialing
    }

    /// Whole days until the trial (when trialing) or the current period ends.
    /// Negative once the boundary has passed.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        let end = match (self.is_trialing(), self.trial_end) {
            (true, Some(trial_end)) => trial_end,
            _ => self.current_period_end,
        };
        (end - now).num_days()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
